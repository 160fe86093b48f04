//! Shared fixtures for pool integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use prewarm::provider::fake::{FakeProvider, FakeProviderBuilder, FakeProviderController};
use prewarm::{Error, PrewarmConfig, PrewarmPool, Result, StaticTokenSource, TokenSource};
use tokio::sync::Semaphore;

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn test_config() -> PrewarmConfig {
	PrewarmConfig {
		capacity_backoff_ms: 50,
		stream_ready_timeout_ms: 200,
		..PrewarmConfig::default()
	}
}

pub fn pool_with(config: PrewarmConfig, builder: FakeProviderBuilder) -> (Arc<PrewarmPool>, FakeProviderController) {
	init_tracing();
	let (provider, controller): (FakeProvider, _) = builder.build();
	let pool = PrewarmPool::new(config, Arc::new(StaticTokenSource("tok-1".to_string())), Arc::new(provider));
	(Arc::new(pool), controller)
}

pub fn pool(builder: FakeProviderBuilder) -> (Arc<PrewarmPool>, FakeProviderController) {
	pool_with(test_config(), builder)
}

/// Token source that counts calls and can be held until released.
pub struct GatedTokenSource {
	pub calls: AtomicUsize,
	gate: Semaphore,
	fail_first: AtomicUsize,
}

impl GatedTokenSource {
	/// Every fetch completes immediately.
	pub fn open() -> Arc<Self> {
		Arc::new(Self {
			calls: AtomicUsize::new(0),
			gate: Semaphore::new(Semaphore::MAX_PERMITS),
			fail_first: AtomicUsize::new(0),
		})
	}

	/// Every fetch waits for [`release`](Self::release).
	pub fn held() -> Arc<Self> {
		Arc::new(Self {
			calls: AtomicUsize::new(0),
			gate: Semaphore::new(0),
			fail_first: AtomicUsize::new(0),
		})
	}

	/// The first `count` fetches fail.
	pub fn failing(count: usize) -> Arc<Self> {
		let source = Self::open();
		source.fail_first.store(count, Ordering::SeqCst);
		source
	}

	pub fn release(&self, permits: usize) {
		self.gate.add_permits(permits);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl TokenSource for GatedTokenSource {
	async fn fetch_token(&self) -> Result<String> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
		let permit = self
			.gate
			.acquire()
			.await
			.map_err(|_| Error::TokenFetch("gate closed".to_string()))?;
		permit.forget();

		if call <= self.fail_first.load(Ordering::SeqCst) {
			return Err(Error::TokenFetch("token service unavailable".to_string()));
		}
		Ok(format!("  token-{call}\n"))
	}
}
