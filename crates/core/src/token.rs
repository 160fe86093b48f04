//! Short-lived bearer token acquisition with single-flight caching.
//!
//! The cache holds at most one token and at most one in-flight fetch. Callers
//! arriving while a fetch is pending await that same fetch, so N concurrent
//! callers during one fetch window produce exactly one network call.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Source of bearer tokens for the avatar provider.
#[async_trait]
pub trait TokenSource: Send + Sync {
	/// Fetches a fresh token. Empty tokens are treated as failures by the cache.
	async fn fetch_token(&self) -> Result<String>;
}

/// Token source backed by a `POST` to a backend endpoint returning plain text.
pub struct HttpTokenSource {
	client: reqwest::Client,
	endpoint: String,
}

impl HttpTokenSource {
	/// Creates a source with its own client bounded by `timeout` per request.
	pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
		let client = reqwest::Client::builder().timeout(timeout).build()?;
		Ok(Self::with_client(client, endpoint))
	}

	/// Creates a source sharing an existing client.
	pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
		Self {
			client,
			endpoint: endpoint.into(),
		}
	}
}

#[async_trait]
impl TokenSource for HttpTokenSource {
	async fn fetch_token(&self) -> Result<String> {
		let response = self
			.client
			.post(&self.endpoint)
			.send()
			.await
			.map_err(|e| Error::TokenFetch(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			return Err(Error::TokenFetch(format!("token endpoint returned {status}")));
		}

		let body = response.text().await.map_err(|e| Error::TokenFetch(e.to_string()))?;
		let token = body.trim();
		if token.is_empty() {
			return Err(Error::TokenFetch("token endpoint returned an empty body".to_string()));
		}
		Ok(token.to_string())
	}
}

/// Token source returning a fixed value.
#[derive(Debug, Clone)]
pub struct StaticTokenSource(pub String);

#[async_trait]
impl TokenSource for StaticTokenSource {
	async fn fetch_token(&self) -> Result<String> {
		Ok(self.0.clone())
	}
}

/// A cached token and its expiry. Replaced wholesale, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
	pub value: String,
	pub expires_at: Instant,
}

impl CachedToken {
	pub fn is_valid(&self) -> bool {
		Instant::now() < self.expires_at
	}
}

type PendingFetch = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Default)]
struct TokenState {
	cached: Option<CachedToken>,
	pending: Option<PendingFetch>,
}

/// Process-wide token cache with TTL expiry and single-flight fetches.
pub struct TokenCache {
	source: Arc<dyn TokenSource>,
	ttl: Duration,
	state: Arc<Mutex<TokenState>>,
	fetches: AtomicU64,
}

impl TokenCache {
	pub fn new(source: Arc<dyn TokenSource>, ttl: Duration) -> Self {
		Self {
			source,
			ttl,
			state: Arc::new(Mutex::new(TokenState::default())),
			fetches: AtomicU64::new(0),
		}
	}

	/// Returns a valid token, fetching one when needed.
	///
	/// A cached, unexpired token is returned without I/O unless `force_refresh`
	/// is set. A fetch already in flight is joined rather than duplicated.
	/// Failures yield `None`; the next call tries again.
	pub async fn get_token(&self, force_refresh: bool) -> Option<String> {
		let pending = {
			let mut state = self.state.lock();
			if !force_refresh {
				if let Some(token) = state.cached.as_ref().filter(|token| token.is_valid()) {
					debug!(target = "prewarm.token", "token cache hit");
					return Some(token.value.clone());
				}
			}

			if let Some(pending) = state.pending.clone() {
				debug!(target = "prewarm.token", "joining in-flight token fetch");
				pending
			} else {
				let fetch = self.fetch_and_store().shared();
				state.pending = Some(fetch.clone());
				fetch
			}
		};

		pending.await
	}

	/// Returns the cached token if it has not expired.
	pub fn cached(&self) -> Option<CachedToken> {
		self.state.lock().cached.clone().filter(CachedToken::is_valid)
	}

	/// Drops the cached token so the next call fetches.
	pub fn invalidate(&self) {
		self.state.lock().cached = None;
	}

	/// Number of fetches issued against the token source.
	pub fn fetch_count(&self) -> u64 {
		self.fetches.load(Ordering::Relaxed)
	}

	fn fetch_and_store(&self) -> BoxFuture<'static, Option<String>> {
		self.fetches.fetch_add(1, Ordering::Relaxed);
		let source = Arc::clone(&self.source);
		let state = Arc::clone(&self.state);
		let ttl = self.ttl;

		async move {
			let result = source.fetch_token().await;

			let mut guard = state.lock();
			// Cleared on every outcome so a failed fetch never blocks later attempts.
			guard.pending = None;

			match result.map(|value| value.trim().to_string()) {
				Ok(value) if !value.is_empty() => {
					debug!(target = "prewarm.token", ttl_ms = ttl.as_millis() as u64, "token refreshed");
					guard.cached = Some(CachedToken {
						value: value.clone(),
						expires_at: Instant::now() + ttl,
					});
					Some(value)
				}
				Ok(_) => {
					warn!(target = "prewarm.token", "token source returned an empty token");
					None
				}
				Err(err) => {
					warn!(target = "prewarm.token", error = %err, "token fetch failed");
					None
				}
			}
		}
		.boxed()
	}
}
