//! Process-wide prewarm pool shared by every UI surface.
//!
//! All mutable state (status, slot, active cycle) lives behind one lock that
//! is never held across an `.await`. Guard checks and slot transitions are
//! single critical sections; remote teardown always happens afterwards, on
//! handles already removed from the slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use prewarm_protocol::{WarmConfig, WarmingStatus};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PrewarmConfig;
use crate::error::{Error, Result};
use crate::provider::{RemoteSession, SessionFactory};
use crate::slot::{HandleSummary, SessionHandle, SessionSlot};
use crate::stats::{PoolStats, StatsSnapshot};
use crate::subscribers::{SubscriberRegistry, Subscription};
use crate::token::{HttpTokenSource, TokenCache, TokenSource};
use crate::warming::WarmOutcome;

/// Bookkeeping for the one running warming cycle.
pub(crate) struct ActiveCycle {
	pub(crate) id: u64,
	pub(crate) cancel: CancellationToken,
	/// Session object created by this cycle and not yet installed.
	pub(crate) building: Option<Arc<dyn RemoteSession>>,
}

#[derive(Default)]
pub(crate) struct PoolState {
	pub(crate) status: WarmingStatus,
	pub(crate) slot: SessionSlot,
	pub(crate) active: Option<ActiveCycle>,
}

impl PoolState {
	pub(crate) fn is_active(&self, cycle_id: u64) -> bool {
		self.active.as_ref().is_some_and(|active| active.id == cycle_id)
	}

	/// Cancels and removes the active cycle, returning the session it was building.
	fn cancel_active(&mut self) -> Option<Arc<dyn RemoteSession>> {
		self.active.take().and_then(|cycle| {
			cycle.cancel.cancel();
			cycle.building
		})
	}
}

/// Point-in-time view of the pool for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
	pub status: WarmingStatus,
	pub current: Option<HandleSummary>,
	pub previous: Option<HandleSummary>,
}

/// Prewarm pool: token cache, warming state machine, session slot and consumption gate.
pub struct PrewarmPool {
	pub(crate) config: PrewarmConfig,
	pub(crate) tokens: TokenCache,
	pub(crate) factory: Arc<dyn SessionFactory>,
	pub(crate) state: Mutex<PoolState>,
	pub(crate) stats: PoolStats,
	subscribers: SubscriberRegistry,
	status_tx: watch::Sender<WarmingStatus>,
	next_cycle: AtomicU64,
}

impl PrewarmPool {
	/// Creates a pool with injected token and session dependencies.
	pub fn new(config: PrewarmConfig, token_source: Arc<dyn TokenSource>, factory: Arc<dyn SessionFactory>) -> Self {
		let (status_tx, _) = watch::channel(WarmingStatus::idle());
		Self {
			tokens: TokenCache::new(token_source, config.token_ttl()),
			config,
			factory,
			state: Mutex::new(PoolState::default()),
			stats: PoolStats::default(),
			subscribers: SubscriberRegistry::new(),
			status_tx,
			next_cycle: AtomicU64::new(1),
		}
	}

	/// Creates a pool fetching tokens from `config.token_endpoint`.
	pub fn from_config(config: PrewarmConfig, factory: Arc<dyn SessionFactory>) -> Result<Self> {
		config.validate()?;
		let endpoint = config
			.token_endpoint
			.clone()
			.ok_or_else(|| Error::Config("tokenEndpoint is required".to_string()))?;
		let source = HttpTokenSource::new(endpoint, config.token_request_timeout())?;
		Ok(Self::new(config, Arc::new(source), factory))
	}

	pub fn config(&self) -> &PrewarmConfig {
		&self.config
	}

	pub fn tokens(&self) -> &TokenCache {
		&self.tokens
	}

	pub fn stats(&self) -> StatsSnapshot {
		self.stats.snapshot()
	}

	pub fn status(&self) -> WarmingStatus {
		self.state.lock().status.clone()
	}

	pub fn is_warming(&self) -> bool {
		self.state.lock().status.is_warming
	}

	pub fn progress(&self) -> u8 {
		self.state.lock().status.progress
	}

	pub fn status_text(&self) -> String {
		self.state.lock().status.status_text.clone()
	}

	/// Summary of the installed session, if any. The handle itself is only
	/// obtainable through [`consume`](Self::consume).
	pub fn current_handle(&self) -> Option<HandleSummary> {
		self.state.lock().slot.current().map(SessionHandle::summary)
	}

	pub fn has_previous(&self) -> bool {
		self.state.lock().slot.previous().is_some()
	}

	pub fn snapshot(&self) -> PoolSnapshot {
		let state = self.state.lock();
		PoolSnapshot {
			status: state.status.clone(),
			current: state.slot.current().map(SessionHandle::summary),
			previous: state.slot.previous().map(SessionHandle::summary),
		}
	}

	/// Registers a callback run after every state change.
	pub fn subscribe<F>(&self, callback: F) -> Subscription
	where
		F: Fn() + Send + Sync + 'static,
	{
		self.subscribers.subscribe(callback)
	}

	/// Receiver always holding the latest status.
	pub fn watch_status(&self) -> watch::Receiver<WarmingStatus> {
		self.status_tx.subscribe()
	}

	/// Warms the token cache without creating a session.
	pub async fn prefetch_token_only(&self) -> bool {
		self.tokens.get_token(false).await.is_some()
	}

	/// Runs [`start_warming`](Self::start_warming) on a background task.
	pub fn spawn_warming(self: &Arc<Self>, config: WarmConfig) -> JoinHandle<WarmOutcome> {
		let pool = Arc::clone(self);
		tokio::spawn(async move { pool.start_warming(config).await })
	}

	/// Stops the running cycle, resets status to idle and empties the slot.
	pub async fn cancel_warming(&self) {
		let (building, retired) = {
			let mut guard = self.state.lock();
			let state = &mut *guard;
			let building = state.cancel_active();
			state.status = WarmingStatus::idle();
			(building, state.slot.clear())
		};

		info!(
			target = "prewarm.pool",
			building = building.is_some(),
			retired = retired.len(),
			"warming cancelled"
		);
		self.notify();

		if let Some(session) = building {
			self.stop_session(session).await;
		}
		self.teardown(retired).await;
	}

	/// Re-targets warming at `config`.
	///
	/// The running cycle is cancelled. A ready current session is demoted to
	/// previous (replacing any older one). Until the new session is installed,
	/// a consumer expecting the old config can still take it.
	pub async fn restart_warming(&self, config: WarmConfig) -> WarmOutcome {
		let (building, retired) = {
			let mut guard = self.state.lock();
			let state = &mut *guard;
			let building = state.cancel_active();
			state.status = WarmingStatus::idle();
			(building, state.slot.demote_current())
		};

		debug!(
			target = "prewarm.pool",
			resource = %config.resource_id,
			variant = ?config.context_payload_variant,
			"restarting warming"
		);
		self.notify();

		if let Some(session) = building {
			self.stop_session(session).await;
		}
		self.teardown(retired).await;

		tokio::task::yield_now().await;
		self.start_warming(config).await
	}

	pub(crate) fn next_cycle_id(&self) -> u64 {
		self.next_cycle.fetch_add(1, Ordering::Relaxed)
	}

	/// Publishes the current status to watchers and subscribers.
	///
	/// Must be called without the state lock held.
	pub(crate) fn notify(&self) {
		{
			let state = self.state.lock();
			self.status_tx.send_if_modified(|status| {
				if *status == state.status {
					return false;
				}
				*status = state.status.clone();
				true
			});
		}
		self.subscribers.publish();
	}

	pub(crate) async fn stop_session(&self, session: Arc<dyn RemoteSession>) {
		if let Err(err) = session.stop().await {
			warn!(target = "prewarm.pool", session = %session.id(), error = %err, "session teardown failed");
		}
		self.stats.record_teardowns(1);
	}

	pub(crate) async fn teardown(&self, handles: Vec<SessionHandle>) {
		if handles.is_empty() {
			return;
		}
		self.stats.record_teardowns(handles.len());
		for handle in handles {
			debug!(target = "prewarm.pool", session = %handle.session_id(), "tearing down session");
			handle.teardown().await;
		}
	}
}
