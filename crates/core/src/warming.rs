//! The background warming cycle.
//!
//! One cycle runs at a time. Each cycle carries its own id and cancellation
//! token; a cycle that was cancelled or superseded never touches pool state
//! again and tears down whatever session it created.

use std::sync::Arc;

use prewarm_protocol::{MediaStream, SessionMetadata, StartRequest, StreamEvent, WarmConfig, WarmingStatus};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pool::{ActiveCycle, PrewarmPool};
use crate::provider::{RemoteSession, SessionParts};
use crate::slot::SessionHandle;

const PREPARING: (u8, &str) = (10, "Preparing session...");
const AUTHENTICATING: (u8, &str) = (25, "Authenticating...");
const CREATING: (u8, &str) = (45, "Creating avatar session...");
const CONNECTING: (u8, &str) = (60, "Connecting to avatar...");
const STREAMING: (u8, &str) = (85, "Waiting for video stream...");
const BACKING_OFF: (u8, &str) = (10, "Avatar service busy, retrying...");

/// How a call to [`PrewarmPool::start_warming`] ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WarmOutcome {
	/// Another cycle was already running; nothing was done.
	AlreadyWarming,
	/// A fresh matching session was already installed.
	AlreadyReady,
	/// A new session was installed as current.
	#[serde(rename_all = "camelCase")]
	Ready { session_id: String, has_stream: bool },
	/// The cycle was cancelled or superseded.
	Cancelled,
	/// The cycle gave up; consumers fall back to connecting on demand.
	Failed { reason: FailureKind },
}

impl WarmOutcome {
	pub fn is_ready(&self) -> bool {
		matches!(self, WarmOutcome::Ready { .. } | WarmOutcome::AlreadyReady)
	}
}

/// Coarse classification of a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
	TokenFetch,
	CapacityLimit,
	Creation,
	Disconnected,
}

impl FailureKind {
	fn classify(err: &Error, capacity_signatures: &[String]) -> Self {
		if err.is_capacity_limit(capacity_signatures) {
			return FailureKind::CapacityLimit;
		}
		match err {
			Error::TokenFetch(_) => FailureKind::TokenFetch,
			Error::Disconnected(_) => FailureKind::Disconnected,
			_ => FailureKind::Creation,
		}
	}
}

struct Cycle {
	id: u64,
	cancel: CancellationToken,
}

impl Cycle {
	fn checkpoint(&self) -> Result<()> {
		if self.cancel.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
	}
}

/// Releases the active-cycle guard when a cycle future is dropped mid-flight.
struct CycleGuard<'a> {
	pool: &'a PrewarmPool,
	id: u64,
	armed: bool,
}

impl Drop for CycleGuard<'_> {
	fn drop(&mut self) {
		if self.armed {
			self.pool.abandon_cycle(self.id);
		}
	}
}

impl PrewarmPool {
	/// Warms a session for `config` unless one is running or already usable.
	///
	/// Returns once the cycle settles. Capacity-limit rejections are retried
	/// after a backoff, up to `maxCapacityRetries` times; every other failure
	/// ends the cycle with the fallback status.
	pub async fn start_warming(&self, config: WarmConfig) -> WarmOutcome {
		let cycle = match self.begin_cycle(&config) {
			Ok(cycle) => cycle,
			Err(outcome) => return outcome,
		};
		let mut guard = CycleGuard {
			pool: self,
			id: cycle.id,
			armed: true,
		};

		info!(
			target = "prewarm.pool",
			cycle = cycle.id,
			resource = %config.resource_id,
			variant = ?config.context_payload_variant,
			"warming started"
		);
		self.stats.record_cycle_started();
		self.notify();

		let outcome = self.run_cycle(&cycle, &config).await;
		self.finish_cycle(&cycle, &outcome).await;
		guard.armed = false;
		outcome
	}

	/// Guard checks and cycle registration, in one critical section.
	fn begin_cycle(&self, config: &WarmConfig) -> std::result::Result<Cycle, WarmOutcome> {
		let max_age = self.config.max_session_age();
		let mut guard = self.state.lock();
		let state = &mut *guard;

		if state.active.is_some() {
			debug!(target = "prewarm.pool", resource = %config.resource_id, "warming already in progress");
			return Err(WarmOutcome::AlreadyWarming);
		}
		if state.slot.current_mut().is_some_and(|current| current.is_fresh_for(config, max_age)) {
			debug!(target = "prewarm.pool", resource = %config.resource_id, "session already warm");
			return Err(WarmOutcome::AlreadyReady);
		}

		let cycle = Cycle {
			id: self.next_cycle_id(),
			cancel: CancellationToken::new(),
		};
		state.active = Some(ActiveCycle {
			id: cycle.id,
			cancel: cycle.cancel.clone(),
			building: None,
		});
		state.status = WarmingStatus::warming(PREPARING.0, PREPARING.1);
		Ok(cycle)
	}

	async fn run_cycle(&self, cycle: &Cycle, config: &WarmConfig) -> WarmOutcome {
		let max_retries = self.config.max_capacity_retries;
		let mut retries = 0;

		loop {
			let err = match self.attempt(cycle, config).await {
				Ok(outcome) => return outcome,
				Err(err) => err,
			};
			if err.is_cancelled() {
				debug!(target = "prewarm.pool", cycle = cycle.id, "warming cycle cancelled");
				return WarmOutcome::Cancelled;
			}

			let kind = FailureKind::classify(&err, &self.config.capacity_signatures);
			if kind != FailureKind::CapacityLimit || retries >= max_retries {
				warn!(
					target = "prewarm.pool",
					cycle = cycle.id,
					reason = ?kind,
					error = %err,
					"warming failed; consumers will connect on demand"
				);
				return WarmOutcome::Failed { reason: kind };
			}

			retries += 1;
			self.stats.record_capacity_retry();
			warn!(
				target = "prewarm.pool",
				cycle = cycle.id,
				retry = retries,
				max_retries,
				error = %err,
				"provider at capacity; backing off"
			);
			self.set_progress(cycle, BACKING_OFF);

			tokio::select! {
				_ = cycle.cancel.cancelled() => return WarmOutcome::Cancelled,
				_ = tokio::time::sleep(self.config.capacity_backoff()) => {}
			}

			if self.has_fresh_session(config) {
				info!(target = "prewarm.pool", cycle = cycle.id, "session became ready during backoff");
				return WarmOutcome::AlreadyReady;
			}
		}
	}

	/// One token → create → start → stream → install pass.
	async fn attempt(&self, cycle: &Cycle, config: &WarmConfig) -> Result<WarmOutcome> {
		self.set_progress(cycle, AUTHENTICATING);
		let token = self.tokens.get_token(false).await;
		cycle.checkpoint()?;
		let token = token.ok_or_else(|| Error::TokenFetch("no token available".to_string()))?;

		self.set_progress(cycle, CREATING);
		let SessionParts { session, mut events } = self.factory.create(&token);
		self.track_building(cycle, &session);
		debug!(target = "prewarm.pool", cycle = cycle.id, session = %session.id(), "session created");

		match self.bring_up(cycle, &session, &mut events, config).await {
			Ok((metadata, media_stream)) => {
				let handle = SessionHandle::new(token, Arc::clone(&session), metadata, media_stream, config, events);
				self.install(cycle, handle).await
			}
			Err(err) => {
				self.discard_orphan(cycle, session).await;
				Err(err)
			}
		}
	}

	async fn bring_up(
		&self,
		cycle: &Cycle,
		session: &Arc<dyn RemoteSession>,
		events: &mut UnboundedReceiver<StreamEvent>,
		config: &WarmConfig,
	) -> Result<(SessionMetadata, Option<MediaStream>)> {
		self.set_progress(cycle, CONNECTING);
		let started = session.start(StartRequest::from(config)).await;
		cycle.checkpoint()?;
		let metadata = started?;

		self.set_progress(cycle, STREAMING);
		let wait = self.config.stream_ready_timeout();
		let media_stream = tokio::select! {
			_ = cycle.cancel.cancelled() => return Err(Error::Cancelled),
			ready = tokio::time::timeout(wait, wait_for_stream(events)) => match ready {
				Ok(stream) => Some(stream?),
				Err(_) => {
					warn!(
						target = "prewarm.pool",
						cycle = cycle.id,
						session = %session.id(),
						error = %Error::Timeout(wait),
						"stream not ready; installing without it"
					);
					None
				}
			},
		};
		cycle.checkpoint()?;
		Ok((metadata, media_stream))
	}

	async fn install(&self, cycle: &Cycle, handle: SessionHandle) -> Result<WarmOutcome> {
		let installed = {
			let mut guard = self.state.lock();
			let state = &mut *guard;
			if cycle.cancel.is_cancelled() || !state.is_active(cycle.id) {
				Err(handle)
			} else {
				let outcome = WarmOutcome::Ready {
					session_id: handle.session_id().to_string(),
					has_stream: handle.media_stream.is_some(),
				};
				let retired = state.slot.install(handle);
				state.active = None;
				state.status = WarmingStatus::ready();
				Ok((outcome, retired))
			}
		};

		match installed {
			Ok((outcome, retired)) => {
				info!(target = "prewarm.pool", cycle = cycle.id, outcome = ?outcome, "session ready");
				self.notify();
				self.teardown(retired).await;
				Ok(outcome)
			}
			Err(handle) => {
				debug!(target = "prewarm.pool", cycle = cycle.id, "cycle superseded before install");
				self.teardown(vec![handle]).await;
				Err(Error::Cancelled)
			}
		}
	}

	async fn finish_cycle(&self, cycle: &Cycle, outcome: &WarmOutcome) {
		let (changed, retired) = {
			let mut guard = self.state.lock();
			let state = &mut *guard;
			if state.is_active(cycle.id) {
				state.active = None;
				let retired = match outcome {
					WarmOutcome::Failed { .. } => {
						state.status = WarmingStatus::fallback();
						state.slot.take_current()
					}
					WarmOutcome::AlreadyReady => {
						state.status = WarmingStatus::ready();
						None
					}
					_ => {
						state.status = WarmingStatus::idle();
						None
					}
				};
				(true, retired)
			} else {
				(false, None)
			}
		};

		match outcome {
			WarmOutcome::Ready { .. } => self.stats.record_cycle_ready(),
			WarmOutcome::Failed { .. } => self.stats.record_cycle_failed(),
			WarmOutcome::Cancelled => self.stats.record_cycle_cancelled(),
			WarmOutcome::AlreadyReady | WarmOutcome::AlreadyWarming => {}
		}

		if changed {
			self.notify();
		}
		self.teardown(retired.into_iter().collect()).await;
	}

	/// Drop path for a cycle future that never reached `finish_cycle`.
	pub(crate) fn abandon_cycle(&self, cycle_id: u64) {
		let orphan = {
			let mut guard = self.state.lock();
			let state = &mut *guard;
			if !state.is_active(cycle_id) {
				return;
			}
			let building = state.active.take().and_then(|active| active.building);
			state.status = WarmingStatus::idle();
			building.filter(|session| !state.slot.holds(session.id()))
		};

		debug!(target = "prewarm.pool", cycle = cycle_id, "warming cycle dropped");
		self.notify();

		let Some(session) = orphan else {
			return;
		};
		if let Ok(runtime) = tokio::runtime::Handle::try_current() {
			self.stats.record_teardowns(1);
			runtime.spawn(async move {
				if let Err(err) = session.stop().await {
					warn!(target = "prewarm.pool", session = %session.id(), error = %err, "session teardown failed");
				}
			});
		}
	}

	fn has_fresh_session(&self, config: &WarmConfig) -> bool {
		let max_age = self.config.max_session_age();
		self.state
			.lock()
			.slot
			.current_mut()
			.is_some_and(|current| current.is_fresh_for(config, max_age))
	}

	fn set_progress(&self, cycle: &Cycle, (progress, text): (u8, &str)) {
		let updated = {
			let mut state = self.state.lock();
			if state.is_active(cycle.id) && !cycle.cancel.is_cancelled() {
				state.status = WarmingStatus::warming(progress, text);
				true
			} else {
				false
			}
		};
		if updated {
			self.notify();
		}
	}

	fn track_building(&self, cycle: &Cycle, session: &Arc<dyn RemoteSession>) {
		let mut state = self.state.lock();
		if let Some(active) = state.active.as_mut().filter(|active| active.id == cycle.id) {
			active.building = Some(Arc::clone(session));
		}
	}

	/// Stops a session this cycle created but never installed.
	async fn discard_orphan(&self, cycle: &Cycle, session: Arc<dyn RemoteSession>) {
		let orphaned = {
			let mut state = self.state.lock();
			if let Some(active) = state.active.as_mut().filter(|active| active.id == cycle.id) {
				active.building = None;
			}
			!state.slot.holds(session.id())
		};
		if orphaned {
			debug!(target = "prewarm.pool", cycle = cycle.id, session = %session.id(), "stopping orphaned session");
			self.stop_session(session).await;
		}
	}
}

async fn wait_for_stream(events: &mut UnboundedReceiver<StreamEvent>) -> Result<MediaStream> {
	match events.recv().await {
		Some(StreamEvent::StreamReady { stream }) => Ok(stream),
		Some(StreamEvent::StreamDisconnected { reason }) => Err(Error::Disconnected(reason)),
		None => std::future::pending().await,
	}
}
