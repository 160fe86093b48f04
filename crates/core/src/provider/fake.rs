//! In-memory avatar provider for tests and the simulator.
//!
//! Start outcomes are scripted per created session, in creation order; an
//! empty script means every start succeeds with an immediate stream.
//!
//! # Example
//!
//! ```ignore
//! let (provider, controller) = FakeProviderBuilder::new()
//!     .script(FakeStart::capacity_limit())
//!     .build();
//! let pool = PrewarmPool::new(config, token_source, Arc::new(provider));
//!
//! pool.start_warming(WarmConfig::new("a1")).await;
//! assert_eq!(controller.created_count(), 2);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use prewarm_protocol::{MediaStream, SessionMetadata, StartRequest, StreamEvent};
use tokio::sync::{Semaphore, mpsc};

use super::{RemoteSession, SessionFactory, SessionParts};
use crate::error::{Error, Result};

/// Scripted result of one `start` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeStart {
	/// Start succeeds and the stream becomes ready.
	Ready,
	/// Start succeeds but no stream event is ever emitted.
	NoStream,
	/// Start succeeds, then the stream drops before becoming ready.
	Disconnect(String),
	/// Start fails with a provider error.
	Fail { status: Option<u16>, message: String },
	/// Start blocks until [`FakeProviderController::release_start`], then behaves like `Ready`.
	Hold,
}

impl FakeStart {
	/// Provider-side concurrency limit rejection.
	pub fn capacity_limit() -> Self {
		FakeStart::Fail {
			status: Some(400),
			message: "Concurrent limit reached".to_string(),
		}
	}

	/// Non-retryable provider rejection.
	pub fn rejected(message: impl Into<String>) -> Self {
		FakeStart::Fail {
			status: Some(400),
			message: message.into(),
		}
	}
}

/// Builder for [`FakeProvider`] instances.
pub struct FakeProviderBuilder {
	script: VecDeque<FakeStart>,
	start_latency: Duration,
	stream_latency: Duration,
}

impl FakeProviderBuilder {
	pub fn new() -> Self {
		Self {
			script: VecDeque::new(),
			start_latency: Duration::ZERO,
			stream_latency: Duration::ZERO,
		}
	}

	/// Appends a scripted outcome for the next created session.
	pub fn script(mut self, outcome: FakeStart) -> Self {
		self.script.push_back(outcome);
		self
	}

	/// Delay inside every `start` call.
	pub fn start_latency(mut self, latency: Duration) -> Self {
		self.start_latency = latency;
		self
	}

	/// Delay between a successful start and its stream event.
	pub fn stream_latency(mut self, latency: Duration) -> Self {
		self.stream_latency = latency;
		self
	}

	/// Builds the provider and the controller used to drive and inspect it.
	pub fn build(self) -> (FakeProvider, FakeProviderController) {
		let inner = Arc::new(FakeInner {
			state: Mutex::new(FakeState {
				script: self.script,
				..Default::default()
			}),
			start_entered: Semaphore::new(0),
			release: Semaphore::new(0),
			start_latency: self.start_latency,
			stream_latency: self.stream_latency,
		});

		(
			FakeProvider {
				inner: Arc::clone(&inner),
			},
			FakeProviderController { inner },
		)
	}
}

impl Default for FakeProviderBuilder {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Default)]
struct FakeState {
	script: VecDeque<FakeStart>,
	tokens: Vec<String>,
	sessions: Vec<SessionRecord>,
	start_requests: Vec<StartRequest>,
}

struct SessionRecord {
	id: String,
	events: mpsc::UnboundedSender<StreamEvent>,
	started: bool,
	stop_calls: u32,
}

struct FakeInner {
	state: Mutex<FakeState>,
	start_entered: Semaphore,
	release: Semaphore,
	start_latency: Duration,
	stream_latency: Duration,
}

/// Session factory backed by in-memory state.
pub struct FakeProvider {
	inner: Arc<FakeInner>,
}

impl SessionFactory for FakeProvider {
	fn create(&self, token: &str) -> SessionParts {
		let (events_tx, events_rx) = mpsc::unbounded_channel();

		let id = {
			let mut state = self.inner.state.lock();
			let id = format!("fake-session-{}", state.sessions.len() + 1);
			state.tokens.push(token.to_string());
			state.sessions.push(SessionRecord {
				id: id.clone(),
				events: events_tx.clone(),
				started: false,
				stop_calls: 0,
			});
			id
		};

		SessionParts {
			session: Arc::new(FakeSession {
				id,
				events: events_tx,
				inner: Arc::clone(&self.inner),
			}),
			events: events_rx,
		}
	}
}

struct FakeSession {
	id: String,
	events: mpsc::UnboundedSender<StreamEvent>,
	inner: Arc<FakeInner>,
}

impl FakeSession {
	fn emit_after_latency(&self, event: StreamEvent) {
		let latency = self.inner.stream_latency;
		if latency.is_zero() {
			let _ = self.events.send(event);
			return;
		}

		let events = self.events.clone();
		tokio::spawn(async move {
			tokio::time::sleep(latency).await;
			let _ = events.send(event);
		});
	}
}

#[async_trait]
impl RemoteSession for FakeSession {
	fn id(&self) -> &str {
		&self.id
	}

	async fn start(&self, request: StartRequest) -> Result<SessionMetadata> {
		let outcome = {
			let mut state = self.inner.state.lock();
			state.start_requests.push(request);
			state.script.pop_front().unwrap_or(FakeStart::Ready)
		};
		self.inner.start_entered.add_permits(1);

		if outcome == FakeStart::Hold {
			let permit = self
				.inner
				.release
				.acquire()
				.await
				.map_err(|_| Error::Creation("fake provider closed".to_string()))?;
			permit.forget();
		}

		if !self.inner.start_latency.is_zero() {
			tokio::time::sleep(self.inner.start_latency).await;
		}

		match outcome {
			FakeStart::Fail { status, message } => return Err(Error::Provider { status, message }),
			FakeStart::Ready | FakeStart::Hold => self.emit_after_latency(StreamEvent::StreamReady {
				stream: MediaStream::new(format!("{}-stream", self.id)),
			}),
			FakeStart::Disconnect(reason) => self.emit_after_latency(StreamEvent::StreamDisconnected { reason }),
			FakeStart::NoStream => {}
		}

		if let Some(record) = self.inner.state.lock().sessions.iter_mut().find(|r| r.id == self.id) {
			record.started = true;
		}

		Ok(SessionMetadata {
			session_id: format!("remote-{}", self.id),
			realtime_endpoint: Some(format!("wss://avatar.invalid/{}", self.id)),
		})
	}

	async fn stop(&self) -> Result<()> {
		if let Some(record) = self.inner.state.lock().sessions.iter_mut().find(|r| r.id == self.id) {
			record.stop_calls += 1;
		}
		Ok(())
	}
}

/// Drives scripted behavior and inspects what the pool did with the provider.
#[derive(Clone)]
pub struct FakeProviderController {
	inner: Arc<FakeInner>,
}

impl FakeProviderController {
	/// Appends a scripted outcome for the next session start.
	pub fn script(&self, outcome: FakeStart) {
		self.inner.state.lock().script.push_back(outcome);
	}

	/// Waits until one more `start` call has begun.
	pub async fn wait_for_start(&self) {
		if let Ok(permit) = self.inner.start_entered.acquire().await {
			permit.forget();
		}
	}

	/// Lets one held `start` call proceed.
	pub fn release_start(&self) {
		self.inner.release.add_permits(1);
	}

	/// Pushes an event to a created session's receiver. Returns `false` if unknown or dropped.
	pub fn emit(&self, session_id: &str, event: StreamEvent) -> bool {
		let state = self.inner.state.lock();
		state
			.sessions
			.iter()
			.find(|r| r.id == session_id)
			.is_some_and(|r| r.events.send(event).is_ok())
	}

	pub fn created_count(&self) -> usize {
		self.inner.state.lock().sessions.len()
	}

	/// Tokens passed to `create`, in order.
	pub fn tokens(&self) -> Vec<String> {
		self.inner.state.lock().tokens.clone()
	}

	pub fn start_requests(&self) -> Vec<StartRequest> {
		self.inner.state.lock().start_requests.clone()
	}

	pub fn is_started(&self, session_id: &str) -> bool {
		self.inner.state.lock().sessions.iter().any(|r| r.id == session_id && r.started)
	}

	pub fn stop_calls(&self, session_id: &str) -> u32 {
		self.inner
			.state
			.lock()
			.sessions
			.iter()
			.find(|r| r.id == session_id)
			.map_or(0, |r| r.stop_calls)
	}

	pub fn is_stopped(&self, session_id: &str) -> bool {
		self.stop_calls(session_id) > 0
	}

	/// Sessions that were created and never stopped.
	pub fn live_sessions(&self) -> Vec<String> {
		self.inner
			.state
			.lock()
			.sessions
			.iter()
			.filter(|r| r.stop_calls == 0)
			.map(|r| r.id.clone())
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn scripted_outcomes_apply_in_creation_order() {
		let (provider, controller) = FakeProviderBuilder::new().script(FakeStart::capacity_limit()).build();

		let first = provider.create("tok");
		let err = first.session.start(StartRequest::from(&prewarm_protocol::WarmConfig::new("a1"))).await.unwrap_err();
		assert!(matches!(err, Error::Provider { status: Some(400), .. }));

		let mut second = provider.create("tok");
		let metadata = second.session.start(StartRequest::from(&prewarm_protocol::WarmConfig::new("a1"))).await.unwrap();
		assert_eq!(metadata.session_id, "remote-fake-session-2");
		assert!(matches!(second.events.try_recv(), Ok(StreamEvent::StreamReady { .. })));

		assert_eq!(controller.created_count(), 2);
		assert!(!controller.is_started("fake-session-1"));
		assert!(controller.is_started("fake-session-2"));
	}

	#[tokio::test]
	async fn stop_is_counted_per_session() {
		let (provider, controller) = FakeProviderBuilder::new().build();
		let parts = provider.create("tok");
		parts.session.stop().await.unwrap();
		parts.session.stop().await.unwrap();
		assert_eq!(controller.stop_calls("fake-session-1"), 2);
		assert!(controller.live_sessions().is_empty());
	}

	#[tokio::test]
	async fn held_start_waits_for_release() {
		let (provider, controller) = FakeProviderBuilder::new().script(FakeStart::Hold).build();
		let parts = provider.create("tok");
		let session = Arc::clone(&parts.session);
		let task = tokio::spawn(async move { session.start(StartRequest::from(&prewarm_protocol::WarmConfig::new("a1"))).await });

		controller.wait_for_start().await;
		assert!(!task.is_finished());
		controller.release_start();
		assert!(task.await.unwrap().is_ok());
	}
}
