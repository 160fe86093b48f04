//! Session handles and the slot holding the current and previous prewarmed session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use prewarm_protocol::{MediaStream, SessionMetadata, StreamEvent, WarmConfig};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing::warn;

use crate::provider::RemoteSession;

/// One live remote session plus local bookkeeping.
pub struct SessionHandle {
	pub token: String,
	pub session: Arc<dyn RemoteSession>,
	pub metadata: SessionMetadata,
	/// `None` when the readiness wait timed out.
	pub media_stream: Option<MediaStream>,
	pub resource_id: String,
	pub context_payload_variant: Option<String>,
	pub is_ready: bool,
	pub created_at: Instant,
	events: mpsc::UnboundedReceiver<StreamEvent>,
	disconnected: Option<String>,
}

impl SessionHandle {
	pub(crate) fn new(
		token: String,
		session: Arc<dyn RemoteSession>,
		metadata: SessionMetadata,
		media_stream: Option<MediaStream>,
		config: &WarmConfig,
		events: mpsc::UnboundedReceiver<StreamEvent>,
	) -> Self {
		Self {
			token,
			session,
			metadata,
			media_stream,
			resource_id: config.resource_id.clone(),
			context_payload_variant: config.context_payload_variant.clone(),
			is_ready: true,
			created_at: Instant::now(),
			events,
			disconnected: None,
		}
	}

	/// Local id of the underlying session object.
	pub fn session_id(&self) -> &str {
		self.session.id()
	}

	/// Returns `true` when this handle was built for a config equivalent to `config`.
	pub fn matches(&self, config: &WarmConfig) -> bool {
		config.matches(&self.resource_id, self.context_payload_variant.as_deref())
	}

	pub fn age(&self) -> Duration {
		self.created_at.elapsed()
	}

	pub fn is_expired(&self, max_age: Duration) -> bool {
		self.age() >= max_age
	}

	/// Reason the stream dropped, once a disconnect has been observed.
	pub fn disconnect_reason(&self) -> Option<&str> {
		self.disconnected.as_deref()
	}

	/// Applies stream events queued since the last call.
	///
	/// A late `StreamReady` fills in `media_stream`; a `StreamDisconnected`
	/// marks the handle dead. Returns `true` while the handle is still alive.
	pub fn poll_events(&mut self) -> bool {
		loop {
			match self.events.try_recv() {
				Ok(StreamEvent::StreamReady { stream }) => {
					if self.media_stream.is_none() {
						self.media_stream = Some(stream);
					}
				}
				Ok(StreamEvent::StreamDisconnected { reason }) => {
					self.disconnected = Some(reason);
				}
				Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
			}
		}
		self.disconnected.is_none()
	}

	/// Ready, alive, matching `config` and younger than `max_age`.
	pub fn is_fresh_for(&mut self, config: &WarmConfig, max_age: Duration) -> bool {
		self.poll_events() && self.is_ready && self.matches(config) && !self.is_expired(max_age)
	}

	/// Stream events not yet consumed, for the caller that owns this handle.
	pub fn events(&mut self) -> &mut mpsc::UnboundedReceiver<StreamEvent> {
		&mut self.events
	}

	pub fn summary(&self) -> HandleSummary {
		HandleSummary {
			session_id: self.session_id().to_string(),
			remote_session_id: self.metadata.session_id.clone(),
			resource_id: self.resource_id.clone(),
			context_payload_variant: self.context_payload_variant.clone(),
			is_ready: self.is_ready,
			has_stream: self.media_stream.is_some(),
			age_ms: self.age().as_millis() as u64,
		}
	}

	/// Stops the remote session. Must only be called once the handle is off the slot.
	pub(crate) async fn teardown(self) {
		if let Err(err) = self.session.stop().await {
			warn!(target = "prewarm.pool", session = %self.session.id(), error = %err, "session teardown failed");
		}
	}
}

impl fmt::Debug for SessionHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionHandle")
			.field("session_id", &self.session.id())
			.field("metadata", &self.metadata)
			.field("media_stream", &self.media_stream)
			.field("resource_id", &self.resource_id)
			.field("context_payload_variant", &self.context_payload_variant)
			.field("is_ready", &self.is_ready)
			.field("created_at", &self.created_at)
			.finish_non_exhaustive()
	}
}

/// Read-only view of a slotted handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleSummary {
	pub session_id: String,
	pub remote_session_id: String,
	pub resource_id: String,
	pub context_payload_variant: Option<String>,
	pub is_ready: bool,
	pub has_stream: bool,
	pub age_ms: u64,
}

/// At most one current and one previous session.
///
/// Every method that removes a handle returns it; callers tear it down after
/// releasing the pool lock.
#[derive(Debug, Default)]
pub(crate) struct SessionSlot {
	current: Option<SessionHandle>,
	previous: Option<SessionHandle>,
}

impl SessionSlot {
	pub(crate) fn current(&self) -> Option<&SessionHandle> {
		self.current.as_ref()
	}

	pub(crate) fn current_mut(&mut self) -> Option<&mut SessionHandle> {
		self.current.as_mut()
	}

	pub(crate) fn previous(&self) -> Option<&SessionHandle> {
		self.previous.as_ref()
	}

	pub(crate) fn previous_mut(&mut self) -> Option<&mut SessionHandle> {
		self.previous.as_mut()
	}

	pub(crate) fn take_current(&mut self) -> Option<SessionHandle> {
		self.current.take()
	}

	pub(crate) fn take_previous(&mut self) -> Option<SessionHandle> {
		self.previous.take()
	}

	/// Returns `true` when either position holds the session with `session_id`.
	pub(crate) fn holds(&self, session_id: &str) -> bool {
		self.current.iter().chain(self.previous.iter()).any(|h| h.session_id() == session_id)
	}

	/// Installs `handle` as current.
	///
	/// The old previous is retired. The old current becomes previous when it is
	/// ready and built for a different config, otherwise it is retired.
	pub(crate) fn install(&mut self, handle: SessionHandle) -> Vec<SessionHandle> {
		let mut retired: Vec<SessionHandle> = self.previous.take().into_iter().collect();

		if let Some(old) = self.current.take() {
			if old.is_ready && !same_config(&old, &handle) {
				self.previous = Some(old);
			} else {
				retired.push(old);
			}
		}

		self.current = Some(handle);
		retired
	}

	/// Moves a ready current into the previous position.
	///
	/// Returns whatever had to be retired: the older previous, or a current
	/// that was not ready.
	pub(crate) fn demote_current(&mut self) -> Vec<SessionHandle> {
		let Some(current) = self.current.take() else {
			return Vec::new();
		};

		if current.is_ready {
			self.previous.replace(current).into_iter().collect()
		} else {
			vec![current]
		}
	}

	/// Empties both positions.
	pub(crate) fn clear(&mut self) -> Vec<SessionHandle> {
		self.current.take().into_iter().chain(self.previous.take()).collect()
	}
}

fn same_config(a: &SessionHandle, b: &SessionHandle) -> bool {
	a.resource_id == b.resource_id && a.context_payload_variant == b.context_payload_variant
}
