//! Consumption gate: hands a prewarmed session to exactly one caller.

use std::fmt;
use std::time::Duration;

use prewarm_protocol::WarmConfig;
use serde::Serialize;
use tracing::{debug, info};

use crate::pool::PrewarmPool;
use crate::slot::{SessionHandle, SessionSlot};

/// Why [`PrewarmPool::try_consume`] returned no session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsumeMiss {
	Empty,
	NotReady,
	Expired,
	Disconnected,
	ConfigMismatch,
}

impl fmt::Display for ConsumeMiss {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			ConsumeMiss::Empty => "no session warmed",
			ConsumeMiss::NotReady => "session not ready",
			ConsumeMiss::Expired => "session expired",
			ConsumeMiss::Disconnected => "session stream disconnected",
			ConsumeMiss::ConfigMismatch => "session built for a different config",
		};
		f.write_str(text)
	}
}

impl PrewarmPool {
	/// Takes the prewarmed session if it is usable for `expected`.
	///
	/// A hand-out removes the handle from the pool; the caller owns its
	/// teardown from then on. Unusable handles met along the way are torn down.
	pub async fn consume(&self, expected: Option<&WarmConfig>) -> Option<SessionHandle> {
		self.try_consume(expected).await.ok()
	}

	/// Like [`consume`](Self::consume), reporting why nothing was handed out.
	pub async fn try_consume(&self, expected: Option<&WarmConfig>) -> Result<SessionHandle, ConsumeMiss> {
		let max_age = self.config.max_session_age();
		let (result, retired) = {
			let mut state = self.state.lock();
			take_for_consumer(&mut state.slot, expected, max_age)
		};

		match &result {
			Ok(handle) => info!(
				target = "prewarm.gate",
				session = %handle.session_id(),
				has_stream = handle.media_stream.is_some(),
				"prewarmed session handed out"
			),
			Err(miss) => debug!(target = "prewarm.gate", %miss, retired = retired.len(), "no prewarmed session"),
		}

		self.stats.record_consume(result.is_ok());
		if result.is_ok() || !retired.is_empty() {
			self.notify();
		}
		self.teardown(retired).await;
		result
	}
}

/// Decides what a consumer gets in one pass over the slot.
///
/// Returns the hand-out (or the reason for none) and the handles that must
/// be torn down.
pub(crate) fn take_for_consumer(
	slot: &mut SessionSlot,
	expected: Option<&WarmConfig>,
	max_age: Duration,
) -> (Result<SessionHandle, ConsumeMiss>, Vec<SessionHandle>) {
	let mut retired = Vec::new();

	let (alive, expired, matches) = match slot.current_mut() {
		None => {
			// A restart leaves current empty while the old session waits in previous.
			let handed = expected.and_then(|expected| take_previous_for(slot, expected, max_age, &mut retired));
			return (handed.ok_or(ConsumeMiss::Empty), retired);
		}
		Some(current) if !current.is_ready => return (Err(ConsumeMiss::NotReady), retired),
		Some(current) => {
			let alive = current.poll_events();
			(
				alive,
				current.is_expired(max_age),
				expected.is_none_or(|config| current.matches(config)),
			)
		}
	};

	if !alive {
		retired.extend(slot.take_current());
		return (Err(ConsumeMiss::Disconnected), retired);
	}
	if expired {
		retired.extend(slot.take_current());
		return (Err(ConsumeMiss::Expired), retired);
	}

	if !matches {
		// Current stays when previous is handed out: it is what the pool is warming toward.
		if let Some(handed) = expected.and_then(|expected| take_previous_for(slot, expected, max_age, &mut retired)) {
			return (Ok(handed), retired);
		}
		retired.extend(slot.take_current());
		return (Err(ConsumeMiss::ConfigMismatch), retired);
	}

	(slot.take_current().ok_or(ConsumeMiss::Empty), retired)
}

/// Takes previous when it is fresh for `expected`, retiring it when dead or expired.
fn take_previous_for(
	slot: &mut SessionSlot,
	expected: &WarmConfig,
	max_age: Duration,
	retired: &mut Vec<SessionHandle>,
) -> Option<SessionHandle> {
	let previous = slot.previous_mut()?;
	if previous.is_fresh_for(expected, max_age) {
		return slot.take_previous();
	}
	if !previous.poll_events() || previous.is_expired(max_age) {
		retired.extend(slot.take_previous());
	}
	None
}

#[cfg(test)]
mod tests {
	use prewarm_protocol::{SessionMetadata, StreamEvent};

	use super::*;
	use crate::provider::SessionFactory;
	use crate::provider::fake::{FakeProvider, FakeProviderBuilder};

	const MAX_AGE: Duration = Duration::from_secs(900);

	fn handle(provider: &FakeProvider, config: &WarmConfig) -> SessionHandle {
		let parts = provider.create("tok");
		SessionHandle::new(
			"tok".to_string(),
			parts.session,
			SessionMetadata::new("remote"),
			None,
			config,
			parts.events,
		)
	}

	#[tokio::test]
	async fn empty_slot_misses() {
		let mut slot = SessionSlot::default();
		let (result, retired) = take_for_consumer(&mut slot, None, MAX_AGE);
		assert_eq!(result.unwrap_err(), ConsumeMiss::Empty);
		assert!(retired.is_empty());
	}

	#[tokio::test]
	async fn unconditioned_consume_takes_current_once() {
		let (provider, _controller) = FakeProviderBuilder::new().build();
		let mut slot = SessionSlot::default();
		slot.install(handle(&provider, &WarmConfig::new("a")));

		let (first, _) = take_for_consumer(&mut slot, None, MAX_AGE);
		assert_eq!(first.unwrap().session_id(), "fake-session-1");

		let (second, _) = take_for_consumer(&mut slot, None, MAX_AGE);
		assert_eq!(second.unwrap_err(), ConsumeMiss::Empty);
	}

	#[tokio::test]
	async fn not_ready_handle_is_left_in_place() {
		let (provider, _controller) = FakeProviderBuilder::new().build();
		let mut slot = SessionSlot::default();
		let mut pending = handle(&provider, &WarmConfig::new("a"));
		pending.is_ready = false;
		slot.install(pending);

		let (result, retired) = take_for_consumer(&mut slot, None, MAX_AGE);
		assert_eq!(result.unwrap_err(), ConsumeMiss::NotReady);
		assert!(retired.is_empty());
		assert!(slot.current().is_some());
	}

	#[tokio::test(start_paused = true)]
	async fn expired_handle_is_retired() {
		let (provider, _controller) = FakeProviderBuilder::new().build();
		let mut slot = SessionSlot::default();
		slot.install(handle(&provider, &WarmConfig::new("a")));

		tokio::time::advance(MAX_AGE + Duration::from_millis(1)).await;

		let (result, retired) = take_for_consumer(&mut slot, None, MAX_AGE);
		assert_eq!(result.unwrap_err(), ConsumeMiss::Expired);
		assert_eq!(retired.len(), 1);
		assert!(slot.current().is_none());
	}

	#[tokio::test]
	async fn disconnected_handle_is_retired() {
		let (provider, controller) = FakeProviderBuilder::new().build();
		let mut slot = SessionSlot::default();
		slot.install(handle(&provider, &WarmConfig::new("a")));
		controller.emit(
			"fake-session-1",
			StreamEvent::StreamDisconnected {
				reason: "idle".to_string(),
			},
		);

		let (result, retired) = take_for_consumer(&mut slot, None, MAX_AGE);
		assert_eq!(result.unwrap_err(), ConsumeMiss::Disconnected);
		assert_eq!(retired.len(), 1);
	}

	#[tokio::test]
	async fn mismatch_falls_back_to_matching_previous() {
		let (provider, _controller) = FakeProviderBuilder::new().build();
		let mut slot = SessionSlot::default();
		let old = WarmConfig::new("a").with_variant("v1");
		slot.install(handle(&provider, &old));
		slot.install(handle(&provider, &WarmConfig::new("a").with_variant("v2")));

		let (result, retired) = take_for_consumer(&mut slot, Some(&old), MAX_AGE);
		assert_eq!(result.unwrap().session_id(), "fake-session-1");
		assert!(retired.is_empty());
		assert_eq!(slot.current().unwrap().session_id(), "fake-session-2");
	}

	#[tokio::test]
	async fn empty_current_hands_out_matching_previous() {
		let (provider, _controller) = FakeProviderBuilder::new().build();
		let mut slot = SessionSlot::default();
		let old = WarmConfig::new("a").with_variant("v1");
		slot.install(handle(&provider, &old));
		slot.demote_current();

		let (other, _) = take_for_consumer(&mut slot, Some(&WarmConfig::new("a").with_variant("v2")), MAX_AGE);
		assert_eq!(other.unwrap_err(), ConsumeMiss::Empty);
		let (unconditioned, _) = take_for_consumer(&mut slot, None, MAX_AGE);
		assert_eq!(unconditioned.unwrap_err(), ConsumeMiss::Empty);
		assert!(slot.previous().is_some());

		let (result, retired) = take_for_consumer(&mut slot, Some(&old), MAX_AGE);
		assert_eq!(result.unwrap().session_id(), "fake-session-1");
		assert!(retired.is_empty());
		assert!(slot.previous().is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn empty_current_retires_expired_previous() {
		let (provider, _controller) = FakeProviderBuilder::new().build();
		let mut slot = SessionSlot::default();
		let old = WarmConfig::new("a");
		slot.install(handle(&provider, &old));
		slot.demote_current();

		tokio::time::advance(MAX_AGE).await;

		let (result, retired) = take_for_consumer(&mut slot, Some(&old), MAX_AGE);
		assert_eq!(result.unwrap_err(), ConsumeMiss::Empty);
		assert_eq!(retired.len(), 1);
		assert!(slot.previous().is_none());
	}

	#[tokio::test]
	async fn mismatch_without_fallback_retires_current() {
		let (provider, _controller) = FakeProviderBuilder::new().build();
		let mut slot = SessionSlot::default();
		slot.install(handle(&provider, &WarmConfig::new("a")));

		let (result, retired) = take_for_consumer(&mut slot, Some(&WarmConfig::new("b")), MAX_AGE);
		assert_eq!(result.unwrap_err(), ConsumeMiss::ConfigMismatch);
		assert_eq!(retired.len(), 1);
		assert!(slot.current().is_none());
	}
}
