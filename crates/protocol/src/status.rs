//! Observable warming status.

use serde::{Deserialize, Serialize};

/// Status text published once a session is installed.
pub const READY_STATUS_TEXT: &str = "Ready!";

/// Status text published when warming gave up; the practice screen connects on demand.
pub const FALLBACK_STATUS_TEXT: &str = "Will connect on start";

/// Progress of the background warming cycle.
///
/// `is_warming` is `true` only while a cycle is running. Progress and text are
/// cosmetic and never drive control flow.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmingStatus {
	pub is_warming: bool,
	/// Percentage in `0..=100`.
	pub progress: u8,
	pub status_text: String,
}

impl WarmingStatus {
	/// Status before any cycle or after cancellation.
	pub fn idle() -> Self {
		Self::default()
	}

	/// In-flight milestone. `progress` is clamped to 100.
	pub fn warming(progress: u8, status_text: impl Into<String>) -> Self {
		Self {
			is_warming: true,
			progress: progress.min(100),
			status_text: status_text.into(),
		}
	}

	/// Terminal success.
	pub fn ready() -> Self {
		Self {
			is_warming: false,
			progress: 100,
			status_text: READY_STATUS_TEXT.to_string(),
		}
	}

	/// Terminal failure.
	pub fn fallback() -> Self {
		Self {
			is_warming: false,
			progress: 0,
			status_text: FALLBACK_STATUS_TEXT.to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn terminal_states_are_not_warming() {
		assert!(!WarmingStatus::idle().is_warming);
		assert!(!WarmingStatus::ready().is_warming);
		assert!(!WarmingStatus::fallback().is_warming);
		assert_eq!(WarmingStatus::ready().progress, 100);
	}

	#[test]
	fn warming_clamps_progress() {
		let status = WarmingStatus::warming(250, "x");
		assert!(status.is_warming);
		assert_eq!(status.progress, 100);
	}
}
