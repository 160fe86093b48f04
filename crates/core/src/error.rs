//! Error types for the prewarm pool.

use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while acquiring credentials or bringing up a remote session.
///
/// None of these escape the warming operations; they are converted into a
/// [`WarmOutcome`](crate::WarmOutcome) and a user-facing status string.
#[derive(Debug, Error)]
pub enum Error {
	/// Credential could not be obtained from the token endpoint.
	#[error("token fetch failed: {0}")]
	TokenFetch(String),

	/// Provider reported it is over its concurrent session capacity.
	#[error("provider over capacity: {0}")]
	CapacityLimit(String),

	/// Raw provider failure, classified later by the warming cycle.
	#[error("provider error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
	Provider { status: Option<u16>, message: String },

	/// Any other failure while creating or starting the session.
	#[error("session creation failed: {0}")]
	Creation(String),

	/// Stream never became ready within the bound.
	#[error("stream not ready after {0:?}")]
	Timeout(Duration),

	/// Stream dropped before it became ready.
	#[error("stream disconnected: {0}")]
	Disconnected(String),

	/// Cycle was cancelled while suspended.
	#[error("warming cancelled")]
	Cancelled,

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error(transparent)]
	Http(#[from] reqwest::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl Error {
	/// Returns `true` when this error means the provider is over capacity.
	///
	/// Provider errors count when they carry HTTP 429 or a message containing
	/// one of `signatures` (case-insensitive).
	pub fn is_capacity_limit(&self, signatures: &[String]) -> bool {
		match self {
			Error::CapacityLimit(_) => true,
			Error::Provider { status: Some(429), .. } => true,
			Error::Provider { message, .. } => {
				let message = message.to_lowercase();
				signatures.iter().any(|sig| !sig.is_empty() && message.contains(&sig.to_lowercase()))
			}
			_ => false,
		}
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Error::Cancelled)
	}
}
