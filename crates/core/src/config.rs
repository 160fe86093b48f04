//! Pool tuning loaded from JSON or built in code.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifetime of a cached bearer token (10 minutes).
pub const DEFAULT_TOKEN_TTL_MS: u64 = 10 * 60 * 1000;

/// Timeout for a single token endpoint request.
pub const DEFAULT_TOKEN_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Oldest a prewarmed session may be when handed out (15 minutes).
pub const DEFAULT_MAX_SESSION_AGE_MS: u64 = 15 * 60 * 1000;

/// Bound on waiting for the media stream after the session started.
pub const DEFAULT_STREAM_READY_TIMEOUT_MS: u64 = 8_000;

/// Delay before retrying a capacity-limited start.
pub const DEFAULT_CAPACITY_BACKOFF_MS: u64 = 3_000;

/// Retries allowed after the first capacity-limited attempt.
pub const DEFAULT_MAX_CAPACITY_RETRIES: u32 = 2;

/// Message fragments that identify a provider capacity error.
pub fn default_capacity_signatures() -> Vec<String> {
	["concurrent", "capacity", "limit reached", "too many sessions"]
		.into_iter()
		.map(String::from)
		.collect()
}

/// Tuning for [`PrewarmPool`](crate::PrewarmPool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrewarmConfig {
	/// Backend endpoint issuing bearer tokens, used by [`HttpTokenSource`](crate::HttpTokenSource).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub token_endpoint: Option<String>,
	pub token_ttl_ms: u64,
	pub token_request_timeout_ms: u64,
	pub max_session_age_ms: u64,
	pub stream_ready_timeout_ms: u64,
	pub capacity_backoff_ms: u64,
	pub max_capacity_retries: u32,
	pub capacity_signatures: Vec<String>,
}

impl Default for PrewarmConfig {
	fn default() -> Self {
		Self {
			token_endpoint: None,
			token_ttl_ms: DEFAULT_TOKEN_TTL_MS,
			token_request_timeout_ms: DEFAULT_TOKEN_REQUEST_TIMEOUT_MS,
			max_session_age_ms: DEFAULT_MAX_SESSION_AGE_MS,
			stream_ready_timeout_ms: DEFAULT_STREAM_READY_TIMEOUT_MS,
			capacity_backoff_ms: DEFAULT_CAPACITY_BACKOFF_MS,
			max_capacity_retries: DEFAULT_MAX_CAPACITY_RETRIES,
			capacity_signatures: default_capacity_signatures(),
		}
	}
}

impl PrewarmConfig {
	/// Loads and validates a JSON config file.
	pub fn from_file(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)?;
		let config: Self = serde_json::from_str(&content)?;
		config.validate()?;
		Ok(config)
	}

	/// Rejects settings that would make the pool unusable.
	pub fn validate(&self) -> Result<()> {
		if self.token_ttl_ms == 0 {
			return Err(Error::Config("tokenTtlMs must be greater than zero".to_string()));
		}
		if self.max_session_age_ms == 0 {
			return Err(Error::Config("maxSessionAgeMs must be greater than zero".to_string()));
		}
		if self.stream_ready_timeout_ms == 0 {
			return Err(Error::Config("streamReadyTimeoutMs must be greater than zero".to_string()));
		}
		if let Some(endpoint) = &self.token_endpoint {
			if endpoint.trim().is_empty() {
				return Err(Error::Config("tokenEndpoint must not be blank".to_string()));
			}
		}
		Ok(())
	}

	pub fn token_ttl(&self) -> Duration {
		Duration::from_millis(self.token_ttl_ms)
	}

	pub fn token_request_timeout(&self) -> Duration {
		Duration::from_millis(self.token_request_timeout_ms)
	}

	pub fn max_session_age(&self) -> Duration {
		Duration::from_millis(self.max_session_age_ms)
	}

	pub fn stream_ready_timeout(&self) -> Duration {
		Duration::from_millis(self.stream_ready_timeout_ms)
	}

	pub fn capacity_backoff(&self) -> Duration {
		Duration::from_millis(self.capacity_backoff_ms)
	}
}
