//! Shapes exchanged with the remote avatar provider.

use serde::{Deserialize, Serialize};

use crate::config::WarmConfig;

/// Parameters for starting a remote avatar session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
	pub resource_id: String,
	#[serde(default)]
	pub context_payload: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub locale: Option<String>,
}

impl From<&WarmConfig> for StartRequest {
	fn from(config: &WarmConfig) -> Self {
		Self {
			resource_id: config.resource_id.clone(),
			context_payload: config.context_payload.clone(),
			locale: config.locale.clone(),
		}
	}
}

/// Metadata returned by the provider once a session has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
	pub session_id: String,
	/// Realtime endpoint the client joins, when the provider exposes one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub realtime_endpoint: Option<String>,
}

impl SessionMetadata {
	pub fn new(session_id: impl Into<String>) -> Self {
		Self {
			session_id: session_id.into(),
			realtime_endpoint: None,
		}
	}
}

/// Opaque handle to the avatar's media stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStream {
	pub id: String,
	/// Track identifiers (audio/video).
	#[serde(default)]
	pub tracks: Vec<String>,
}

impl MediaStream {
	pub fn new(id: impl Into<String>) -> Self {
		Self { id: id.into(), tracks: Vec::new() }
	}
}

/// Notification emitted by a remote session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
	/// Media stream became available.
	StreamReady { stream: MediaStream },
	/// Stream dropped; the session is no longer usable.
	StreamDisconnected { reason: String },
}
