//! Seams to the remote avatar provider.
//!
//! The pool never talks to a provider SDK directly. It asks a
//! [`SessionFactory`] for a [`RemoteSession`] object together with the
//! receiver of that session's stream events, then drives the session through
//! the trait.

pub mod fake;

use std::sync::Arc;

use async_trait::async_trait;
use prewarm_protocol::{SessionMetadata, StartRequest, StreamEvent};
use tokio::sync::mpsc;

use crate::error::Result;

/// One remote avatar session object.
#[async_trait]
pub trait RemoteSession: Send + Sync {
	/// Local identifier, unique per created object.
	fn id(&self) -> &str;

	/// Starts the remote session. Provider errors are reported as
	/// [`Error::Provider`](crate::Error::Provider) so the pool can classify them.
	async fn start(&self, request: StartRequest) -> Result<SessionMetadata>;

	/// Stops the session and releases its media. Idempotent.
	async fn stop(&self) -> Result<()>;
}

/// A freshly created session and its event stream.
///
/// The receiver exists before `start` is called, so readiness and disconnect
/// notifications cannot be missed.
pub struct SessionParts {
	pub session: Arc<dyn RemoteSession>,
	pub events: mpsc::UnboundedReceiver<StreamEvent>,
}

/// Creates remote session objects bound to a bearer token.
pub trait SessionFactory: Send + Sync {
	fn create(&self, token: &str) -> SessionParts;
}
