//! Background prewarming of live avatar conversation sessions.
//!
//! A [`PrewarmPool`] fetches a short-lived access token, creates and starts a
//! remote avatar session and waits for its media stream while the user is
//! still deciding. When the user starts a conversation the UI calls
//! [`PrewarmPool::consume`] and, on a hit, connects instantly.
//!
//! The pool is shared: create one per process, wrap it in an `Arc`, and let
//! every UI surface call into it. Providers plug in through
//! [`SessionFactory`]; tokens through [`TokenSource`].
//!
//! ```ignore
//! let pool = Arc::new(PrewarmPool::new(config, token_source, factory));
//! pool.spawn_warming(WarmConfig::new("avatar-1"));
//!
//! // later, when the user presses start
//! match pool.consume(Some(&WarmConfig::new("avatar-1"))).await {
//!     Some(handle) => attach(handle),
//!     None => connect_on_demand().await,
//! }
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod pool;
pub mod provider;
pub mod slot;
pub mod stats;
pub mod subscribers;
pub mod token;
pub mod warming;

pub use config::PrewarmConfig;
pub use error::{Error, Result};
pub use gate::ConsumeMiss;
pub use pool::{PoolSnapshot, PrewarmPool};
pub use prewarm_protocol::{
	FALLBACK_STATUS_TEXT, MediaStream, READY_STATUS_TEXT, SessionMetadata, StartRequest, StreamEvent, WarmConfig, WarmingStatus,
};
pub use provider::{RemoteSession, SessionFactory, SessionParts};
pub use slot::{HandleSummary, SessionHandle};
pub use stats::{PoolStats, StatsSnapshot};
pub use subscribers::{SubscriberRegistry, Subscription};
pub use token::{CachedToken, HttpTokenSource, StaticTokenSource, TokenCache, TokenSource};
pub use warming::{FailureKind, WarmOutcome};
