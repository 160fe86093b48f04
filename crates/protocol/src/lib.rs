//! Data types for the session prewarm pool.
//!
//! This crate contains the serde-serializable shapes exchanged between the
//! pool, the UI surfaces that drive it, and the remote avatar provider.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: behavior is limited to construction and comparison helpers
//! * Wire-friendly: field names are camelCase on the wire
//! * Stable: changes only when a collaborator's contract changes
//!
//! The pool itself lives in `prewarm-rs`.

pub mod config;
pub mod session;
pub mod status;

pub use config::*;
pub use session::*;
pub use status::*;
