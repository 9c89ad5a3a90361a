//! Supervision policies.
//!
//! ## Contents
//! - [`HeartbeatPolicy`] whether a failed heartbeat is only reported or kills the process
//!
//! ## Defaults
//! - `HeartbeatPolicy::LogOnly`: stalls and dead workers are logged, never escalated.

mod heartbeat;

pub use heartbeat::HeartbeatPolicy;
