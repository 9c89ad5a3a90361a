//! # Escalation policy for heartbeat failures.
//!
//! [`HeartbeatPolicy`] decides what the heartbeat loop does when a check fails.
//!
//! - [`HeartbeatPolicy::LogOnly`] the failure is logged and published (default).
//! - [`HeartbeatPolicy::Terminate`] the failure is also escalated as a child failure,
//!   which kills the process like any other dying worker.
//!
//! ```text
//! heartbeat tick ──► (listeners_ok, control_ok, no_stall)
//!                          │ any false
//!                          ▼
//!          warn! + HeartbeatFailed ──► LogOnly:   keep going
//!                                  └─► Terminate: supervisor.fail(heartbeat)
//! ```

/// What to do when a heartbeat check reports a problem.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeartbeatPolicy {
    /// Report only; the process keeps running (default).
    #[default]
    LogOnly,
    /// Report, then terminate the process with a heartbeat child failure.
    Terminate,
}

impl HeartbeatPolicy {
    /// True if a failed check must take the process down.
    #[inline]
    pub fn is_fatal(self) -> bool {
        matches!(self, HeartbeatPolicy::Terminate)
    }
}
