//! # Process configuration.
//!
//! Provides [`ProcessConfig`], the explicit settings of one process core, and
//! [`HeartbeatConfig`], the thresholds handed to the heartbeat monitor.
//!
//! Nothing is read from ambient globals: every knob is passed at construction
//! through `ProcessCore::builder(..).with_config(cfg)`.
//!
//! ## Sentinel values
//! - `heartbeat.interval = 0s` → clamped to 1ms
//! - `error_log_capacity = 0` → clamped to 1
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

use crate::policies::HeartbeatPolicy;

/// Thresholds and policy of the heartbeat monitor.
///
/// ## Field semantics
/// - `interval`: how often the supervising loop runs the checks
/// - `stall_count_threshold`: consecutive unchanged samples tolerated before a stall
/// - `stall_time_threshold`: time without progress tolerated before a stall
/// - `policy`: what a failed check does
#[derive(Clone, Debug)]
pub struct HeartbeatConfig {
    /// Interval between heartbeat checks.
    pub interval: Duration,
    /// A call is stalled once its snapshot repeats more than this many times in a row.
    pub stall_count_threshold: u32,
    /// A call is stalled once its snapshot has not changed for this long.
    pub stall_time_threshold: Duration,
    /// Escalation policy for failed checks.
    pub policy: HeartbeatPolicy,
}

impl HeartbeatConfig {
    /// Returns the interval clamped to a minimum of 1ms.
    ///
    /// `tokio::time::interval` panics on a zero period.
    #[inline]
    pub fn interval_clamped(&self) -> Duration {
        self.interval.max(Duration::from_millis(1))
    }
}

impl Default for HeartbeatConfig {
    /// - `interval = 10s`
    /// - `stall_count_threshold = 30`
    /// - `stall_time_threshold = 30s`
    /// - `policy = HeartbeatPolicy::LogOnly`
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            stall_count_threshold: 30,
            stall_time_threshold: Duration::from_secs(30),
            policy: HeartbeatPolicy::default(),
        }
    }
}

/// Configuration of one process core.
///
/// All fields are public. Prefer the clamping accessors over reading raw
/// fields that have sentinel values.
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    /// Heartbeat monitor settings.
    pub heartbeat: HeartbeatConfig,

    /// How long `start_listeners` waits for every listener to report ready.
    ///
    /// A timeout does not abort startup.
    pub ready_timeout: Duration,

    /// Maximum time `stop()` waits for the control loop and listener workers.
    ///
    /// When exceeded, remaining children are aborted and
    /// `ProcessError::GraceExceeded` is returned.
    pub stop_grace: Duration,

    /// Maximum number of records kept in the internal error log (oldest evicted first).
    pub error_log_capacity: usize,

    /// Capacity of the event bus broadcast ring buffer.
    ///
    /// Subscribers lagging more than this many events skip the older ones.
    pub bus_capacity: usize,
}

impl ProcessConfig {
    /// Returns the error log capacity clamped to a minimum of 1.
    #[inline]
    pub fn error_log_capacity_clamped(&self) -> usize {
        self.error_log_capacity.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ProcessConfig {
    /// Default configuration:
    ///
    /// - `heartbeat = HeartbeatConfig::default()`
    /// - `ready_timeout = 10s`
    /// - `stop_grace = 30s`
    /// - `error_log_capacity = 100`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            ready_timeout: Duration::from_secs(10),
            stop_grace: Duration::from_secs(30),
            error_log_capacity: 100,
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_clamped() {
        let mut cfg = ProcessConfig::default();
        cfg.heartbeat.interval = Duration::ZERO;
        cfg.error_log_capacity = 0;
        cfg.bus_capacity = 0;

        assert_eq!(cfg.heartbeat.interval_clamped(), Duration::from_millis(1));
        assert_eq!(cfg.error_log_capacity_clamped(), 1);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }

    #[test]
    fn defaults_match_documentation() {
        let cfg = ProcessConfig::default();
        assert_eq!(cfg.heartbeat.interval, Duration::from_secs(10));
        assert_eq!(cfg.heartbeat.stall_count_threshold, 30);
        assert_eq!(cfg.heartbeat.stall_time_threshold, Duration::from_secs(30));
        assert_eq!(cfg.heartbeat.policy, HeartbeatPolicy::LogOnly);
        assert_eq!(cfg.ready_timeout, Duration::from_secs(10));
        assert_eq!(cfg.stop_grace, Duration::from_secs(30));
    }
}
