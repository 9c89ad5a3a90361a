//! # Heartbeat monitor.
//!
//! Tells a slow call from a stuck one by sampling the progress marker of the
//! executing call on every heartbeat tick.
//!
//! ## Rules
//! ```text
//! sample(call, snapshot)
//!   ├─ same call, same snapshot    → repeats += 1; stalled if repeats > count threshold
//!   │                                              or now - changed_at >= time threshold
//!   ├─ same call, new snapshot     → progress: repeats = 1, changed_at = now
//!   ├─ different call              → track the new call from scratch
//!   └─ nothing executing           → forget everything
//! ```
//!
//! The monitor is pure bookkeeping: the supervising loop feeds it samples, it
//! never looks at the control loop itself.

use tokio::time::Instant;

use crate::calls::CallId;
use crate::core::config::HeartbeatConfig;
use crate::operations::ProgressSnapshot;

/// Result of one heartbeat: three independent checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// Every attached listener's worker is alive.
    pub listeners_ok: bool,
    /// The control loop's worker is alive.
    pub control_ok: bool,
    /// The executing call (if any) is making progress.
    pub no_stall: bool,
}

impl HeartbeatReport {
    /// True if every check passed.
    #[inline]
    pub fn all_ok(&self) -> bool {
        self.listeners_ok && self.control_ok && self.no_stall
    }

    /// Names of the failed checks, for logs.
    pub fn failed_checks(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.listeners_ok {
            out.push("listeners");
        }
        if !self.control_ok {
            out.push("control");
        }
        if !self.no_stall {
            out.push("stall");
        }
        out
    }
}

impl From<HeartbeatReport> for (bool, bool, bool) {
    fn from(r: HeartbeatReport) -> Self {
        (r.listeners_ok, r.control_ok, r.no_stall)
    }
}

/// What the monitor remembers about the executing call.
#[derive(Debug, Clone)]
pub(crate) struct HeartbeatState {
    /// Identity of the last observed call.
    pub(crate) call: CallId,
    /// Progress snapshot at the last change.
    pub(crate) snapshot: ProgressSnapshot,
    /// Consecutive samples with an unchanged snapshot (including the first).
    pub(crate) repeats: u32,
    /// When the snapshot last changed.
    pub(crate) changed_at: Instant,
}

/// Stall detector fed by the supervising loop.
pub(crate) struct HeartbeatMonitor {
    count_threshold: u32,
    time_threshold: std::time::Duration,
    state: Option<HeartbeatState>,
}

impl HeartbeatMonitor {
    pub(crate) fn new(cfg: &HeartbeatConfig) -> Self {
        Self {
            count_threshold: cfg.stall_count_threshold,
            time_threshold: cfg.stall_time_threshold,
            state: None,
        }
    }

    /// Feeds one sample; returns `true` if no stall is detected.
    pub(crate) fn sample(&mut self, current: Option<(CallId, ProgressSnapshot)>, now: Instant) -> bool {
        let Some((call, snapshot)) = current else {
            self.state = None;
            return true;
        };

        match self.state.as_mut() {
            Some(st) if st.call == call && st.snapshot == snapshot => {
                st.repeats = st.repeats.saturating_add(1);
                let idle = now.saturating_duration_since(st.changed_at);
                !(st.repeats > self.count_threshold || idle >= self.time_threshold)
            }
            _ => {
                self.state = Some(HeartbeatState {
                    call,
                    snapshot,
                    repeats: 1,
                    changed_at: now,
                });
                true
            }
        }
    }

    /// Current tracking state, if a call is being watched.
    pub(crate) fn state(&self) -> Option<&HeartbeatState> {
        self.state.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::calls::CallFuture;

    fn monitor(count: u32, time: Duration) -> HeartbeatMonitor {
        HeartbeatMonitor::new(&HeartbeatConfig {
            stall_count_threshold: count,
            stall_time_threshold: time,
            ..HeartbeatConfig::default()
        })
    }

    fn snap(ticks: u64) -> ProgressSnapshot {
        ProgressSnapshot { ticks, label: None }
    }

    #[test]
    fn unchanged_snapshot_trips_count_threshold() {
        let mut m = monitor(3, Duration::from_secs(3600));
        let call = CallFuture::new().id();
        let t0 = Instant::now();

        for i in 0..3 {
            assert!(m.sample(Some((call, snap(0))), t0 + Duration::from_millis(i)));
        }
        assert!(!m.sample(Some((call, snap(0))), t0 + Duration::from_millis(4)));
        assert_eq!(m.state().map(|s| s.repeats), Some(4));
    }

    #[test]
    fn unchanged_snapshot_trips_time_threshold() {
        let mut m = monitor(1000, Duration::from_secs(30));
        let call = CallFuture::new().id();
        let t0 = Instant::now();

        assert!(m.sample(Some((call, snap(0))), t0));
        assert!(m.sample(Some((call, snap(0))), t0 + Duration::from_secs(29)));
        assert!(!m.sample(Some((call, snap(0))), t0 + Duration::from_secs(30)));
    }

    #[test]
    fn progress_resets_tracking() {
        let mut m = monitor(2, Duration::from_secs(5));
        let call = CallFuture::new().id();
        let t0 = Instant::now();

        for i in 0..20u64 {
            let at = t0 + Duration::from_secs(i * 2);
            assert!(m.sample(Some((call, snap(i))), at), "tick {i}");
        }
        assert_eq!(m.state().map(|s| s.repeats), Some(1));
    }

    #[test]
    fn label_change_counts_as_progress() {
        let mut m = monitor(1, Duration::from_secs(60));
        let call = CallFuture::new().id();
        let t0 = Instant::now();
        let a = ProgressSnapshot { ticks: 1, label: Some(Arc::from("a")) };
        let b = ProgressSnapshot { ticks: 1, label: Some(Arc::from("b")) };

        assert!(m.sample(Some((call, a)), t0));
        assert!(m.sample(Some((call, b)), t0 + Duration::from_secs(1)));
    }

    #[test]
    fn new_call_and_idle_reset_tracking() {
        let mut m = monitor(1, Duration::from_secs(60));
        let first = CallFuture::new().id();
        let second = CallFuture::new().id();
        let t0 = Instant::now();

        assert!(m.sample(Some((first, snap(0))), t0));
        assert!(!m.sample(Some((first, snap(0))), t0));
        assert!(m.sample(Some((second, snap(0))), t0));
        assert_eq!(m.state().map(|s| s.call), Some(second));

        assert!(m.sample(None, t0));
        assert!(m.state().is_none());
    }

    #[test]
    fn report_converts_to_tuple() {
        let r = HeartbeatReport { listeners_ok: true, control_ok: false, no_stall: true };
        assert!(!r.all_ok());
        assert_eq!(r.failed_checks(), vec!["control"]);
        assert_eq!(<(bool, bool, bool)>::from(r), (true, false, true));
    }
}
