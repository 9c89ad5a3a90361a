//! # Per-call execution context.
//!
//! [`CallCx`] is handed to every operation invocation. It exposes:
//! - the interrupt signal for this call (best-effort abort, checked at safe points);
//! - progress reporting, which the heartbeat monitor samples to tell a slow
//!   call from a stuck one;
//! - the call's [`CallContext`] headers.
//!
//! ## Progress
//! ```text
//! operation ── cx.progress("page 3") ──► Progress { ticks += 1, label }
//!                                             ▲
//! heartbeat ── snapshot() ────────────────────┘   (unchanged snapshot => no progress)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::calls::CallContext;

/// Progress marker of the executing call.
#[derive(Debug, Default)]
pub struct Progress {
    ticks: AtomicU64,
    label: Mutex<Option<Arc<str>>>,
}

/// Point-in-time copy of a [`Progress`] marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Number of progress reports so far.
    pub ticks: u64,
    /// Last label reported, if any.
    pub label: Option<Arc<str>>,
}

impl Progress {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn mark(&self, label: Arc<str>) {
        *self.label.lock() = Some(label);
        self.tick();
    }

    /// Copies the current marker.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let label = self.label.lock().clone();
        ProgressSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            label,
        }
    }
}

/// Execution context of one call.
#[derive(Clone)]
pub struct CallCx {
    interrupt: CancellationToken,
    progress: Arc<Progress>,
    context: Option<CallContext>,
}

impl CallCx {
    pub(crate) fn new(
        interrupt: CancellationToken,
        progress: Arc<Progress>,
        context: Option<CallContext>,
    ) -> Self {
        Self {
            interrupt,
            progress,
            context,
        }
    }

    /// Context detached from any process; never interrupted.
    ///
    /// Useful for invoking operations directly in tests.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new(), Progress::new(), None)
    }

    /// True once an abort was requested for this call.
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Completes when an abort is requested for this call.
    pub async fn interrupted(&self) {
        self.interrupt.cancelled().await
    }

    /// Reports progress without a label.
    pub fn tick(&self) {
        self.progress.tick();
    }

    /// Reports progress with a label describing the current step.
    pub fn progress(&self, label: impl Into<Arc<str>>) {
        self.progress.mark(label.into());
    }

    /// Context headers of this call.
    pub fn context(&self) -> Option<&CallContext> {
        self.context.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_changes_on_progress() {
        let p = Progress::new();
        let cx = CallCx::new(CancellationToken::new(), Arc::clone(&p), None);
        let before = p.snapshot();

        cx.tick();
        let after_tick = p.snapshot();
        assert_ne!(before, after_tick);

        cx.progress("step-2");
        let after_label = p.snapshot();
        assert_eq!(after_label.label.as_deref(), Some("step-2"));
        assert_eq!(after_label.ticks, 2);
    }

    #[test]
    fn detached_is_never_interrupted() {
        assert!(!CallCx::detached().is_interrupted());
    }
}
