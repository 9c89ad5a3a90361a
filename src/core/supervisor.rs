//! # Child supervisor: spawns, watches and joins the workers of one process.
//!
//! Every long-running piece of a process (the control loop, each listener's
//! receive loop, the heartbeat loop) runs as a supervised child.
//!
//! ## Rules
//! - A child returning `Ok(())` exits normally; its [`Liveness`] flips to dead.
//! - A child returning `Err(reason)` or panicking is a **child failure**: the first
//!   cause is recorded, `ChildFailed` is published and the process kill token fires.
//! - `join_all(grace)` waits for every child; stragglers past the grace period are
//!   aborted and reported as stuck.
//!
//! ```text
//! spawn(name, kind, fut) ──► tokio::spawn(catch_unwind(fut))
//!                                   │
//!                     Ok(())  ──────┼──► liveness = false
//!                     Err / panic ──┴──► fail(): record cause ─► ChildFailed ─► kill.cancel()
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ChildFailure, ChildKind, ProcessError, panic_message};
use crate::events::{Bus, Event, EventKind};

/// Shared alive flag of one child, cleared when the child's task ends.
#[derive(Clone, Debug)]
pub(crate) struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    #[cfg(test)]
    pub(crate) fn dead() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Clears the flag however the task ends (return, panic, abort).
struct AliveGuard(Liveness);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        (self.0).0.store(false, Ordering::Release);
    }
}

struct Child {
    name: Arc<str>,
    join: JoinHandle<()>,
}

pub(crate) struct ChildSupervisor {
    process: Arc<str>,
    bus: Bus,
    kill: CancellationToken,
    failure: Mutex<Option<ChildFailure>>,
    children: Mutex<Vec<Child>>,
}

impl ChildSupervisor {
    pub(crate) fn new(process: Arc<str>, bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            process,
            bus,
            kill: CancellationToken::new(),
            failure: Mutex::new(None),
            children: Mutex::new(Vec::new()),
        })
    }

    /// Fires once a child failed.
    pub(crate) fn kill_token(&self) -> &CancellationToken {
        &self.kill
    }

    /// First recorded child failure.
    pub(crate) fn failure(&self) -> Option<ChildFailure> {
        self.failure.lock().clone()
    }

    /// Spawns `fut` as a supervised child.
    pub(crate) fn spawn<F>(self: &Arc<Self>, name: &str, kind: ChildKind, fut: F) -> Liveness
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let name: Arc<str> = Arc::from(name);
        let live = Liveness::new();
        let guard = AliveGuard(live.clone());
        let me = Arc::clone(self);
        let child = Arc::clone(&name);

        let join = tokio::spawn(async move {
            let _guard = guard;
            let reason = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => {
                    tracing::debug!(process = %me.process, child = %child, %kind, "child exited");
                    return;
                }
                Ok(Err(reason)) => reason,
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };
            me.fail(ChildFailure {
                child,
                kind,
                reason,
            });
        });

        self.children.lock().push(Child { name, join });
        live
    }

    /// Records `failure` (first one wins) and kills the process.
    pub(crate) fn fail(&self, failure: ChildFailure) {
        tracing::error!(
            process = %self.process,
            child = %failure.child,
            kind = %failure.kind,
            reason = %failure.reason,
            "child failed, terminating process"
        );
        self.bus.publish(
            Event::new(EventKind::ChildFailed)
                .with_process(Arc::clone(&self.process))
                .with_listener(Arc::clone(&failure.child))
                .with_reason(failure.reason.as_str()),
        );
        {
            let mut slot = self.failure.lock();
            if slot.is_none() {
                *slot = Some(failure);
            }
        }
        self.kill.cancel();
    }

    /// Waits up to `grace` for every spawned child.
    ///
    /// Returns `GraceExceeded` if some child had to be aborted, otherwise the
    /// recorded child failure, if any.
    pub(crate) async fn join_all(&self, grace: Duration) -> Result<(), ProcessError> {
        let mut children = std::mem::take(&mut *self.children.lock());

        let all = futures::future::join_all(children.iter_mut().map(|c| &mut c.join));
        let joined = tokio::time::timeout(grace, all).await.is_ok();
        if !joined {
            let stuck: Vec<String> = children
                .iter()
                .filter(|c| !c.join.is_finished())
                .map(|c| c.name.to_string())
                .collect();
            for c in &children {
                c.join.abort();
            }
            tracing::error!(process = %self.process, ?grace, ?stuck, "grace exceeded, aborting children");
            self.bus.publish(
                Event::new(EventKind::GraceExceeded)
                    .with_process(Arc::clone(&self.process))
                    .with_reason(stuck.join(","))
                    .with_elapsed(grace),
            );
            return Err(ProcessError::GraceExceeded { grace, stuck });
        }
        self.bus
            .publish(Event::new(EventKind::AllStoppedWithin).with_process(Arc::clone(&self.process)));

        match self.failure() {
            Some(f) => Err(ProcessError::ChildFailed(f)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn normal_exit_clears_liveness() {
        let sup = ChildSupervisor::new("p".into(), Bus::new(8));
        let live = sup.spawn("quick", ChildKind::Listener, async { Ok(()) });
        assert!(sup.join_all(Duration::from_secs(1)).await.is_ok());
        assert!(!live.is_alive());
        assert!(!sup.kill_token().is_cancelled());
    }

    #[tokio::test]
    async fn panic_is_a_child_failure() {
        let sup = ChildSupervisor::new("p".into(), Bus::new(8));
        let mut rx = sup.bus.subscribe();
        sup.spawn("bad", ChildKind::Listener, async {
            if true {
                panic!("boom");
            }
            Ok(())
        });

        sup.kill_token().cancelled().await;
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ChildFailed);

        match sup.join_all(Duration::from_secs(1)).await {
            Err(ProcessError::ChildFailed(f)) => {
                assert_eq!(&*f.child, "bad");
                assert!(f.reason.contains("boom"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_failure_wins() {
        let sup = ChildSupervisor::new("p".into(), Bus::new(8));
        sup.spawn("a", ChildKind::Listener, async { Err("first".to_string()) });
        sup.kill_token().cancelled().await;
        sup.spawn("b", ChildKind::Heartbeat, async { Err("second".to_string()) });

        let err = sup.join_all(Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("first"));
    }

    #[tokio::test(start_paused = true)]
    async fn stragglers_are_aborted() {
        let sup = ChildSupervisor::new("p".into(), Bus::new(8));
        let live = sup.spawn("stuck", ChildKind::Control, std::future::pending());

        match sup.join_all(Duration::from_millis(50)).await {
            Err(ProcessError::GraceExceeded { stuck, .. }) => assert_eq!(stuck, vec!["stuck"]),
            other => panic!("unexpected: {other:?}"),
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!live.is_alive());
    }
}
