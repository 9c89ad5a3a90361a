//! # Control loop: the single worker that executes calls.
//!
//! One [`ControlLoop`] per process owns the service by value and consumes the
//! call queue in strict FIFO order. Exclusive `&mut` access to the service is
//! the only mutual exclusion there is.
//!
//! ## Per call
//! ```text
//! pop() ──► expired?          → skip, never resolved (CallExpired)
//!       ──► already resolved? → skip (CallSkipped)
//!       ──► mark current, push context
//!       ──► select! {
//!             interrupt  → Interrupted (CallInterrupted)
//!             kill       → Terminated, loop exits
//!             op result  → Completed | Failed(Client) | Failed(Internal) (logged + error log)
//!           }
//!       ──► restore context, add busy time, clear current
//! ```
//!
//! ## Rules
//! - Operation errors never end the loop; only the stop sentinel or a kill does.
//! - A panicking operation is an internal error.
//! - On exit, calls still queued are resolved so no waiter hangs.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::calls::queue::{CallQueue, QueueItem};
use crate::calls::{CallDescriptor, CallFuture, CallId, CallOutcome};
use crate::core::error_log::{ErrorLog, ErrorRecord};
use crate::error::{CallError, OperationError, panic_message};
use crate::events::{Bus, Event, EventKind};
use crate::listeners::ReadyEvent;
use crate::operations::{CallCx, Progress, ProgressSnapshot, Service};

/// The call being executed right now.
pub(crate) struct CurrentCall {
    pub(crate) future: CallFuture,
    pub(crate) progress: Arc<Progress>,
}

impl CurrentCall {
    pub(crate) fn sample(&self) -> (CallId, ProgressSnapshot) {
        (self.future.id(), self.progress.snapshot())
    }
}

/// State shared between the control loop and the process handle.
pub(crate) struct ControlShared {
    pub(crate) process: Arc<str>,
    pub(crate) bus: Bus,
    pub(crate) ready: ReadyEvent,
    pub(crate) busy_nanos: AtomicU64,
    pub(crate) current: Mutex<Option<CurrentCall>>,
    pub(crate) errors: ErrorLog,
    pub(crate) kill: CancellationToken,
    pub(crate) exited: CancellationToken,
}

impl ControlShared {
    pub(crate) fn busy_ms(&self) -> u64 {
        self.busy_nanos.load(Ordering::Acquire) / 1_000_000
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_process(Arc::clone(&self.process))
    }
}

enum Exec {
    Done(Value),
    Failed(OperationError),
    Panicked(String),
    Interrupted,
    Killed,
}

enum Flow {
    Continue,
    Killed,
}

pub(crate) struct ControlLoop<S> {
    shared: Arc<ControlShared>,
    queue: Arc<CallQueue<S>>,
    service: S,
}

impl<S: Service> ControlLoop<S> {
    pub(crate) fn new(shared: Arc<ControlShared>, queue: Arc<CallQueue<S>>, service: S) -> Self {
        Self {
            shared,
            queue,
            service,
        }
    }

    /// Runs until the stop sentinel or a kill.
    pub(crate) async fn run(self) -> Result<(), String> {
        let span = tracing::info_span!("process", name = %self.shared.process);
        self.run_inner().instrument(span).await;
        Ok(())
    }

    async fn run_inner(mut self) {
        let _exited = self.shared.exited.clone().drop_guard();
        self.shared.ready.set();
        self.shared.bus.publish(self.shared.event(EventKind::ProcessReady));
        tracing::debug!("control loop ready");

        let kill = self.shared.kill.clone();
        loop {
            let item = tokio::select! {
                biased;
                _ = kill.cancelled() => break,
                item = self.queue.pop() => item,
            };
            match item {
                QueueItem::Stop => break,
                QueueItem::Call(desc) => {
                    if let Flow::Killed = self.dispatch(desc).await {
                        break;
                    }
                }
            }
        }

        let leftover = self.queue.drain();
        if !leftover.is_empty() {
            tracing::debug!(count = leftover.len(), "resolving calls left in queue");
        }
        let killed = kill.is_cancelled();
        for desc in leftover {
            let err = if killed {
                CallError::Terminated {
                    process: Arc::clone(&self.shared.process),
                }
            } else {
                CallError::Stopped {
                    process: Arc::clone(&self.shared.process),
                }
            };
            let _ = desc.future.resolve(CallOutcome::Failed(err));
        }
        tracing::debug!(killed, "control loop exited");
    }

    async fn dispatch(&mut self, desc: CallDescriptor<S>) -> Flow {
        let expired = desc.is_expired_at(SystemTime::now());
        let CallDescriptor {
            future,
            operation,
            args,
            context,
            origin,
        } = desc;
        let id = future.id();
        let op_name: Arc<str> = Arc::from(operation.name());

        if expired {
            tracing::info!(call = %id, op = %op_name, "reply-by deadline passed, skipping call");
            self.shared.bus.publish(
                self.shared
                    .event(EventKind::CallExpired)
                    .with_call(id)
                    .with_operation(op_name),
            );
            return Flow::Continue;
        }
        if future.is_resolved() {
            tracing::info!(call = %id, op = %op_name, "call already resolved, skipping");
            self.shared.bus.publish(
                self.shared
                    .event(EventKind::CallSkipped)
                    .with_call(id)
                    .with_operation(op_name),
            );
            return Flow::Continue;
        }

        tracing::debug!(call = %id, op = %op_name, "executing call");
        let progress = Progress::new();
        *self.shared.current.lock() = Some(CurrentCall {
            future: future.clone(),
            progress: Arc::clone(&progress),
        });
        let interrupt = future.interrupt_token().clone();
        let cx = CallCx::new(interrupt.clone(), progress, context.clone());
        let started = Instant::now();

        let exec = {
            let mut scope = self.service.push_context(context.clone());
            let body = AssertUnwindSafe(operation.invoke(&mut *scope, cx, args)).catch_unwind();
            tokio::select! {
                biased;
                _ = interrupt.cancelled() => Exec::Interrupted,
                _ = self.shared.kill.cancelled() => Exec::Killed,
                res = body => match res {
                    Ok(Ok(value)) => Exec::Done(value),
                    Ok(Err(err)) => Exec::Failed(err),
                    Err(panic) => Exec::Panicked(panic_message(panic.as_ref())),
                },
            }
        };

        let elapsed = started.elapsed();
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.shared.busy_nanos.fetch_add(nanos, Ordering::AcqRel);
        *self.shared.current.lock() = None;

        match exec {
            Exec::Done(value) => {
                if future.resolve(CallOutcome::Completed(value)).is_err() {
                    tracing::debug!(call = %id, "result discarded, future resolved elsewhere");
                }
            }
            Exec::Failed(err) if err.is_client() => {
                tracing::debug!(call = %id, op = %op_name, error = %err.message, "client error");
                self.shared.bus.publish(
                    self.shared
                        .event(EventKind::CallRejected)
                        .with_call(id)
                        .with_operation(Arc::clone(&op_name))
                        .with_reason(err.message.as_str()),
                );
                let _ = future.resolve(CallOutcome::Failed(CallError::Client { message: err.message }));
            }
            Exec::Failed(OperationError { message, .. }) | Exec::Panicked(message) => {
                tracing::warn!(call = %id, op = %op_name, error = %message, "internal error while executing call");
                self.shared.bus.publish(
                    self.shared
                        .event(EventKind::CallFailed)
                        .with_call(id)
                        .with_operation(Arc::clone(&op_name))
                        .with_reason(message.as_str())
                        .with_elapsed(elapsed),
                );
                self.shared.errors.push(ErrorRecord {
                    at: SystemTime::now(),
                    call: id,
                    operation: Arc::clone(&op_name),
                    origin,
                    context,
                    message,
                });
                let _ = future.resolve(CallOutcome::Failed(CallError::Internal {
                    process: Arc::clone(&self.shared.process),
                    operation: op_name,
                }));
            }
            Exec::Interrupted => {
                tracing::info!(call = %id, op = %op_name, "call interrupted");
                self.shared.bus.publish(
                    self.shared
                        .event(EventKind::CallInterrupted)
                        .with_call(id)
                        .with_operation(op_name)
                        .with_elapsed(elapsed),
                );
                let _ = future.resolve(CallOutcome::Interrupted);
            }
            Exec::Killed => {
                let _ = future.resolve(CallOutcome::Failed(CallError::Terminated {
                    process: Arc::clone(&self.shared.process),
                }));
                return Flow::Killed;
            }
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::calls::{CallArgs, CallContext};
    use crate::operations::{OperationFn, OperationRef};

    #[derive(Default)]
    struct Svc {
        ctx: Option<CallContext>,
        hits: u32,
    }

    impl Service for Svc {
        fn context_slot(&mut self) -> &mut Option<CallContext> {
            &mut self.ctx
        }
    }

    fn shared() -> Arc<ControlShared> {
        Arc::new(ControlShared {
            process: Arc::from("test"),
            bus: Bus::new(64),
            ready: ReadyEvent::new(),
            busy_nanos: AtomicU64::new(0),
            current: Mutex::new(None),
            errors: ErrorLog::new(8),
            kill: CancellationToken::new(),
            exited: CancellationToken::new(),
        })
    }

    fn desc(op: &OperationRef<Svc>, context: Option<CallContext>) -> CallDescriptor<Svc> {
        CallDescriptor {
            future: CallFuture::new(),
            operation: Arc::clone(op),
            args: CallArgs::new(),
            context,
            origin: None,
        }
    }

    #[tokio::test]
    async fn executes_and_classifies() {
        let ok: OperationRef<Svc> = OperationFn::arc("hit", |svc: &mut Svc, _cx, _args| {
            Box::pin(async move {
                svc.hits += 1;
                Ok(Value::from(svc.hits))
            })
        });
        let bad: OperationRef<Svc> = OperationFn::arc("bad", |_svc: &mut Svc, _cx, _args| {
            Box::pin(async { Err(OperationError::client("missing id")) })
        });
        let broken: OperationRef<Svc> = OperationFn::arc("broken", |_svc: &mut Svc, _cx, _args| {
            Box::pin(async { Err(OperationError::internal("db gone")) })
        });

        let sh = shared();
        let queue = Arc::new(CallQueue::new());
        let (a, b, c) = (desc(&ok, None), desc(&bad, None), desc(&broken, None));
        let (fa, fb, fc) = (a.future.clone(), b.future.clone(), c.future.clone());
        for d in [a, b, c] {
            assert!(queue.put(d).is_ok());
        }
        queue.close();

        ControlLoop::new(Arc::clone(&sh), queue, Svc::default()).run().await.unwrap();

        assert_eq!(fa.try_outcome(), Some(CallOutcome::Completed(Value::from(1))));
        assert_eq!(
            fb.try_outcome(),
            Some(CallOutcome::Failed(CallError::Client { message: "missing id".into() }))
        );
        assert!(matches!(
            fc.try_outcome(),
            Some(CallOutcome::Failed(CallError::Internal { .. }))
        ));
        let errors = sh.errors.snapshot();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "db gone");
        assert!(sh.exited.is_cancelled());
        assert!(sh.ready.is_set());
    }

    #[tokio::test]
    async fn panic_becomes_internal_error_and_context_is_restored() {
        let boom: OperationRef<Svc> = OperationFn::arc("boom", |svc: &mut Svc, _cx, _args| {
            Box::pin(async move {
                if svc.active_context().is_some() {
                    panic!("kaboom");
                }
                Ok(Value::Null)
            })
        });
        let check: OperationRef<Svc> = OperationFn::arc("check", |svc: &mut Svc, _cx, _args| {
            Box::pin(async move { Ok(Value::from(svc.active_context().is_none())) })
        });

        let sh = shared();
        let queue = Arc::new(CallQueue::new());
        let first = desc(&boom, Some(CallContext::new().with_header("user", "ann")));
        let second = desc(&check, None);
        let (f1, f2) = (first.future.clone(), second.future.clone());
        assert!(queue.put(first).is_ok());
        assert!(queue.put(second).is_ok());
        queue.close();

        ControlLoop::new(Arc::clone(&sh), queue, Svc::default()).run().await.unwrap();

        assert!(matches!(
            f1.try_outcome(),
            Some(CallOutcome::Failed(CallError::Internal { .. }))
        ));
        assert_eq!(f2.try_outcome(), Some(CallOutcome::Completed(Value::from(true))));
        assert_eq!(sh.errors.snapshot()[0].message, "kaboom");
    }

    #[tokio::test]
    async fn expired_and_resolved_calls_are_skipped() {
        let hit: OperationRef<Svc> = OperationFn::arc("hit", |svc: &mut Svc, _cx, _args| {
            Box::pin(async move {
                svc.hits += 1;
                Ok(Value::from(svc.hits))
            })
        });

        let sh = shared();
        let queue = Arc::new(CallQueue::new());
        let past = SystemTime::now() - Duration::from_secs(1);
        let expired = desc(&hit, Some(CallContext::new().with_reply_by(past)));
        let cancelled = desc(&hit, None);
        let live = desc(&hit, None);
        let (fe, fc, fl) = (expired.future.clone(), cancelled.future.clone(), live.future.clone());
        fc.cancel().unwrap();
        for d in [expired, cancelled, live] {
            assert!(queue.put(d).is_ok());
        }
        queue.close();

        ControlLoop::new(sh, queue, Svc::default()).run().await.unwrap();

        assert!(!fe.is_resolved());
        assert_eq!(fc.try_outcome(), Some(CallOutcome::Cancelled));
        assert_eq!(fl.try_outcome(), Some(CallOutcome::Completed(Value::from(1))));
    }

    #[tokio::test]
    async fn interrupt_requested_before_execution_skips_body() {
        let hit: OperationRef<Svc> = OperationFn::arc("hit", |svc: &mut Svc, _cx, _args| {
            Box::pin(async move {
                svc.hits += 1;
                Ok(Value::from(svc.hits))
            })
        });

        let sh = shared();
        let queue = Arc::new(CallQueue::new());
        let aborted = desc(&hit, None);
        let next = desc(&hit, None);
        let (fa, fnext) = (aborted.future.clone(), next.future.clone());
        fa.request_interrupt();
        assert!(queue.put(aborted).is_ok());
        assert!(queue.put(next).is_ok());
        queue.close();

        ControlLoop::new(sh, queue, Svc::default()).run().await.unwrap();

        assert_eq!(fa.try_outcome(), Some(CallOutcome::Interrupted));
        assert_eq!(fnext.try_outcome(), Some(CallOutcome::Completed(Value::from(1))));
    }
}
