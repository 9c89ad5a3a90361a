//! # ProcessCore: serialized executor of one service instance.
//!
//! A [`ProcessCore`] owns everything one running service instance needs: the call
//! queue, the control loop that drains it, the attached listeners, the heartbeat
//! monitor and the child supervisor that watches all of them.
//!
//! ## Architecture
//! ```text
//! listeners ── route(op, ctx, args) ──► CallQueue ──► ControlLoop (owns S)
//!     ▲                                                    │
//!     └──────────────── CallFuture resolved ◄──────────────┘
//!
//! ChildSupervisor
//!   ├─ control      (ControlLoop::run)
//!   ├─ <listener>   (Listener::listen), one per attached listener
//!   └─ heartbeat    (interval ─► heartbeat() ─► HeartbeatPolicy)
//!
//! any child Err/panic ─► kill ─► control loop exits, listeners closed,
//!                               queued calls resolved Terminated
//! ```
//!
//! ## Lifecycle
//! ```text
//! NotStarted ──start()──► Running ──stop()──► Draining ──► Stopped
//!      └──────────────────stop()──────────────────┘
//! ```
//!
//! ## Stop sequence
//! 1. every listener's `close()` (exactly once)
//! 2. stop sentinel enqueued behind already queued calls
//! 3. children joined within `stop_grace` (stragglers aborted)
//! 4. cleanup hook (exactly once), then `Stopped`
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use callvisor::{
//!     CallArgs, CallContext, CallOutcome, OperationFn, OperationRef, ProcessCore, Service,
//! };
//! use serde_json::Value;
//!
//! #[derive(Default)]
//! struct Counter {
//!     ctx: Option<CallContext>,
//!     total: i64,
//! }
//!
//! impl Service for Counter {
//!     fn context_slot(&mut self) -> &mut Option<CallContext> {
//!         &mut self.ctx
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let add: OperationRef<Counter> = OperationFn::arc("add", |svc: &mut Counter, _cx, args| {
//!         Box::pin(async move {
//!             svc.total += args.get(0).and_then(Value::as_i64).unwrap_or(0);
//!             Ok(Value::from(svc.total))
//!         })
//!     });
//!
//!     let core = ProcessCore::builder("counter", Counter::default()).build()?;
//!     core.start()?;
//!
//!     let fut = core.route_call(add, None, CallArgs::new().arg(5));
//!     assert_eq!(fut.wait().await, CallOutcome::Completed(Value::from(5)));
//!
//!     core.stop().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::calls::queue::CallQueue;
use crate::calls::{CallArgs, CallContext, CallFuture, CallId, CallOutcome, CallRouter};
use crate::core::config::ProcessConfig;
use crate::core::control::{ControlLoop, ControlShared, CurrentCall};
use crate::core::error_log::{ErrorLog, ErrorRecord};
use crate::core::heartbeat::{HeartbeatMonitor, HeartbeatReport};
use crate::core::registry::{ListenerEntry, ListenerRegistry};
use crate::core::shutdown;
use crate::core::supervisor::{ChildSupervisor, Liveness};
use crate::error::{CallError, ChildFailure, ChildKind, ProcessError, panic_message};
use crate::events::{Bus, Event, EventKind};
use crate::listeners::{Listener, ReadyEvent};
use crate::operations::{OperationRef, Service};

/// Lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Built, not started. Listeners are buffered.
    NotStarted,
    /// Control loop running.
    Running,
    /// `stop()` in progress.
    Draining,
    /// Terminal.
    Stopped,
}

/// Flavour of a process.
///
/// Only `Standalone` processes own a messaging attachment and accept listeners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessKind {
    /// Full process with listeners (default).
    #[default]
    Standalone,
    /// Calls routed programmatically only.
    Simple,
    /// Like `Simple`, but runs only the calls routed before `start()` and then
    /// stops itself.
    Immediate,
}

impl ProcessKind {
    /// True if listeners may be attached.
    #[inline]
    pub fn accepts_listeners(self) -> bool {
        matches!(self, ProcessKind::Standalone)
    }
}

/// What `cancel_or_abort_call` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The call was still queued; it is resolved `Cancelled` and will never run.
    Cancelled,
    /// The call was dequeued; a best-effort interrupt was sent.
    AbortRequested,
    /// The future already held an outcome; nothing was done.
    AlreadyResolved,
}

/// Execution time counters, in milliseconds since start.
///
/// `total_ms == idle_ms + busy_ms` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeStats {
    /// Time since `start()`.
    pub total_ms: u64,
    /// Time spent waiting for calls.
    pub idle_ms: u64,
    /// Time spent executing calls.
    pub busy_ms: u64,
}

impl From<TimeStats> for (u64, u64, u64) {
    fn from(t: TimeStats) -> Self {
        (t.total_ms, t.idle_ms, t.busy_ms)
    }
}

pub(crate) type CleanupHook<S> = Box<dyn FnOnce(&ProcessCore<S>) + Send>;

/// Serialized executor of one service instance. See the module docs.
pub struct ProcessCore<S: Service> {
    name: Arc<str>,
    kind: ProcessKind,
    cfg: ProcessConfig,
    bus: Bus,
    shared: Arc<ControlShared>,
    queue: Arc<CallQueue<S>>,
    router: CallRouter<S>,
    service: Mutex<Option<S>>,
    registry: ListenerRegistry<S>,
    state: Mutex<ProcessState>,
    started_at: OnceLock<Instant>,
    monitor: Mutex<HeartbeatMonitor>,
    supervisor: Arc<ChildSupervisor>,
    control: Mutex<Option<Liveness>>,
    cleanup: Mutex<Option<CleanupHook<S>>>,
    stop_result: Mutex<Option<Result<(), ProcessError>>>,
    stopped: CancellationToken,
}

impl<S: Service> ProcessCore<S> {
    pub(crate) fn new(
        name: Arc<str>,
        kind: ProcessKind,
        cfg: ProcessConfig,
        service: S,
        bus: Bus,
        cleanup: Option<CleanupHook<S>>,
        stopped: CancellationToken,
    ) -> Self {
        let supervisor = ChildSupervisor::new(Arc::clone(&name), bus.clone());
        let shared = Arc::new(ControlShared {
            process: Arc::clone(&name),
            bus: bus.clone(),
            ready: ReadyEvent::new(),
            busy_nanos: Default::default(),
            current: Mutex::new(None),
            errors: ErrorLog::new(cfg.error_log_capacity_clamped()),
            kill: supervisor.kill_token().clone(),
            exited: CancellationToken::new(),
        });
        let queue = Arc::new(CallQueue::new());
        let router = CallRouter::new(Arc::clone(&name), Arc::clone(&queue), bus.clone());

        Self {
            monitor: Mutex::new(HeartbeatMonitor::new(&cfg.heartbeat)),
            name,
            kind,
            cfg,
            bus,
            shared,
            queue,
            router,
            service: Mutex::new(Some(service)),
            registry: ListenerRegistry::new(),
            state: Mutex::new(ProcessState::NotStarted),
            started_at: OnceLock::new(),
            supervisor,
            control: Mutex::new(None),
            cleanup: Mutex::new(cleanup),
            stop_result: Mutex::new(None),
            stopped,
        }
    }

    /// Process name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process flavour.
    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    /// Configuration the process was built with.
    pub fn config(&self) -> &ProcessConfig {
        &self.cfg
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    /// Spawns the control loop and the heartbeat loop.
    ///
    /// Buffered listeners are started separately by [`start_listeners`](Self::start_listeners).
    pub fn start(self: &Arc<Self>) -> Result<(), ProcessError> {
        let service = {
            let mut state = self.state.lock();
            match *state {
                ProcessState::NotStarted => {}
                ProcessState::Running => return Err(ProcessError::AlreadyStarted),
                ProcessState::Draining | ProcessState::Stopped => {
                    return Err(ProcessError::NotRunning);
                }
            }
            let Some(service) = self.service.lock().take() else {
                return Err(ProcessError::AlreadyStarted);
            };
            *state = ProcessState::Running;
            service
        };
        let _ = self.started_at.set(Instant::now());

        let control = ControlLoop::new(Arc::clone(&self.shared), Arc::clone(&self.queue), service);
        let live = self
            .supervisor
            .spawn("control", ChildKind::Control, control.run());
        *self.control.lock() = Some(live);

        self.spawn_heartbeat();
        self.spawn_reaper();
        if self.kind == ProcessKind::Immediate {
            self.queue.close();
            self.spawn_auto_stop();
        }

        tracing::info!(process = %self.name, kind = ?self.kind, "process started");
        self.bus.publish(self.event(EventKind::ProcessStarted));
        Ok(())
    }

    /// Spawns every buffered listener and waits (bounded by `ready_timeout`)
    /// until all active listeners report ready.
    ///
    /// A readiness timeout is logged, not returned.
    pub async fn start_listeners(self: &Arc<Self>) -> Result<(), ProcessError> {
        {
            let state = self.state.lock();
            if *state != ProcessState::Running {
                return Err(ProcessError::NotRunning);
            }
            for entry in self.registry.take_pending() {
                self.spawn_listener(entry);
            }
        }

        let events = self.registry.ready_events();
        if events.is_empty() {
            return Ok(());
        }
        let all = futures::future::join_all(events.iter().map(|(_, ev)| ev.wait()));
        let timeout = self.cfg.ready_timeout;
        if tokio::time::timeout(timeout, all).await.is_ok() {
            tracing::debug!(process = %self.name, count = events.len(), "listeners ready");
            self.bus.publish(self.event(EventKind::ListenersReady));
        } else {
            let waiting: Vec<&str> = events
                .iter()
                .filter(|(_, ev)| !ev.is_set())
                .map(|(name, _)| &**name)
                .collect();
            tracing::warn!(process = %self.name, ?timeout, ?waiting, "listeners not ready in time, continuing");
            self.bus.publish(
                self.event(EventKind::ListenersReadyTimeout)
                    .with_reason(waiting.join(","))
                    .with_elapsed(timeout),
            );
        }
        Ok(())
    }

    /// Attaches a listener.
    ///
    /// Before start the listener is buffered for [`start_listeners`](Self::start_listeners);
    /// on a running process its receive loop is spawned right away.
    pub fn add_endpoint(self: &Arc<Self>, listener: Arc<dyn Listener<S>>) -> Result<(), ProcessError> {
        if !self.kind.accepts_listeners() {
            return Err(ProcessError::NoMessagingAttachment {
                process: Arc::clone(&self.name),
            });
        }

        let state = self.state.lock();
        if matches!(*state, ProcessState::Draining | ProcessState::Stopped) {
            return Err(ProcessError::NotRunning);
        }
        let already = || ProcessError::ListenerAlreadyAttached {
            listener: listener.name().to_string(),
        };
        if self.registry.contains(&listener) {
            return Err(already());
        }
        listener
            .attach(self.router.with_origin(listener.name()))
            .map_err(|_| already())?;

        let entry = ListenerEntry::new(Arc::clone(&listener));
        if *state == ProcessState::Running {
            self.spawn_listener(entry);
        } else {
            tracing::debug!(process = %self.name, listener = listener.name(), "listener buffered until start");
            self.registry.buffer(entry);
        }
        Ok(())
    }

    /// Enqueues a call and returns its future immediately.
    pub fn route_call(
        &self,
        operation: OperationRef<S>,
        context: Option<CallContext>,
        args: CallArgs,
    ) -> CallFuture {
        self.router.route(operation, context, args)
    }

    /// Routing hook for programmatic callers.
    pub fn router(&self) -> CallRouter<S> {
        self.router.clone()
    }

    /// True if the call is still sitting in the queue.
    pub fn has_pending_call(&self, future: &CallFuture) -> bool {
        self.queue.contains(future.id())
    }

    /// Cancels a queued call, or sends a best-effort interrupt to an executing one.
    pub fn cancel_or_abort_call(&self, future: &CallFuture) -> CancelOutcome {
        if self.queue.cancel(future) {
            tracing::info!(process = %self.name, call = %future.id(), "queued call cancelled");
            self.bus
                .publish(self.event(EventKind::CallCancelled).with_call(future.id()));
            return CancelOutcome::Cancelled;
        }
        if future.is_resolved() {
            return CancelOutcome::AlreadyResolved;
        }
        tracing::info!(process = %self.name, call = %future.id(), "abort requested");
        future.request_interrupt();
        CancelOutcome::AbortRequested
    }

    /// Runs the three liveness checks.
    ///
    /// Each invocation is one stall-detection sample.
    pub fn heartbeat(&self) -> HeartbeatReport {
        let listeners_ok = self.registry.all_alive();
        let control_ok = self.control.lock().as_ref().is_some_and(Liveness::is_alive);
        let sample = self.shared.current.lock().as_ref().map(CurrentCall::sample);
        let no_stall = {
            let mut monitor = self.monitor.lock();
            let ok = monitor.sample(sample, Instant::now());
            if !ok {
                if let Some(st) = monitor.state() {
                    tracing::debug!(
                        process = %self.name,
                        call = %st.call,
                        repeats = st.repeats,
                        idle = ?st.changed_at.elapsed(),
                        "executing call shows no progress"
                    );
                }
            }
            ok
        };
        HeartbeatReport {
            listeners_ok,
            control_ok,
            no_stall,
        }
    }

    /// Total, idle and busy time since start.
    pub fn time_stats(&self) -> TimeStats {
        let Some(started) = self.started_at.get() else {
            return TimeStats::default();
        };
        let total_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let busy_ms = self.shared.busy_ms().min(total_ms);
        TimeStats {
            total_ms,
            idle_ms: total_ms - busy_ms,
            busy_ms,
        }
    }

    /// Set once the control loop accepts calls.
    pub fn ready_event(&self) -> ReadyEvent {
        self.shared.ready.clone()
    }

    /// Identity of the executing call, if any.
    pub fn current_call(&self) -> Option<CallId> {
        self.shared.current.lock().as_ref().map(|c| c.future.id())
    }

    /// Number of attached listeners, buffered ones included.
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of calls waiting in the queue.
    pub fn pending_calls(&self) -> usize {
        self.queue.len()
    }

    /// Snapshot of the internal error log, oldest first.
    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.shared.errors.snapshot()
    }

    /// The child failure that killed the process, if any.
    pub fn failure(&self) -> Option<ChildFailure> {
        self.supervisor.failure()
    }

    /// Completes once the control loop has exited (stop or kill).
    pub async fn terminated(&self) {
        self.shared.exited.cancelled().await;
    }

    /// Subscribes to the process event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Starts the process and its listeners, waits for `shutdown`, a fatal
    /// child failure or the control loop finishing, then stops.
    pub async fn run_until<F>(self: &Arc<Self>, shutdown: F) -> Result<(), ProcessError>
    where
        F: Future<Output = ()>,
    {
        self.start()?;
        self.start_listeners().await?;

        let kill = self.supervisor.kill_token().clone();
        tokio::select! {
            _ = shutdown => tracing::info!(process = %self.name, "shutdown requested"),
            _ = kill.cancelled() => {}
            _ = self.terminated() => {}
        }
        self.stop().await
    }

    /// [`run_until`](Self::run_until) an OS termination signal.
    pub async fn run_until_signal(self: &Arc<Self>) -> Result<(), ProcessError> {
        let name = Arc::clone(&self.name);
        self.run_until(async move {
            match shutdown::termination_signal().await {
                Ok(signal) => tracing::info!(process = %name, signal, "termination signal received"),
                Err(e) => {
                    tracing::error!(process = %name, error = %e, "cannot install signal handlers");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
    }

    /// Stops the process. Idempotent; concurrent callers wait for the first one.
    ///
    /// Returns the child failure that killed the process, or `GraceExceeded` if
    /// children had to be aborted. The cleanup hook runs in every case.
    ///
    /// The stop sequence runs on its own task: dropping this future (say, under a
    /// timeout) only stops waiting, and a later `stop()` picks up the same result.
    pub async fn stop(self: &Arc<Self>) -> Result<(), ProcessError> {
        let first = {
            let mut state = self.state.lock();
            match *state {
                ProcessState::NotStarted | ProcessState::Running => {
                    *state = ProcessState::Draining;
                    true
                }
                ProcessState::Draining | ProcessState::Stopped => false,
            }
        };
        if first {
            tracing::info!(process = %self.name, "stopping process");
            self.bus.publish(self.event(EventKind::StopRequested));
            let core = Arc::clone(self);
            tokio::spawn(async move { core.shutdown().await });
        }

        self.stopped.cancelled().await;
        self.stop_result.lock().clone().unwrap_or(Ok(()))
    }

    async fn shutdown(&self) {
        self.registry.close_all().await;
        self.queue.close();
        let joined = self.supervisor.join_all(self.cfg.stop_grace).await;
        self.shared.exited.cancel();
        self.resolve_stranded();
        self.run_cleanup();

        *self.state.lock() = ProcessState::Stopped;
        match &joined {
            Ok(()) => tracing::info!(process = %self.name, "process stopped"),
            Err(e) => tracing::warn!(process = %self.name, error = %e, "process stopped with error"),
        }
        *self.stop_result.lock() = Some(joined);
        self.stopped.cancel();
    }

    fn spawn_listener(self: &Arc<Self>, entry: Arc<ListenerEntry<S>>) {
        let listener = Arc::clone(&entry.listener);
        let name = listener.name().to_string();
        let live = self.supervisor.spawn(&name, ChildKind::Listener, async move {
            listener.listen().await.map_err(|e| e.to_string())
        });
        self.registry.activate(entry, live);

        tracing::debug!(process = %self.name, listener = %name, "listener attached");
        self.bus
            .publish(self.event(EventKind::ListenerAttached).with_listener(name));
    }

    fn spawn_heartbeat(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.cfg.heartbeat.interval_clamped();
        let policy = self.cfg.heartbeat.policy;
        let kill = self.supervisor.kill_token().clone();
        let exited = self.shared.exited.clone();

        self.supervisor.spawn("heartbeat", ChildKind::Heartbeat, async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = kill.cancelled() => break,
                    _ = exited.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(core) = weak.upgrade() else { break };
                let report = core.heartbeat();
                if report.all_ok() {
                    continue;
                }

                let failed = report.failed_checks().join(",");
                let call = core.current_call().map(|c| c.to_string());
                tracing::warn!(process = %core.name, %failed, ?call, "heartbeat failed");
                core.bus.publish(core.event(EventKind::HeartbeatFailed).with_reason(failed.as_str()));
                if policy.is_fatal() {
                    return Err(format!("heartbeat failed: {failed}"));
                }
            }
            Ok(())
        });
    }

    /// Closes the queue and the listeners once a child failure killed the process.
    fn spawn_reaper(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let kill = self.supervisor.kill_token().clone();
        let exited = self.shared.exited.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = kill.cancelled() => {}
                _ = exited.cancelled() => return,
            }
            if let Some(core) = weak.upgrade() {
                tracing::warn!(process = %core.name, "process killed, closing listeners");
                core.queue.close();
                core.registry.close_all().await;
            }
        });
    }

    /// Stops an immediate process once its control loop ran out of work.
    fn spawn_auto_stop(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let exited = self.shared.exited.clone();

        tokio::spawn(async move {
            exited.cancelled().await;
            let Some(core) = weak.upgrade() else { return };
            tracing::debug!(process = %core.name, "immediate process finished its work");
            if let Err(e) = core.stop().await {
                tracing::warn!(process = %core.name, error = %e, "immediate process stopped with error");
            }
        });
    }

    /// Resolves calls the control loop never got to (never started, or aborted).
    fn resolve_stranded(&self) {
        for desc in self.queue.drain() {
            let _ = desc.future.resolve(CallOutcome::Failed(CallError::Stopped {
                process: Arc::clone(&self.name),
            }));
        }
        let current = self.shared.current.lock().take();
        if let Some(current) = current {
            let _ = current.future.resolve(CallOutcome::Failed(CallError::Terminated {
                process: Arc::clone(&self.name),
            }));
        }
    }

    fn run_cleanup(&self) {
        let hook = self.cleanup.lock().take();
        let Some(hook) = hook else { return };
        match std::panic::catch_unwind(AssertUnwindSafe(|| hook(self))) {
            Ok(()) => {
                tracing::debug!(process = %self.name, "cleanup completed");
                self.bus.publish(self.event(EventKind::CleanupCompleted));
            }
            Err(panic) => {
                tracing::error!(process = %self.name, panic = %panic_message(panic.as_ref()), "cleanup hook panicked");
            }
        }
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_process(Arc::clone(&self.name))
    }
}

impl<S: Service> Drop for ProcessCore<S> {
    /// Winds down a process whose last handle went away without `stop()`.
    ///
    /// Queued calls still run, listeners are closed in the background and the
    /// subscriber forwarder is released. The cleanup hook does not run.
    fn drop(&mut self) {
        let state = *self.state.get_mut();
        if state == ProcessState::Stopped {
            return;
        }
        tracing::warn!(process = %self.name, ?state, "process dropped without stop");

        self.queue.close();
        if state == ProcessState::NotStarted {
            self.resolve_stranded();
        }
        let listeners = self.registry.take_unclosed();
        if !listeners.is_empty() {
            if let Ok(rt) = tokio::runtime::Handle::try_current() {
                rt.spawn(async move {
                    for listener in listeners {
                        listener.close().await;
                    }
                });
            }
        }
        self.stopped.cancel();
    }
}
