#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use callvisor::{
    AlreadyAttached, CallContext, CallRouter, Listener, ListenerError, OperationError, OperationFn,
    OperationRef, ReadyEvent, RouterSlot, Service,
};
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Service that records what the control loop did to it.
#[derive(Default)]
pub struct Recorder {
    pub ctx: Option<CallContext>,
    pub log: Vec<i64>,
    pub side_effects: u32,
}

impl Service for Recorder {
    fn context_slot(&mut self) -> &mut Option<CallContext> {
        &mut self.ctx
    }
}

/// Appends `args[0]` to the log.
pub fn record() -> OperationRef<Recorder> {
    OperationFn::arc("record", |svc: &mut Recorder, _cx, args| {
        Box::pin(async move {
            let n = args
                .get(0)
                .and_then(Value::as_i64)
                .ok_or_else(|| OperationError::client("integer required"))?;
            svc.log.push(n);
            svc.side_effects += 1;
            Ok::<_, OperationError>(Value::from(n))
        })
    })
}

/// Returns the log and the side-effect counter.
pub fn dump() -> OperationRef<Recorder> {
    OperationFn::arc("dump", |svc: &mut Recorder, _cx, _args| {
        Box::pin(async move {
            Ok(serde_json::json!({ "log": svc.log, "side_effects": svc.side_effects }))
        })
    })
}

/// Waits for `gate` before returning.
pub fn gated(gate: Arc<Notify>) -> OperationRef<Recorder> {
    OperationFn::arc("gated", move |_svc: &mut Recorder, _cx, _args| {
        let gate = Arc::clone(&gate);
        Box::pin(async move {
            gate.notified().await;
            Ok(Value::Null)
        })
    })
}

/// Signals `started`, then sleeps `d` without reporting progress, then records a side effect.
pub fn sleeper(started: Arc<Notify>, d: Duration) -> OperationRef<Recorder> {
    OperationFn::arc("sleeper", move |svc: &mut Recorder, _cx, _args| {
        let started = Arc::clone(&started);
        Box::pin(async move {
            started.notify_one();
            tokio::time::sleep(d).await;
            svc.side_effects += 1;
            Ok(Value::Null)
        })
    })
}

/// Sleeps `d` and returns `tag`.
pub fn timed(tag: &'static str, d: Duration) -> OperationRef<Recorder> {
    OperationFn::arc(tag, move |_svc: &mut Recorder, _cx, _args| {
        Box::pin(async move {
            tokio::time::sleep(d).await;
            Ok(Value::from(tag))
        })
    })
}

pub fn dumped_log(v: &Value) -> Vec<i64> {
    v["log"]
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

/// Listener that only counts lifecycle calls; optionally fails once ready.
pub struct ProbeListener {
    name: &'static str,
    slot: RouterSlot<Recorder>,
    ready: ReadyEvent,
    closed: CancellationToken,
    pub closes: AtomicUsize,
    pub finished: AtomicBool,
    fail_with: Option<&'static str>,
    linger: Duration,
    announce: bool,
}

impl ProbeListener {
    pub fn new(name: &'static str) -> Arc<Self> {
        Self::build(name, None, Duration::ZERO)
    }

    pub fn failing(name: &'static str, reason: &'static str) -> Arc<Self> {
        Self::build(name, Some(reason), Duration::ZERO)
    }

    /// Keeps running for `linger` after being closed.
    pub fn lingering(name: &'static str, linger: Duration) -> Arc<Self> {
        Self::build(name, None, linger)
    }

    /// Serves normally but never reports ready.
    pub fn silent(name: &'static str) -> Arc<Self> {
        let mut me = Self::build(name, None, Duration::ZERO);
        if let Some(me) = Arc::get_mut(&mut me) {
            me.announce = false;
        }
        me
    }

    fn build(name: &'static str, fail_with: Option<&'static str>, linger: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            slot: RouterSlot::new(),
            ready: ReadyEvent::new(),
            closed: CancellationToken::new(),
            closes: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
            fail_with,
            linger,
            announce: true,
        })
    }

    pub fn router(&self) -> Option<&CallRouter<Recorder>> {
        self.slot.get()
    }
}

#[async_trait]
impl Listener<Recorder> for ProbeListener {
    fn name(&self) -> &str {
        self.name
    }

    fn attach(&self, router: CallRouter<Recorder>) -> Result<(), AlreadyAttached> {
        self.slot.attach(router)
    }

    async fn listen(&self) -> Result<(), ListenerError> {
        if self.announce {
            self.ready.set();
        }
        if let Some(reason) = self.fail_with {
            return Err(ListenerError::Fail {
                error: reason.to_string(),
            });
        }
        self.closed.cancelled().await;
        tokio::time::sleep(self.linger).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
    }

    fn ready_event(&self) -> ReadyEvent {
        self.ready.clone()
    }
}
