mod common;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use callvisor::{
    CallArgs, CallContext, CallError, CallOutcome, Event, EventKind, Listener, LocalListener,
    OperationFn, OperationRef, ProcessCore, Subscribe,
};
use common::{Recorder, dump, record};
use parking_lot::Mutex;
use serde_json::Value;

#[derive(Default)]
struct Collector {
    seen: Mutex<Vec<(EventKind, Option<Arc<str>>)>>,
}

#[async_trait]
impl Subscribe for Collector {
    async fn on_event(&self, ev: &Event) {
        self.seen.lock().push((ev.kind, ev.operation.clone()));
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

impl Collector {
    fn kinds(&self) -> Vec<EventKind> {
        self.seen.lock().iter().map(|(k, _)| *k).collect()
    }
}

#[tokio::test]
async fn local_listener_round_trip() {
    let (listener, client) = LocalListener::<Recorder>::new("local", 8);
    let core = ProcessCore::builder("echo", Recorder::default())
        .with_listeners(vec![Arc::clone(&listener) as Arc<dyn Listener<Recorder>>])
        .build()
        .unwrap();
    core.start().unwrap();
    core.start_listeners().await.unwrap();
    assert!(core.heartbeat().all_ok());

    let reply = client.call(record(), None, CallArgs::new().arg(7)).await;
    assert_eq!(reply, Some(CallOutcome::Completed(Value::from(7))));

    let rejected = client.call(record(), None, CallArgs::new()).await;
    assert!(matches!(
        rejected,
        Some(CallOutcome::Failed(CallError::Client { .. }))
    ));

    core.stop().await.unwrap();
    assert!(listener.is_closed());
    assert_eq!(client.call(record(), None, CallArgs::new().arg(1)).await, None);
}

#[tokio::test]
async fn local_listener_drops_reply_after_deadline() {
    let (listener, client) = LocalListener::<Recorder>::new("local", 8);
    let core = ProcessCore::builder("late", Recorder::default())
        .with_listeners(vec![listener as Arc<dyn Listener<Recorder>>])
        .build()
        .unwrap();
    let slow: OperationRef<Recorder> = OperationFn::arc("slow", |_svc: &mut Recorder, _cx, _args| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Value::Null)
        })
    });
    core.start().unwrap();
    core.start_listeners().await.unwrap();

    let ctx = CallContext::new().with_reply_by(SystemTime::now() + Duration::from_millis(50));
    assert_eq!(client.call(slow, Some(ctx), CallArgs::new()).await, None);
    core.stop().await.unwrap();
}

#[tokio::test]
async fn listener_origin_lands_in_error_log() {
    let (listener, client) = LocalListener::<Recorder>::new("local", 8);
    let core = ProcessCore::builder("origin", Recorder::default())
        .with_listeners(vec![listener as Arc<dyn Listener<Recorder>>])
        .build()
        .unwrap();
    let broken: OperationRef<Recorder> = OperationFn::arc("broken", |_svc: &mut Recorder, _cx, _args| {
        Box::pin(async { Err(callvisor::OperationError::internal("boom")) })
    });
    core.start().unwrap();
    core.start_listeners().await.unwrap();

    client.call(broken, None, CallArgs::new()).await;
    let direct: OperationRef<Recorder> = OperationFn::arc("direct", |_svc: &mut Recorder, _cx, _args| {
        Box::pin(async { Err(callvisor::OperationError::internal("bang")) })
    });
    core.route_call(direct, None, CallArgs::new()).wait().await;

    let errors = core.errors();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].origin.as_deref(), Some("local"));
    assert_eq!(&*errors[0].operation, "broken");
    assert_eq!(errors[1].origin, None);
    core.stop().await.unwrap();
}

#[tokio::test]
async fn subscribers_observe_the_lifecycle() {
    let collector = Arc::new(Collector::default());
    let core = ProcessCore::builder("observed", Recorder::default())
        .with_subscribers(vec![Arc::clone(&collector) as Arc<dyn Subscribe>])
        .build()
        .unwrap();
    core.start().unwrap();
    core.ready_event().wait().await;

    core.route_call(record(), None, CallArgs::new().arg("bad")).wait().await;
    core.route_call(dump(), None, CallArgs::new()).wait().await;
    core.stop().await.unwrap();

    // The forwarder flushes what it saw before the subscriber set shut down.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !collector.kinds().contains(&EventKind::AllStoppedWithin) {
        assert!(tokio::time::Instant::now() < deadline, "stop events never arrived");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let kinds = collector.kinds();
    for expected in [
        EventKind::ProcessStarted,
        EventKind::ProcessReady,
        EventKind::CallRejected,
        EventKind::StopRequested,
        EventKind::AllStoppedWithin,
    ] {
        assert!(kinds.contains(&expected), "missing {expected:?} in {kinds:?}");
    }
    let started = kinds.iter().position(|k| *k == EventKind::ProcessStarted);
    let stopping = kinds.iter().position(|k| *k == EventKind::StopRequested);
    assert!(started < stopping);

    let rejected_op = collector
        .seen
        .lock()
        .iter()
        .find(|(k, _)| *k == EventKind::CallRejected)
        .and_then(|(_, op)| op.clone());
    assert_eq!(rejected_op.as_deref(), Some("record"));
}

#[tokio::test]
async fn bus_receivers_see_refused_calls() {
    let core = ProcessCore::builder("refusing", Recorder::default())
        .build()
        .unwrap();
    let mut rx = core.subscribe();
    core.stop().await.unwrap();

    let late = core.route_call(record(), None, CallArgs::new().arg(1));
    assert!(matches!(
        late.try_outcome(),
        Some(CallOutcome::Failed(CallError::Stopped { .. }))
    ));

    let mut refused = false;
    while let Ok(ev) = rx.try_recv() {
        if ev.kind == EventKind::CallRefused {
            refused = true;
            assert_eq!(ev.call, Some(late.id()));
        }
    }
    assert!(refused);
}
