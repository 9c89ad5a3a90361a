//! # Example: echo_service
//!
//! A counter service served through an in-process listener, with every runtime
//! event logged through `tracing`.
//!
//! Shows how to:
//! - Implement [`Service`] and define operations with [`OperationFn`]
//! - Attach a [`LocalListener`] and call through its [`LocalClient`](callvisor::LocalClient)
//! - Observe events with the built-in [`LogWriter`]
//! - Stop on Ctrl-C (or after the demo traffic) with [`ProcessCore::run_until`]
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► ProcessCore::builder("echo", Counter).with_listeners([local]).build()
//!   ├─► spawn run_until(done)
//!   │     ├─► start(): control loop + heartbeat
//!   │     └─► start_listeners(): local listener ready
//!   │
//!   └─► client
//!         ├─► echo("hi")      ─► Completed("hi")
//!         ├─► add(2), add(40) ─► Completed(42)
//!         ├─► add("x")        ─► Failed(Client)
//!         └─► done            ─► stop(): close listener, drain, cleanup
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example echo_service --features logging
//! ```

use std::sync::Arc;

use callvisor::{
    CallArgs, CallContext, Listener, LocalListener, LogWriter, OperationError, OperationFn,
    OperationRef, ProcessCore, Service, Subscribe,
};
use serde_json::Value;
use tokio::sync::oneshot;

#[derive(Default)]
struct Counter {
    ctx: Option<CallContext>,
    total: i64,
}

impl Service for Counter {
    fn context_slot(&mut self) -> &mut Option<CallContext> {
        &mut self.ctx
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,callvisor=debug".into()),
        )
        .init();

    let (listener, client) = LocalListener::<Counter>::new("local", 32);
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    let core = ProcessCore::builder("echo", Counter::default())
        .with_listeners(vec![listener as Arc<dyn Listener<Counter>>])
        .with_subscribers(subs)
        .with_cleanup(|core: &ProcessCore<Counter>| {
            println!("[cleanup] served for {:?}", core.time_stats());
        })
        .build()?;

    let echo: OperationRef<Counter> = OperationFn::arc("echo", |_svc: &mut Counter, cx, args| {
        Box::pin(async move {
            let user = cx.context().and_then(|c| c.get("user")).unwrap_or("anonymous").to_owned();
            let text = args.get(0).cloned().unwrap_or(Value::Null);
            println!("[echo] {user} says {text}");
            Ok(text)
        })
    });
    let add: OperationRef<Counter> = OperationFn::arc("add", |svc: &mut Counter, _cx, args| {
        Box::pin(async move {
            let n = args
                .get(0)
                .and_then(Value::as_i64)
                .ok_or_else(|| OperationError::client("add expects an integer"))?;
            svc.total += n;
            Ok::<_, OperationError>(Value::from(svc.total))
        })
    });

    let (done_tx, done_rx) = oneshot::channel::<()>();
    let runner = {
        let core = Arc::clone(&core);
        tokio::spawn(async move {
            core.run_until(async {
                tokio::select! {
                    _ = done_rx => {}
                    _ = tokio::signal::ctrl_c() => println!("\n[main] ctrl-c"),
                }
            })
            .await
        })
    };

    core.ready_event().wait().await;
    let ctx = CallContext::new().with_header("user", "ann");
    println!("echo  -> {:?}", client.call(Arc::clone(&echo), Some(ctx), CallArgs::new().arg("hi")).await);
    println!("add 2 -> {:?}", client.call(Arc::clone(&add), None, CallArgs::new().arg(2)).await);
    println!("add 40 -> {:?}", client.call(Arc::clone(&add), None, CallArgs::new().arg(40)).await);
    println!("add x -> {:?}", client.call(add, None, CallArgs::new().arg("x")).await);
    println!("heartbeat -> {:?}", core.heartbeat());

    let _ = done_tx.send(());
    runner.await??;
    println!("\n=== echo_service finished ===");
    Ok(())
}
