//! # Example: abort_call
//!
//! Cancelling queued calls and interrupting the one that is executing.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► route slow("report")  ─► starts executing, reports progress
//!   ├─► route slow("backup")  ─► queued
//!   ├─► cancel_or_abort(backup) ─► Cancelled (never runs)
//!   ├─► cancel_or_abort(report) ─► AbortRequested ─► Interrupted
//!   └─► route slow("quick")   ─► Completed, loop kept serving
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example abort_call
//! ```

use std::sync::Arc;
use std::time::Duration;

use callvisor::{CallArgs, CallContext, OperationFn, OperationRef, ProcessCore, Service};
use serde_json::Value;

#[derive(Default)]
struct Reports {
    ctx: Option<CallContext>,
    written: Vec<String>,
}

impl Service for Reports {
    fn context_slot(&mut self) -> &mut Option<CallContext> {
        &mut self.ctx
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    println!("=== abort_call example ===\n");

    let core = ProcessCore::builder("reports", Reports::default()).build()?;
    core.start()?;

    // Writes `pages` pages, 100ms each, reporting progress per page.
    let slow: OperationRef<Reports> = OperationFn::arc("slow", |svc: &mut Reports, cx, args| {
        Box::pin(async move {
            let name = args.get(0).and_then(Value::as_str).unwrap_or("unnamed").to_owned();
            let pages = args.get(1).and_then(Value::as_u64).unwrap_or(1);
            for page in 0..pages {
                cx.progress(format!("{name}: page {page}"));
                println!("[slow] {name}: page {page}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            svc.written.push(name.clone());
            Ok(Value::from(svc.written.len()))
        })
    });

    let report = core.route_call(Arc::clone(&slow), None, CallArgs::new().arg("report").arg(50));
    let backup = core.route_call(Arc::clone(&slow), None, CallArgs::new().arg("backup").arg(50));
    tokio::time::sleep(Duration::from_millis(250)).await;

    println!("\n[main] current call: {:?}", core.current_call());
    println!("[main] cancel backup -> {:?}", core.cancel_or_abort_call(&backup));
    println!("[main] abort report  -> {:?}", core.cancel_or_abort_call(&report));
    println!("[main] report outcome: {:?}", report.wait().await);
    println!("[main] backup outcome: {:?}", backup.wait().await);

    let quick = core.route_call(slow, None, CallArgs::new().arg("quick").arg(2));
    println!("[main] quick outcome:  {:?}", quick.wait().await);
    println!("[main] time: {:?}", core.time_stats());

    core.stop().await?;
    println!("\n=== example completed successfully ===");
    Ok(())
}
