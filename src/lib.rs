//! # callvisor
//!
//! **Callvisor** serializes concurrent calls against one service instance into a
//! single ordered stream of execution, while supervising the listeners that feed
//! it, detecting stuck calls with periodic heartbeats and cancelling queued or
//! executing calls on request.
//!
//! Each [`ProcessCore`] owns one service value. Mutual exclusion over the service
//! is structural: a single control loop owns it and executes calls one at a time,
//! in the order they were routed. No lock ever guards service state.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Listener A  │   │  Listener B  │   │ direct call  │
//!     │ (transport)  │   │ (transport)  │   │ route_call() │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ CallRouter::route│                  │
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ProcessCore                                                      │
//! │  - CallQueue (FIFO, stop sentinel)                                │
//! │  - ControlLoop (owns the service, one call at a time)             │
//! │  - ListenerRegistry (buffered / active listeners, liveness)       │
//! │  - HeartbeatMonitor (stall detection over progress snapshots)     │
//! │  - ChildSupervisor (control, listeners, heartbeat)                │
//! └──────┬───────────────────────────────────────────────────┬────────┘
//!        │ resolves                                          │ publishes
//!        ▼                                                   ▼
//!   CallFuture (write-once)                        Bus (broadcast events)
//!   Completed / Cancelled /                                  │
//!   Interrupted / Failed                          SubscriberSet (per-sub queues)
//!                                                 ┌──────────┼──────────┐
//!                                                 ▼          ▼          ▼
//!                                             LogWriter   metrics    custom
//! ```
//!
//! ### Call lifecycle
//! ```text
//! route_call ──► queued ──► dequeued ──┬─► expired (reply-by passed) ─► never resolved
//!      │            │                  ├─► already resolved          ─► skipped
//!      │            │                  └─► executing ─┬─► Completed(value)
//!      │            │                                 ├─► Failed(Client)    (bad input)
//!      │            │                                 ├─► Failed(Internal)  (logged, error log)
//!      │            │                                 └─► Interrupted       (abort requested)
//!      │            └─ cancel_or_abort_call ─► Cancelled (body never runs)
//!      └─ after stop() ─► Failed(Stopped)
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Process**       | Serialized executor, lifecycle, heartbeat, time stats.        | [`ProcessCore`], [`ProcessBuilder`]         |
//! | **Calls**         | Write-once futures, arguments, context headers.               | [`CallFuture`], [`CallArgs`], [`CallContext`] |
//! | **Operations**    | Operation bodies with interrupt and progress hooks.           | [`Operation`], [`OperationFn`], [`CallCx`]  |
//! | **Listeners**     | Message-receiving endpoints supervised by the process.        | [`Listener`], [`RouterSlot`], [`LocalListener`] |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom).          | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors for callers, operations and the runtime.         | [`CallError`], [`OperationError`], [`ProcessError`] |
//! | **Configuration** | Explicit per-process settings.                                | [`ProcessConfig`], [`HeartbeatConfig`]      |
//!
//! ## Optional features
//! - `logging`: exports the [`LogWriter`] subscriber, rendering events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use callvisor::{
//!     CallArgs, CallContext, CallOutcome, LocalListener, Listener, OperationError, OperationFn,
//!     OperationRef, ProcessCore, Service,
//! };
//! use serde_json::Value;
//!
//! #[derive(Default)]
//! struct Greeter {
//!     ctx: Option<CallContext>,
//! }
//!
//! impl Service for Greeter {
//!     fn context_slot(&mut self) -> &mut Option<CallContext> {
//!         &mut self.ctx
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (listener, client) = LocalListener::<Greeter>::new("local", 16);
//!     let core = ProcessCore::builder("greeter", Greeter::default())
//!         .with_listeners(vec![listener as Arc<dyn Listener<Greeter>>])
//!         .build()?;
//!     core.start()?;
//!     core.start_listeners().await?;
//!
//!     let hello: OperationRef<Greeter> = OperationFn::arc("hello", |_svc: &mut Greeter, _cx, args| {
//!         Box::pin(async move {
//!             let name = args
//!                 .get(0)
//!                 .and_then(Value::as_str)
//!                 .ok_or_else(|| OperationError::client("name required"))?;
//!             Ok::<_, OperationError>(Value::from(format!("hello, {name}")))
//!         })
//!     });
//!
//!     let reply = client.call(hello, None, CallArgs::new().arg("ann")).await;
//!     assert_eq!(reply, Some(CallOutcome::Completed(Value::from("hello, ann"))));
//!
//!     core.stop().await?;
//!     Ok(())
//! }
//! ```
mod calls;
mod core;
mod error;
mod events;
mod listeners;
mod operations;
mod policies;
mod subscribers;

// ---- Public re-exports ----

pub use calls::{CallArgs, CallContext, CallDescriptor, CallFuture, CallId, CallOutcome, CallRouter, REPLY_BY};
pub use self::core::{
    CancelOutcome, ErrorRecord, HeartbeatConfig, HeartbeatReport, ProcessBuilder, ProcessConfig,
    ProcessCore, ProcessKind, ProcessState, TimeStats,
};
pub use error::{
    CallError, ChildFailure, ChildKind, ErrorKind, FutureError, ListenerError, OperationError,
    ProcessError,
};
pub use events::{Bus, Event, EventKind};
pub use listeners::{AlreadyAttached, Listener, LocalClient, LocalListener, ReadyEvent, RouterSlot};
pub use operations::{
    CallCx, ContextScope, Operation, OperationFn, OperationFuture, OperationRef, Progress,
    ProgressSnapshot, Service,
};
pub use policies::HeartbeatPolicy;
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose the built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
