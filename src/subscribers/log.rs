//! # Logging subscriber.
//!
//! [`LogWriter`] renders every event through `tracing`, at a level that matches
//! its severity. Install a `tracing` subscriber (e.g. `tracing_subscriber::fmt`)
//! to see the output.
//!
//! ```text
//! INFO  process=billing event=started
//! WARN  process=billing call=call#7 op=charge reason="ledger unavailable" event=call-failed
//! ERROR process=billing child=rpc reason="socket closed" event=child-failed
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber forwarding events to `tracing`.
///
/// Enabled via the `logging` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    fn label(kind: EventKind) -> &'static str {
        match kind {
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::ProcessStarted => "started",
            EventKind::ProcessReady => "ready",
            EventKind::StopRequested => "stop-requested",
            EventKind::AllStoppedWithin => "all-stopped-within-grace",
            EventKind::GraceExceeded => "grace-exceeded",
            EventKind::CleanupCompleted => "cleanup-completed",
            EventKind::ListenerAttached => "listener-attached",
            EventKind::ListenersReady => "listeners-ready",
            EventKind::ListenersReadyTimeout => "listeners-ready-timeout",
            EventKind::CallExpired => "call-expired",
            EventKind::CallSkipped => "call-skipped",
            EventKind::CallCancelled => "call-cancelled",
            EventKind::CallInterrupted => "call-interrupted",
            EventKind::CallRejected => "call-rejected",
            EventKind::CallFailed => "call-failed",
            EventKind::CallRefused => "call-refused",
            EventKind::HeartbeatFailed => "heartbeat-failed",
            EventKind::ChildFailed => "child-failed",
        }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let event = Self::label(e.kind);
        let process = e.process.as_deref().unwrap_or("-");
        let call = e.call.map(|c| c.to_string());
        let call = call.as_deref().unwrap_or("-");
        let op = e.operation.as_deref().unwrap_or("-");
        let who = e.listener.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ChildFailed | EventKind::GraceExceeded | EventKind::SubscriberPanicked => {
                tracing::error!(process, child = who, reason, event);
            }
            EventKind::CallFailed | EventKind::HeartbeatFailed | EventKind::SubscriberOverflow => {
                tracing::warn!(process, call, op, reason, event);
            }
            EventKind::ListenersReadyTimeout => {
                tracing::warn!(process, timeout_ms = e.elapsed_ms, event);
            }
            EventKind::CallExpired
            | EventKind::CallSkipped
            | EventKind::CallCancelled
            | EventKind::CallInterrupted
            | EventKind::CallRejected
            | EventKind::CallRefused => {
                tracing::debug!(process, call, op, reason, event);
            }
            _ => {
                tracing::info!(process, listener = who, event);
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
