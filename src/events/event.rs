//! # Runtime events emitted by a process core.
//!
//! The [`EventKind`] enum classifies events across four categories:
//! - **Lifecycle events**: process start, readiness, stop and cleanup
//! - **Listener events**: attach and readiness
//! - **Call events**: calls that did not complete normally (expired, cancelled, interrupted, failed)
//! - **Supervision events**: heartbeat failures and child failures
//!
//! The [`Event`] struct carries the metadata: process name, call identity,
//! operation and listener names, a reason, and an elapsed time.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use callvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::CallFailed)
//!     .with_process("billing")
//!     .with_operation("charge")
//!     .with_reason("ledger unavailable");
//!
//! assert_eq!(ev.kind, EventKind::CallFailed);
//! assert_eq!(ev.process.as_deref(), Some("billing"));
//! assert_eq!(ev.reason.as_deref(), Some("ledger unavailable"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::calls::CallId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `listener` (subscriber name), `reason`.
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `listener` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Process lifecycle ===
    /// Process started; control loop and heartbeat spawned.
    ProcessStarted,

    /// Control loop is running and accepting calls.
    ProcessReady,

    /// `stop()` was requested.
    StopRequested,

    /// All children joined within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; stuck children were aborted.
    ///
    /// Sets: `reason` (stuck children).
    GraceExceeded,

    /// Cleanup hook ran.
    CleanupCompleted,

    // === Listener events ===
    /// Listener attached and its receive loop spawned.
    ///
    /// Sets: `listener`.
    ListenerAttached,

    /// All started listeners reported ready within the timeout.
    ListenersReady,

    /// Listener readiness wait timed out (startup continues).
    ///
    /// Sets: `elapsed_ms` (timeout).
    ListenersReadyTimeout,

    // === Call events ===
    /// Call skipped because its `reply-by` deadline passed before dequeue.
    ///
    /// Sets: `call`, `operation`.
    CallExpired,

    /// Call skipped because its future was already resolved.
    ///
    /// Sets: `call`, `operation`.
    CallSkipped,

    /// Queued call cancelled; the operation never ran.
    ///
    /// Sets: `call`.
    CallCancelled,

    /// Executing call aborted by an interrupt request.
    ///
    /// Sets: `call`, `operation`, `elapsed_ms`.
    CallInterrupted,

    /// Operation rejected the input (client error).
    ///
    /// Sets: `call`, `operation`, `reason`.
    CallRejected,

    /// Operation failed unexpectedly (internal error, recorded in the error log).
    ///
    /// Sets: `call`, `operation`, `reason`, `elapsed_ms`.
    CallFailed,

    /// Call routed after shutdown began; resolved with a stopped error.
    ///
    /// Sets: `call`, `operation`.
    CallRefused,

    // === Supervision events ===
    /// Heartbeat reported a problem.
    ///
    /// Sets: `reason` (which checks failed and the last progress label).
    HeartbeatFailed,

    /// A supervised child died unexpectedly; the process is being terminated.
    ///
    /// Sets: `listener` (child name), `reason`.
    ChildFailed,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the process.
    pub process: Option<Arc<str>>,
    /// Call identity, if applicable.
    pub call: Option<CallId>,
    /// Operation name, if applicable.
    pub operation: Option<Arc<str>>,
    /// Listener, subscriber or child name, if applicable.
    pub listener: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Elapsed or configured time in milliseconds (compact).
    pub elapsed_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            process: None,
            call: None,
            operation: None,
            listener: None,
            reason: None,
            elapsed_ms: None,
        }
    }

    /// Attaches a process name.
    #[inline]
    pub fn with_process(mut self, process: impl Into<Arc<str>>) -> Self {
        self.process = Some(process.into());
        self
    }

    /// Attaches a call identity.
    #[inline]
    pub fn with_call(mut self, call: CallId) -> Self {
        self.call = Some(call);
        self
    }

    /// Attaches an operation name.
    #[inline]
    pub fn with_operation(mut self, operation: impl Into<Arc<str>>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Attaches a listener (or subscriber/child) name.
    #[inline]
    pub fn with_listener(mut self, listener: impl Into<Arc<str>>) -> Self {
        self.listener = Some(listener.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.elapsed_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_listener(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_listener(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}
