//! Error types used by the callvisor runtime, operations and callers.
//!
//! This module defines the error enums that flow through a process core:
//!
//! - [`OperationError`] - raised by operation bodies, tagged with an explicit [`ErrorKind`].
//! - [`CallError`] - what a caller observes in a resolved [`CallFuture`](crate::CallFuture).
//! - [`ProcessError`] - failures of the process runtime itself (lifecycle, children, shutdown).
//! - [`ListenerError`] - failures of a listener's receive loop.
//! - [`FutureError`] - misuse of a write-once [`CallFuture`](crate::CallFuture).
//!
//! All types provide `as_label` for logs/metrics.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Classification attached to an [`OperationError`] by the operation layer.
///
/// The control loop never inspects error types structurally; it only reads this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or invalid input supplied by the caller. Delivered to the caller as-is.
    Client,
    /// Anything unexpected. Logged, recorded, and replaced by a generic failure for the caller.
    Internal,
}

/// # Error returned by an operation body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} error: {message}")]
pub struct OperationError {
    /// Client or internal.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl OperationError {
    /// Creates a client error (bad input).
    pub fn client(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Client,
            message: message.into(),
        }
    }

    /// Creates an internal error (unexpected failure).
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            message: message.into(),
        }
    }

    /// True if this error was caused by the caller.
    pub fn is_client(&self) -> bool {
        self.kind == ErrorKind::Client
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self.kind {
            ErrorKind::Client => "operation_client_error",
            ErrorKind::Internal => "operation_internal_error",
        }
    }
}

/// # Failure delivered to the caller through a resolved future.
///
/// Internal detail never leaks through this type: internal failures carry only the
/// process and operation names.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The caller supplied invalid input; message comes straight from the operation.
    #[error("bad request: {message}")]
    Client {
        /// Message produced by the operation.
        message: String,
    },

    /// The operation failed unexpectedly; details were recorded in the process error log.
    #[error("internal error in process '{process}' while executing '{operation}'")]
    Internal {
        /// Process name.
        process: Arc<str>,
        /// Operation name.
        operation: Arc<str>,
    },

    /// The call was routed after the process started shutting down.
    #[error("process '{process}' is stopping; call rejected")]
    Stopped {
        /// Process name.
        process: Arc<str>,
    },

    /// The process was terminated by a child failure before the call could complete.
    #[error("process '{process}' terminated before the call completed")]
    Terminated {
        /// Process name.
        process: Arc<str>,
    },
}

impl CallError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use callvisor::CallError;
    ///
    /// let err = CallError::Client { message: "missing arg".into() };
    /// assert_eq!(err.as_label(), "call_client_error");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            CallError::Client { .. } => "call_client_error",
            CallError::Internal { .. } => "call_internal_error",
            CallError::Stopped { .. } => "call_process_stopped",
            CallError::Terminated { .. } => "call_process_terminated",
        }
    }
}

/// Which kind of supervised worker a child is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    /// The control loop executing calls.
    Control,
    /// A listener's receive loop.
    Listener,
    /// The heartbeat supervising loop.
    Heartbeat,
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChildKind::Control => "control",
            ChildKind::Listener => "listener",
            ChildKind::Heartbeat => "heartbeat",
        };
        f.write_str(s)
    }
}

/// Cause recorded when a supervised child dies unexpectedly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildFailure {
    /// Child name (listener name, `control`, `heartbeat`).
    pub child: Arc<str>,
    /// Child kind.
    pub kind: ChildKind,
    /// Error or panic message.
    pub reason: String,
}

impl fmt::Display for ChildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} child '{}' failed: {}", self.kind, self.child, self.reason)
    }
}

/// # Errors produced by the process runtime.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    /// `start()` was called more than once.
    #[error("process already started")]
    AlreadyStarted,

    /// The process is draining or stopped and no longer accepts work.
    #[error("process is not running")]
    NotRunning,

    /// The listener is already attached to a process.
    #[error("listener '{listener}' is already attached to a process")]
    ListenerAlreadyAttached {
        /// Listener name.
        listener: String,
    },

    /// The process kind has no messaging attachment.
    #[error("process '{process}' does not accept listeners")]
    NoMessagingAttachment {
        /// Process name.
        process: Arc<str>,
    },

    /// A supervised child died unexpectedly and took the process down.
    #[error("{0}")]
    ChildFailed(ChildFailure),

    /// Shutdown grace period was exceeded; remaining children were aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Children that did not stop in time.
        stuck: Vec<String>,
    },
}

impl ProcessError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use callvisor::ProcessError;
    /// use std::time::Duration;
    ///
    /// let err = ProcessError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "process_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::AlreadyStarted => "process_already_started",
            ProcessError::NotRunning => "process_not_running",
            ProcessError::ListenerAlreadyAttached { .. } => "process_listener_already_attached",
            ProcessError::NoMessagingAttachment { .. } => "process_no_messaging_attachment",
            ProcessError::ChildFailed(_) => "process_child_failed",
            ProcessError::GraceExceeded { .. } => "process_grace_exceeded",
        }
    }
}

/// # Errors produced by a listener's receive loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ListenerError {
    /// The receive loop failed.
    #[error("listener failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The listener was asked to listen without a routing hook attached.
    #[error("listener is not attached to a process")]
    Detached,
}

impl ListenerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ListenerError::Fail { .. } => "listener_failed",
            ListenerError::Detached => "listener_detached",
        }
    }
}

/// Error returned when resolving a future that already holds an outcome.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureError {
    /// A second resolution was attempted; the first outcome is kept.
    #[error("future already resolved")]
    AlreadyResolved,
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
