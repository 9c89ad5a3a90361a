//! # Routing hook handed to listeners.
//!
//! A [`CallRouter`] is the only way work enters a process: it wraps the call into a
//! descriptor, enqueues it, and returns the [`CallFuture`] immediately. It never
//! blocks and never executes anything itself.
//!
//! ```text
//! Listener ── route(op, ctx, args) ──► CallQueue ──► control loop
//!     ▲                                                  │
//!     └──────────── CallFuture (resolved) ◄──────────────┘
//! ```

use std::sync::Arc;

use crate::calls::descriptor::{CallArgs, CallContext, CallDescriptor};
use crate::calls::future::{CallFuture, CallOutcome};
use crate::calls::queue::CallQueue;
use crate::error::CallError;
use crate::events::{Bus, Event, EventKind};
use crate::operations::OperationRef;

/// Enqueues calls into one process. Cheap to clone.
pub struct CallRouter<S> {
    process: Arc<str>,
    queue: Arc<CallQueue<S>>,
    origin: Option<Arc<str>>,
    bus: Bus,
}

impl<S> Clone for CallRouter<S> {
    fn clone(&self) -> Self {
        Self {
            process: Arc::clone(&self.process),
            queue: Arc::clone(&self.queue),
            origin: self.origin.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<S: 'static> CallRouter<S> {
    pub(crate) fn new(process: Arc<str>, queue: Arc<CallQueue<S>>, bus: Bus) -> Self {
        Self {
            process,
            queue,
            origin: None,
            bus,
        }
    }

    /// Returns a router that tags every call with `origin` (usually a listener name).
    pub(crate) fn with_origin(&self, origin: impl Into<Arc<str>>) -> Self {
        let mut r = self.clone();
        r.origin = Some(origin.into());
        r
    }

    /// Name of the target process.
    pub fn process(&self) -> &str {
        &self.process
    }

    /// Enqueues a call and returns its future without waiting.
    ///
    /// If the process is already shutting down the future comes back resolved
    /// with [`CallError::Stopped`].
    pub fn route(
        &self,
        operation: OperationRef<S>,
        context: Option<CallContext>,
        args: CallArgs,
    ) -> CallFuture {
        if args.is_empty() {
            tracing::trace!(
                process = %self.process,
                operation = operation.name(),
                "routed call has no arguments, check the call's parameters"
            );
        }

        let future = CallFuture::new();
        let desc = CallDescriptor {
            future: future.clone(),
            operation,
            args,
            context,
            origin: self.origin.clone(),
        };

        if let Err(desc) = self.queue.put(desc) {
            self.bus.publish(
                Event::new(EventKind::CallRefused)
                    .with_process(Arc::clone(&self.process))
                    .with_call(future.id())
                    .with_operation(desc.operation.name()),
            );
            let _ = future.resolve(CallOutcome::Failed(CallError::Stopped {
                process: Arc::clone(&self.process),
            }));
        }
        future
    }
}
