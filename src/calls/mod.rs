//! # Calls: futures, descriptors, the call queue and the routing hook.
//!
//! - [`CallFuture`] - write-once, multi-wait result cell
//! - [`CallDescriptor`], [`CallArgs`], [`CallContext`] - what a queued call carries
//! - [`CallRouter`] - enqueue-and-return hook used by listeners
//! - `CallQueue` - internal FIFO shared with the control loop

mod descriptor;
mod future;
pub(crate) mod queue;
mod router;

pub use descriptor::{CallArgs, CallContext, CallDescriptor, REPLY_BY};
pub use future::{CallFuture, CallId, CallOutcome};
pub use router::CallRouter;
