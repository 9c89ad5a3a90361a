//! # Services and the operations executed against them.
//!
//! - [`Service`] - business object owned by the control loop, with scoped context
//! - [`Operation`] - named unit of service logic
//! - [`OperationFn`] - closure-backed operation
//! - [`OperationRef`] - shared handle (`Arc<dyn Operation<S>>`)
//! - [`CallCx`] - per-call interrupt signal and progress reporting

mod cx;
mod operation;
mod operation_fn;
mod service;

pub use cx::{CallCx, Progress, ProgressSnapshot};
pub use operation::{Operation, OperationFuture, OperationRef};
pub use operation_fn::OperationFn;
pub use service::{ContextScope, Service};
