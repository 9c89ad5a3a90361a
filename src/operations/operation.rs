//! # Operation abstraction.
//!
//! An [`Operation`] is a named piece of service logic executed by the control
//! loop against exclusive `&mut` access to the service instance. The common handle
//! type is [`OperationRef`], an `Arc<dyn Operation<S>>` suitable for lookup tables
//! shared by listeners.
//!
//! Operations receive a [`CallCx`] and should check it at safe points so that a
//! best-effort abort can take effect; the control loop will also drop the
//! operation future at its next suspension point once an abort is requested.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::calls::CallArgs;
use crate::error::OperationError;
use crate::operations::cx::CallCx;

/// Future returned by [`Operation::invoke`], borrowing the service for `'a`.
pub type OperationFuture<'a> = BoxFuture<'a, Result<Value, OperationError>>;

/// Shared handle to an operation.
pub type OperationRef<S> = Arc<dyn Operation<S>>;

/// # Executable operation against a service of type `S`.
///
/// # Example
/// ```
/// use serde_json::{Value, json};
/// use callvisor::{CallArgs, CallContext, CallCx, Operation, OperationError, OperationFuture, Service};
///
/// struct Counter { n: i64, ctx: Option<CallContext> }
///
/// impl Service for Counter {
///     fn context_slot(&mut self) -> &mut Option<CallContext> { &mut self.ctx }
/// }
///
/// struct Add;
///
/// impl Operation<Counter> for Add {
///     fn name(&self) -> &str { "add" }
///
///     fn invoke<'a>(&'a self, svc: &'a mut Counter, _cx: CallCx, args: CallArgs) -> OperationFuture<'a> {
///         Box::pin(async move {
///             let by = args.get(0).and_then(Value::as_i64)
///                 .ok_or_else(|| OperationError::client("expected an integer"))?;
///             svc.n += by;
///             Ok::<_, OperationError>(json!(svc.n))
///         })
///     }
/// }
/// ```
pub trait Operation<S>: Send + Sync + 'static {
    /// Stable, human-readable operation name.
    fn name(&self) -> &str;

    /// Creates the future executing this operation once.
    fn invoke<'a>(&'a self, service: &'a mut S, cx: CallCx, args: CallArgs) -> OperationFuture<'a>;
}
