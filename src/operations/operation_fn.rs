//! # Function-backed operation (`OperationFn`)
//!
//! [`OperationFn`] wraps a closure `F: Fn(&mut S, CallCx, CallArgs) -> OperationFuture`,
//! producing a fresh future per call. Any state shared between calls belongs in
//! the service, which the closure receives by `&mut`.
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use callvisor::{CallContext, OperationFn, OperationRef, Service};
//!
//! #[derive(Default)]
//! struct Greeter { ctx: Option<CallContext> }
//!
//! impl Service for Greeter {
//!     fn context_slot(&mut self) -> &mut Option<CallContext> { &mut self.ctx }
//! }
//!
//! let hello: OperationRef<Greeter> = OperationFn::arc("hello", |_svc: &mut Greeter, _cx, _args| {
//!     Box::pin(async move { Ok(json!("hello")) })
//! });
//! assert_eq!(hello.name(), "hello");
//! ```

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::calls::CallArgs;
use crate::operations::cx::CallCx;
use crate::operations::operation::{Operation, OperationFuture};

/// Function-backed operation implementation.
pub struct OperationFn<S, F> {
    name: Cow<'static, str>,
    f: F,
    _service: PhantomData<fn(&mut S)>,
}

impl<S, F> OperationFn<S, F>
where
    F: for<'a> Fn(&'a mut S, CallCx, CallArgs) -> OperationFuture<'a> + Send + Sync + 'static,
{
    /// Creates a new function-backed operation.
    ///
    /// Prefer [`OperationFn::arc`] when you immediately need an [`OperationRef`](crate::OperationRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _service: PhantomData,
        }
    }

    /// Creates the operation and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<S, F> Operation<S> for OperationFn<S, F>
where
    S: 'static,
    F: for<'a> Fn(&'a mut S, CallCx, CallArgs) -> OperationFuture<'a> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke<'a>(&'a self, service: &'a mut S, cx: CallCx, args: CallArgs) -> OperationFuture<'a> {
        (self.f)(service, cx, args)
    }
}

impl<S, F> fmt::Debug for OperationFn<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationFn").field("name", &self.name).finish()
    }
}
