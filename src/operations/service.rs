//! # Service instances and scoped context.
//!
//! A [`Service`] is the business object one process serializes calls against.
//! The control loop owns it exclusively once the process starts; no lock guards it.
//!
//! For each call the loop pushes the call's [`CallContext`] via
//! [`Service::push_context`]. The returned [`ContextScope`] restores the prior
//! context when dropped, whether the call succeeded, failed, panicked or was
//! interrupted.

use std::ops::{Deref, DerefMut};

use crate::calls::CallContext;

/// Business object executed by a process.
pub trait Service: Send + 'static {
    /// Storage for the active call context.
    fn context_slot(&mut self) -> &mut Option<CallContext>;

    /// Active call context, if a call is executing.
    fn active_context(&mut self) -> Option<&CallContext> {
        self.context_slot().as_ref()
    }

    /// Installs `context` until the returned scope is dropped.
    fn push_context(&mut self, context: Option<CallContext>) -> ContextScope<'_, Self>
    where
        Self: Sized,
    {
        ContextScope::new(self, context)
    }
}

/// Guard that restores the previous context on drop. Derefs to the service.
pub struct ContextScope<'a, S: Service> {
    service: &'a mut S,
    previous: Option<CallContext>,
}

impl<'a, S: Service> ContextScope<'a, S> {
    fn new(service: &'a mut S, context: Option<CallContext>) -> Self {
        let previous = std::mem::replace(service.context_slot(), context);
        Self { service, previous }
    }
}

impl<S: Service> Deref for ContextScope<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.service
    }
}

impl<S: Service> DerefMut for ContextScope<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.service
    }
}

impl<S: Service> Drop for ContextScope<'_, S> {
    fn drop(&mut self) {
        *self.service.context_slot() = self.previous.take();
    }
}
