//! # Attach-once storage for a listener's routing hook.

use std::sync::OnceLock;

use thiserror::Error;

use crate::calls::{CallArgs, CallContext, CallFuture, CallRouter};
use crate::error::ListenerError;
use crate::operations::OperationRef;

/// A listener was offered a second routing hook.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("listener already attached to a process")]
pub struct AlreadyAttached;

/// Holds the routing hook of a listener; settable once.
///
/// Listener implementations embed one and delegate `attach` to [`RouterSlot::attach`].
pub struct RouterSlot<S> {
    router: OnceLock<CallRouter<S>>,
}

impl<S: 'static> RouterSlot<S> {
    /// Empty slot.
    pub fn new() -> Self {
        Self {
            router: OnceLock::new(),
        }
    }

    /// Stores the router; refuses a second one.
    pub fn attach(&self, router: CallRouter<S>) -> Result<(), AlreadyAttached> {
        self.router.set(router).map_err(|_| AlreadyAttached)
    }

    /// The attached router.
    pub fn get(&self) -> Option<&CallRouter<S>> {
        self.router.get()
    }

    /// True once attached.
    pub fn is_attached(&self) -> bool {
        self.router.get().is_some()
    }

    /// Routes a call through the attached router.
    pub fn route(
        &self,
        operation: OperationRef<S>,
        context: Option<CallContext>,
        args: CallArgs,
    ) -> Result<CallFuture, ListenerError> {
        let router = self.router.get().ok_or(ListenerError::Detached)?;
        Ok(router.route(operation, context, args))
    }
}

impl<S: 'static> Default for RouterSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::calls::queue::CallQueue;
    use crate::events::Bus;
    use crate::operations::OperationFn;

    struct Nothing;

    #[test]
    fn attaches_once() {
        let slot = RouterSlot::<Nothing>::new();
        let router = CallRouter::new("p".into(), Arc::new(CallQueue::new()), Bus::new(4));
        assert!(!slot.is_attached());
        assert_eq!(slot.attach(router.clone()), Ok(()));
        assert_eq!(slot.attach(router), Err(AlreadyAttached));
    }

    #[test]
    fn route_without_router_is_detached() {
        let slot = RouterSlot::<Nothing>::new();
        let op: OperationRef<Nothing> = OperationFn::arc("noop", |_svc: &mut Nothing, _cx, _args| {
            Box::pin(async { Ok(serde_json::Value::Null) })
        });
        assert!(matches!(
            slot.route(op, None, CallArgs::new()),
            Err(ListenerError::Detached)
        ));
    }
}
