//! # Write-once result cell handed back to callers.
//!
//! [`CallFuture`] connects a caller to the eventual outcome of one routed call.
//! It is created by the router, stored in the queued descriptor, and resolved
//! exactly once: by the control loop, or by cancellation while still queued.
//!
//! ## Rules
//! - A future is resolved **at most once**; a second [`CallFuture::resolve`]
//!   returns [`FutureError::AlreadyResolved`] and keeps the first outcome.
//! - Any number of clones may [`wait`](CallFuture::wait) concurrently.
//! - Identity is the [`CallId`]; clones compare equal.
//!
//! Each future also owns the interrupt token for its own execution, so an abort
//! request can never hit a different call.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{CallError, FutureError};

/// Global sequence counter for call identities.
static CALL_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity of a routed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    fn next() -> Self {
        Self(CALL_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

/// Final state of a routed call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The operation returned a value.
    Completed(Value),
    /// Cancelled while still queued; the operation body never ran.
    Cancelled,
    /// Aborted while executing; whoever requested the abort owns the response.
    Interrupted,
    /// The call failed; see [`CallError`].
    Failed(CallError),
}

impl CallOutcome {
    /// True for the cancellation sentinel.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CallOutcome::Cancelled)
    }

    /// Returns the value of a completed call.
    pub fn value(&self) -> Option<&Value> {
        match self {
            CallOutcome::Completed(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the error of a failed call.
    pub fn error(&self) -> Option<&CallError> {
        match self {
            CallOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

struct Inner {
    id: CallId,
    slot: watch::Sender<Option<CallOutcome>>,
    interrupt: CancellationToken,
}

/// Handle to the eventual outcome of one call. Cheap to clone.
#[derive(Clone)]
pub struct CallFuture {
    inner: Arc<Inner>,
}

impl CallFuture {
    /// Creates a new unresolved future with a fresh [`CallId`].
    pub fn new() -> Self {
        let (slot, _rx) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                id: CallId::next(),
                slot,
                interrupt: CancellationToken::new(),
            }),
        }
    }

    /// Identity of this call.
    pub fn id(&self) -> CallId {
        self.inner.id
    }

    /// True once an outcome has been stored.
    pub fn is_resolved(&self) -> bool {
        self.inner.slot.borrow().is_some()
    }

    /// Returns the outcome without waiting.
    pub fn try_outcome(&self) -> Option<CallOutcome> {
        self.inner.slot.borrow().clone()
    }

    /// Stores the outcome and wakes every waiter.
    pub fn resolve(&self, outcome: CallOutcome) -> Result<(), FutureError> {
        let stored = self.inner.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
        if stored {
            Ok(())
        } else {
            Err(FutureError::AlreadyResolved)
        }
    }

    /// Resolves with the cancellation sentinel.
    pub fn cancel(&self) -> Result<(), FutureError> {
        self.resolve(CallOutcome::Cancelled)
    }

    /// Waits until the future is resolved.
    pub async fn wait(&self) -> CallOutcome {
        let mut rx = self.inner.slot.subscribe();
        if let Ok(slot) = rx.wait_for(Option::is_some).await {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
        }
        // The sender lives as long as `self`, so the channel cannot close here.
        std::future::pending().await
    }

    /// Waits at most `timeout`; `None` if still unresolved.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<CallOutcome> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }

    /// Requests a best-effort interrupt of this call's execution.
    pub(crate) fn request_interrupt(&self) {
        self.inner.interrupt.cancel();
    }

    /// Token the control loop watches while this call executes.
    pub(crate) fn interrupt_token(&self) -> &CancellationToken {
        &self.inner.interrupt
    }
}

impl Default for CallFuture {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CallFuture {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for CallFuture {}

impl fmt::Debug for CallFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFuture")
            .field("id", &self.inner.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_unique_and_clones_share_identity() {
        let a = CallFuture::new();
        let b = CallFuture::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn second_resolution_is_rejected() {
        let f = CallFuture::new();
        assert!(!f.is_resolved());
        f.resolve(CallOutcome::Completed(json!(1))).unwrap();
        assert_eq!(f.cancel(), Err(FutureError::AlreadyResolved));
        assert_eq!(f.try_outcome(), Some(CallOutcome::Completed(json!(1))));
    }

    #[tokio::test]
    async fn all_waiters_observe_the_outcome() {
        let f = CallFuture::new();
        let w1 = tokio::spawn({
            let f = f.clone();
            async move { f.wait().await }
        });
        let w2 = tokio::spawn({
            let f = f.clone();
            async move { f.wait().await }
        });
        tokio::task::yield_now().await;
        f.cancel().unwrap();

        assert!(w1.await.unwrap().is_cancelled());
        assert!(w2.await.unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn wait_timeout_returns_none_when_unresolved() {
        let f = CallFuture::new();
        assert!(f.wait_timeout(Duration::from_millis(10)).await.is_none());
    }
}
