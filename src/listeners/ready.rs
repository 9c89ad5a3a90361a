//! # One-shot readiness signal.
//!
//! [`ReadyEvent`] starts unset, is set once, and stays set. Clones share state.
//! Processes expose one for the control loop; listeners expose one for their
//! receive loop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Settable, awaitable readiness flag.
#[derive(Clone)]
pub struct ReadyEvent {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadyEvent {
    /// Creates an unset event.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Sets the event and wakes all waiters. Setting twice is harmless.
    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// True once set.
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until the event is set.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender is owned by `self`; the channel never closes while we wait.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Waits at most `timeout`. Returns whether the event is set.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

impl Default for ReadyEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReadyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyEvent").field("set", &self.is_set()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waiters_wake_on_set() {
        let ev = ReadyEvent::new();
        let waiter = tokio::spawn({
            let ev = ev.clone();
            async move { ev.wait_timeout(Duration::from_secs(1)).await }
        });
        ev.set();
        assert!(waiter.await.unwrap());
        assert!(ev.is_set());
    }

    #[tokio::test]
    async fn wait_timeout_expires_when_unset() {
        let ev = ReadyEvent::new();
        assert!(!ev.wait_timeout(Duration::from_millis(10)).await);
    }
}
