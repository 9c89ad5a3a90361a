//! # Listener registry.
//!
//! Tracks the listeners attached to one process, whether they are still
//! buffered for startup or already running as supervised children.
//!
//! ## Rules
//! - A listener instance is registered at most once (identity by pointer).
//! - Buffered listeners move to the active set when `start_listeners` spawns them.
//! - `close_all` calls `close()` on every listener exactly once, buffered ones included;
//!   repeated calls are no-ops.
//!
//! ```text
//! add_endpoint ──► pending ──(start_listeners)──► active { listener, liveness }
//!                                                    │
//!                         heartbeat ◄── all_alive() ─┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::core::supervisor::Liveness;
use crate::listeners::{Listener, ReadyEvent};

pub(crate) struct ListenerEntry<S> {
    pub(crate) listener: Arc<dyn Listener<S>>,
    closed: AtomicBool,
}

impl<S: 'static> ListenerEntry<S> {
    pub(crate) fn new(listener: Arc<dyn Listener<S>>) -> Arc<Self> {
        Arc::new(Self {
            listener,
            closed: AtomicBool::new(false),
        })
    }

    fn is(&self, other: &Arc<dyn Listener<S>>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.listener), Arc::as_ptr(other))
    }
}

struct Active<S> {
    entry: Arc<ListenerEntry<S>>,
    live: Liveness,
}

struct Inner<S> {
    pending: Vec<Arc<ListenerEntry<S>>>,
    active: Vec<Active<S>>,
}

pub(crate) struct ListenerRegistry<S> {
    inner: Mutex<Inner<S>>,
}

impl<S: 'static> ListenerRegistry<S> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: Vec::new(),
                active: Vec::new(),
            }),
        }
    }

    /// True if this listener instance is already registered.
    pub(crate) fn contains(&self, listener: &Arc<dyn Listener<S>>) -> bool {
        let inner = self.inner.lock();
        inner.pending.iter().any(|e| e.is(listener))
            || inner.active.iter().any(|a| a.entry.is(listener))
    }

    /// Buffers a listener until startup.
    pub(crate) fn buffer(&self, entry: Arc<ListenerEntry<S>>) {
        self.inner.lock().pending.push(entry);
    }

    /// Takes every buffered listener.
    pub(crate) fn take_pending(&self) -> Vec<Arc<ListenerEntry<S>>> {
        std::mem::take(&mut self.inner.lock().pending)
    }

    /// Records a spawned listener and its worker liveness.
    pub(crate) fn activate(&self, entry: Arc<ListenerEntry<S>>, live: Liveness) {
        self.inner.lock().active.push(Active { entry, live });
    }

    /// Number of registered listeners (buffered and active).
    pub(crate) fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.pending.len() + inner.active.len()
    }

    /// True if every active listener's worker is alive.
    pub(crate) fn all_alive(&self) -> bool {
        self.inner.lock().active.iter().all(|a| a.live.is_alive())
    }

    /// Readiness signals of the active listeners.
    pub(crate) fn ready_events(&self) -> Vec<(Arc<str>, ReadyEvent)> {
        self.inner
            .lock()
            .active
            .iter()
            .map(|a| (Arc::from(a.entry.listener.name()), a.entry.listener.ready_event()))
            .collect()
    }

    /// Marks every listener closed and returns the ones not closed before.
    pub(crate) fn take_unclosed(&self) -> Vec<Arc<dyn Listener<S>>> {
        let inner = self.inner.lock();
        inner
            .pending
            .iter()
            .chain(inner.active.iter().map(|a| &a.entry))
            .filter(|e| !e.closed.swap(true, Ordering::AcqRel))
            .map(|e| Arc::clone(&e.listener))
            .collect()
    }

    /// Closes every listener that was not closed yet.
    pub(crate) async fn close_all(&self) {
        for listener in self.take_unclosed() {
            tracing::debug!(listener = listener.name(), "closing listener");
            listener.close().await;
        }
    }
}
