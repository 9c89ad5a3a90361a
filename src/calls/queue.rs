//! # Ordered queue of pending calls.
//!
//! [`CallQueue`] is the only structure shared between calling contexts and the
//! control loop. Producers `put` without blocking; the single consumer `pop`s and
//! suspends while the queue is empty.
//!
//! ## Rules
//! - Strict FIFO; no priorities.
//! - `close` enqueues a stop marker **behind** everything already queued, so
//!   the loop drains existing calls before exiting.
//! - After `close`, `put` is refused and hands the descriptor back.
//! - Cancelling a queued call removes it and resolves its future under the same lock,
//!   so the consumer can never dequeue a call that was reported as cancelled.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::calls::descriptor::CallDescriptor;
use crate::calls::future::{CallFuture, CallId};

/// Item handed to the consumer.
pub(crate) enum QueueItem<S> {
    /// A call to execute.
    Call(CallDescriptor<S>),
    /// Stop marker; the consumer exits.
    Stop,
}

struct QueueState<S> {
    items: VecDeque<QueueItem<S>>,
    closed: bool,
}

/// Concurrency-safe FIFO with a blocking (async) single-consumer `pop`.
pub(crate) struct CallQueue<S> {
    state: Mutex<QueueState<S>>,
    notify: Notify,
}

impl<S> CallQueue<S> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Appends a call. Returns it back if the queue is closed.
    pub(crate) fn put(&self, desc: CallDescriptor<S>) -> Result<(), CallDescriptor<S>> {
        {
            let mut st = self.state.lock();
            if st.closed {
                return Err(desc);
            }
            st.items.push_back(QueueItem::Call(desc));
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Refuses further puts and enqueues the stop marker. Idempotent.
    pub(crate) fn close(&self) {
        {
            let mut st = self.state.lock();
            if st.closed {
                return;
            }
            st.closed = true;
            st.items.push_back(QueueItem::Stop);
        }
        self.notify.notify_one();
    }

    /// Takes the next item, waiting while the queue is empty.
    pub(crate) async fn pop(&self) -> QueueItem<S> {
        loop {
            let next = self.state.lock().items.pop_front();
            if let Some(item) = next {
                return item;
            }
            // `notify_one` stores a permit when nobody waits, so a put racing
            // with this point is not lost.
            self.notify.notified().await;
        }
    }

    /// True if a call with this identity is still queued.
    pub(crate) fn contains(&self, id: CallId) -> bool {
        self.state
            .lock()
            .items
            .iter()
            .any(|item| matches!(item, QueueItem::Call(d) if d.future.id() == id))
    }

    /// Removes a queued call and resolves it with the cancellation sentinel.
    ///
    /// Returns `false` if the call is not (or no longer) queued.
    pub(crate) fn cancel(&self, future: &CallFuture) -> bool {
        let mut st = self.state.lock();
        let pos = st
            .items
            .iter()
            .position(|item| matches!(item, QueueItem::Call(d) if d.future.id() == future.id()));
        match pos {
            Some(pos) => {
                st.items.remove(pos);
                // Only the queue and the control loop resolve futures, and the
                // loop never saw this one.
                let _ = future.cancel();
                true
            }
            None => false,
        }
    }

    /// Removes every queued call (the stop marker is discarded).
    pub(crate) fn drain(&self) -> Vec<CallDescriptor<S>> {
        let mut st = self.state.lock();
        st.closed = true;
        st.items
            .drain(..)
            .filter_map(|item| match item {
                QueueItem::Call(d) => Some(d),
                QueueItem::Stop => None,
            })
            .collect()
    }

    /// Number of queued calls.
    pub(crate) fn len(&self) -> usize {
        self.state
            .lock()
            .items
            .iter()
            .filter(|item| matches!(item, QueueItem::Call(_)))
            .count()
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::calls::descriptor::CallArgs;
    use crate::operations::{OperationFn, OperationRef};

    struct Nothing;

    fn noop() -> OperationRef<Nothing> {
        OperationFn::arc("noop", |_svc: &mut Nothing, _cx, _args| {
            Box::pin(async { Ok(serde_json::Value::Null) })
        })
    }

    fn desc(op: &OperationRef<Nothing>) -> CallDescriptor<Nothing> {
        CallDescriptor {
            future: CallFuture::new(),
            operation: Arc::clone(op),
            args: CallArgs::new(),
            context: None,
            origin: None,
        }
    }

    fn call_id(item: QueueItem<Nothing>) -> Option<CallId> {
        match item {
            QueueItem::Call(d) => Some(d.future.id()),
            QueueItem::Stop => None,
        }
    }

    #[tokio::test]
    async fn pops_in_put_order_then_stop() {
        let q = CallQueue::new();
        let op = noop();
        let a = desc(&op);
        let b = desc(&op);
        let (ida, idb) = (a.future.id(), b.future.id());
        assert!(q.put(a).is_ok());
        assert!(q.put(b).is_ok());
        q.close();

        assert_eq!(call_id(q.pop().await), Some(ida));
        assert_eq!(call_id(q.pop().await), Some(idb));
        assert_eq!(call_id(q.pop().await), None);
    }

    #[tokio::test]
    async fn put_after_close_is_refused() {
        let q = CallQueue::new();
        q.close();
        assert!(q.put(desc(&noop())).is_err());
        assert!(q.is_closed());
    }

    #[tokio::test]
    async fn pop_wakes_on_put() {
        let q = Arc::new(CallQueue::new());
        let consumer = tokio::spawn({
            let q = Arc::clone(&q);
            async move { call_id(q.pop().await) }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let d = desc(&noop());
        let id = d.future.id();
        assert!(q.put(d).is_ok());
        assert_eq!(consumer.await.unwrap(), Some(id));
    }

    #[test]
    fn cancel_removes_and_resolves() {
        let q = CallQueue::new();
        let d = desc(&noop());
        let fut = d.future.clone();
        assert!(q.put(d).is_ok());
        assert!(q.contains(fut.id()));

        assert!(q.cancel(&fut));
        assert!(!q.contains(fut.id()));
        assert!(fut.try_outcome().is_some_and(|o| o.is_cancelled()));
        assert!(!q.cancel(&fut));
        assert_eq!(q.len(), 0);
    }
}
