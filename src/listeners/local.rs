//! # In-process listener.
//!
//! [`LocalListener`] receives requests from a [`LocalClient`] over a bounded
//! channel, routes each one into its process and turns the resolved future back
//! into a reply. It is the smallest complete listener and doubles as a test and
//! demo transport.
//!
//! ```text
//! LocalClient::call ──► mpsc ──► LocalListener::listen ──► CallRouter::route
//!        ▲                                                     │
//!        └──────── oneshot reply ◄── reply task ◄── CallFuture ┘
//! ```
//!
//! Calls carrying a `reply-by` deadline get no reply once it passes; the client
//! observes `None`.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::calls::{CallArgs, CallContext, CallFuture, CallOutcome, CallRouter};
use crate::error::ListenerError;
use crate::listeners::listener::Listener;
use crate::listeners::ready::ReadyEvent;
use crate::listeners::slot::{AlreadyAttached, RouterSlot};
use crate::operations::OperationRef;

struct Request<S> {
    operation: OperationRef<S>,
    context: Option<CallContext>,
    args: CallArgs,
    reply: oneshot::Sender<CallOutcome>,
}

/// Sending half used by in-process callers.
pub struct LocalClient<S> {
    tx: mpsc::Sender<Request<S>>,
}

impl<S> Clone for LocalClient<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S: 'static> LocalClient<S> {
    /// Sends a call and waits for its reply.
    ///
    /// Returns `None` if the listener is closed or the call expired unanswered.
    pub async fn call(
        &self,
        operation: OperationRef<S>,
        context: Option<CallContext>,
        args: CallArgs,
    ) -> Option<CallOutcome> {
        let (reply, rx) = oneshot::channel();
        let req = Request {
            operation,
            context,
            args,
            reply,
        };
        self.tx.send(req).await.ok()?;
        rx.await.ok()
    }
}

/// Channel-fed listener for in-process callers.
pub struct LocalListener<S> {
    name: Arc<str>,
    slot: RouterSlot<S>,
    inbox: Mutex<Option<mpsc::Receiver<Request<S>>>>,
    closed: CancellationToken,
    ready: ReadyEvent,
}

impl<S: 'static> LocalListener<S> {
    /// Creates a listener and the client feeding it.
    pub fn new(name: impl Into<Arc<str>>, capacity: usize) -> (Arc<Self>, LocalClient<S>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let me = Arc::new(Self {
            name: name.into(),
            slot: RouterSlot::new(),
            inbox: Mutex::new(Some(rx)),
            closed: CancellationToken::new(),
            ready: ReadyEvent::new(),
        });
        (me, LocalClient { tx })
    }

    /// True once `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Waits for the outcome, giving up at the caller's deadline.
async fn await_reply(future: CallFuture, deadline: Option<SystemTime>) -> Option<CallOutcome> {
    match deadline {
        Some(deadline) => {
            let left = deadline
                .duration_since(SystemTime::now())
                .unwrap_or_default();
            future.wait_timeout(left).await
        }
        None => Some(future.wait().await),
    }
}

#[async_trait]
impl<S: 'static> Listener<S> for LocalListener<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&self, router: CallRouter<S>) -> Result<(), AlreadyAttached> {
        self.slot.attach(router)
    }

    async fn listen(&self) -> Result<(), ListenerError> {
        let router = self.slot.get().ok_or(ListenerError::Detached)?.clone();
        let mut rx = self.inbox.lock().take().ok_or_else(|| ListenerError::Fail {
            error: format!("listener '{}' is already listening", self.name),
        })?;
        self.ready.set();

        loop {
            tokio::select! {
                _ = self.closed.cancelled() => break,
                req = rx.recv() => {
                    let Some(req) = req else { break };
                    let deadline = req.context.as_ref().and_then(CallContext::reply_by);
                    let future = router.route(req.operation, req.context, req.args);
                    tokio::spawn(async move {
                        if let Some(outcome) = await_reply(future, deadline).await {
                            let _ = req.reply.send(outcome);
                        }
                    });
                }
            }
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.cancel();
    }

    fn ready_event(&self) -> ReadyEvent {
        self.ready.clone()
    }
}
