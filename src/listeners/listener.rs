//! # Listener contract.
//!
//! A [`Listener`] is an externally owned message-receiving endpoint. The process
//! never looks inside it; it only needs four capabilities:
//!
//! ```text
//! attach(router)  ◄── process hands over the routing hook (once)
//! listen()        ──► blocking receive loop, routes each message, runs as a supervised child
//! ready_event()   ──► set once the receive loop accepts messages
//! close()         ◄── process asks the loop to finish (called exactly once)
//! ```
//!
//! Returning `Err` from `listen` (or panicking) is a child failure and terminates
//! the owning process. Returning `Ok(())` is a normal exit.

use async_trait::async_trait;

use crate::calls::CallRouter;
use crate::error::ListenerError;
use crate::listeners::ready::ReadyEvent;
use crate::listeners::slot::AlreadyAttached;

/// Message-receiving endpoint attached to a process serving a service of type `S`.
#[async_trait]
pub trait Listener<S>: Send + Sync + 'static {
    /// Human-readable name (for logs, events and liveness reports).
    fn name(&self) -> &str;

    /// Receives the routing hook. Must refuse a second attachment.
    fn attach(&self, router: CallRouter<S>) -> Result<(), AlreadyAttached>;

    /// Receive loop. Runs until closed or failed.
    async fn listen(&self) -> Result<(), ListenerError>;

    /// Asks the receive loop to finish.
    async fn close(&self);

    /// Readiness of the receive loop.
    fn ready_event(&self) -> ReadyEvent;
}
