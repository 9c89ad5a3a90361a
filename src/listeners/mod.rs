//! # Listeners: message-receiving endpoints attached to a process.
//!
//! - [`Listener`] - capability contract (`attach`, `listen`, `close`, `ready_event`)
//! - [`RouterSlot`] - attach-once storage for the routing hook
//! - [`ReadyEvent`] - one-shot readiness signal
//! - [`LocalListener`] / [`LocalClient`] - in-process transport

mod listener;
mod local;
mod ready;
mod slot;

pub use listener::Listener;
pub use local::{LocalClient, LocalListener};
pub use ready::ReadyEvent;
pub use slot::{AlreadyAttached, RouterSlot};
