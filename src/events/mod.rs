//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by a process core, its control
//! loop, heartbeat and child supervisor.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ProcessCore`, control loop, `CallRouter`, heartbeat loop,
//!   child supervisor, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the process subscriber listener (fans out to `SubscriberSet`)
//!   and any receiver obtained from `ProcessCore::subscribe`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
