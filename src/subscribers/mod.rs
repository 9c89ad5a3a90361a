//! # Event subscribers.
//!
//! ```text
//! control loop / router / supervisor ── publish(Event) ──► Bus
//!                                                           │
//!                                          process subscriber listener
//!                                                           │
//!                                                    SubscriberSet::emit
//!                                               ┌───────────┼───────────┐
//!                                               ▼           ▼           ▼
//!                                           LogWriter    Metrics      Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
