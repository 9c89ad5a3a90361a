//! Runtime core: the process and its supervision.
//!
//! The public surface is [`ProcessCore`] (built via [`ProcessBuilder`]) plus the
//! value types it hands out. Internal modules:
//! - `control`: the control loop executing calls one at a time;
//! - `supervisor`: spawns and joins children, turns failures into a kill;
//! - `registry`: attached listeners and their liveness;
//! - `heartbeat`: stall detection over the executing call;
//! - `error_log`: bounded record of internal failures;
//! - `shutdown`: OS termination signals.

mod builder;
mod config;
mod control;
mod error_log;
mod heartbeat;
mod process;
mod registry;
mod shutdown;
mod supervisor;

pub use builder::ProcessBuilder;
pub use config::{HeartbeatConfig, ProcessConfig};
pub use error_log::ErrorRecord;
pub use heartbeat::HeartbeatReport;
pub use process::{CancelOutcome, ProcessCore, ProcessKind, ProcessState, TimeStats};
