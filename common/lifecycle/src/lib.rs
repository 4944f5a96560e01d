//! Process lifecycle plumbing shared by services: OS signal trapping, the advisory
//! shutdown deadline checked once cleanup is over, and lifecycle metrics.

mod deadline;
mod error;
pub mod metrics;
mod signals;

pub use deadline::{ShutdownDeadline, ShutdownOutcome};
pub use error::LifecycleError;
pub use signals::{ShutdownSignal, Signal};
