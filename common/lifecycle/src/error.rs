//! Lifecycle error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The OS refused to install a handler for one of the shutdown signals.
    #[error("failed to install {signal} handler: {source}")]
    SignalHandler {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },
}
