use std::fmt;

use tokio::signal::unix::{signal, SignalKind};

use crate::error::LifecycleError;

/// The signals that trigger a graceful shutdown. Nothing else is trapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => write!(f, "SIGINT"),
            Signal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// SIGINT and SIGTERM handlers. Installing them up front means a signal that
/// arrives during startup is kept until [`ShutdownSignal::recv`] is awaited.
pub struct ShutdownSignal {
    term: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    pub fn install() -> Result<Self, LifecycleError> {
        let term = signal(SignalKind::terminate()).map_err(|source| {
            LifecycleError::SignalHandler {
                signal: "SIGTERM",
                source,
            }
        })?;
        let interrupt = signal(SignalKind::interrupt()).map_err(|source| {
            LifecycleError::SignalHandler {
                signal: "SIGINT",
                source,
            }
        })?;

        Ok(Self { term, interrupt })
    }

    /// Blocks until SIGINT or SIGTERM is delivered and returns which one arrived.
    pub async fn recv(mut self) -> Signal {
        let received = tokio::select! {
            _ = self.term.recv() => Signal::Terminate,
            _ = self.interrupt.recv() => Signal::Interrupt,
        };
        tracing::info!(signal = %received, "received shutdown signal");
        received
    }
}
