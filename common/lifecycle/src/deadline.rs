//! Advisory shutdown deadline.
//!
//! The deadline is computed once, when the shutdown signal is received, and only
//! decides how the end of cleanup is reported. It never cancels cleanup work.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Cleanup finished before the deadline
    Clean,
    /// Cleanup finished, but after the deadline had elapsed
    TimedOut { overrun: Duration },
}

impl ShutdownOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, ShutdownOutcome::Clean)
    }
}

/// `signal_received_at + timeout`, read-only once computed.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownDeadline {
    started: Instant,
    at: Instant,
}

impl ShutdownDeadline {
    /// Starts the clock now.
    pub fn start(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: started + timeout,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Outcome of a cleanup that has just completed. Non-blocking: never waits
    /// on the deadline.
    pub fn outcome(&self) -> ShutdownOutcome {
        let now = Instant::now();
        if now >= self.at {
            ShutdownOutcome::TimedOut {
                overrun: now.saturating_duration_since(self.at),
            }
        } else {
            ShutdownOutcome::Clean
        }
    }
}
