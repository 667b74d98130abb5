//! Single-slot reconnect timer
//!
//! The timer is a deadline, not a spawned task: the session's event pump
//! sleeps until it, so cancelling is just clearing the slot and a stale timer
//! can never fire. Scheduling while a deadline is pending replaces it.

use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

#[derive(Debug)]
pub struct ReconnectTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl ReconnectTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Arm the timer `delay` from now, replacing any pending deadline
    pub fn schedule(&mut self) -> Instant {
        let deadline = Instant::now() + self.delay;
        if self.deadline.replace(deadline).is_some() {
            debug!(target: "session", "Replaced pending reconnect attempt");
        }
        deadline
    }

    /// Clear the pending deadline; returns whether one was pending
    pub fn cancel(&mut self) -> bool {
        let was_pending = self.deadline.take().is_some();
        if was_pending {
            debug!(target: "session", "Cancelled pending reconnect attempt");
        }
        was_pending
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Resolves when the pending deadline passes; never resolves when idle
    pub async fn fired(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
