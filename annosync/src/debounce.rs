//! Restartable single-shot deadline.
//!
//! The controller does not own a timer. It asks the debouncer for the next
//! deadline, the host sleeps until then, and hands the current instant back
//! through `poll`. Every new edit pushes the deadline out, so a burst of
//! keystrokes produces one fire after the last one.

#[cfg(test)]
#[path = "debounce_test.rs"]
mod debounce_test;

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    #[must_use]
    pub fn new(quiet: Duration) -> Self {
        Self { quiet, deadline: None }
    }

    /// (Re)arm the deadline one quiet period after `now`.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Returns `true` exactly once when the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(at) if now >= at => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
