//! Lamport logical clock.
//!
//! Every exchange between nodes carries a timestamp. Both sides fold the
//! peer's value into their own clock so that causally related events are
//! totally ordered without synchronized wall clocks.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic logical clock shared by a node's client and server halves.
#[derive(Debug, Default)]
pub struct LogicalClock {
    current: AtomicU64,
}

impl LogicalClock {
    /// A clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock resuming from a persisted value.
    pub fn starting_at(value: u64) -> Self {
        Self {
            current: AtomicU64::new(value),
        }
    }

    /// Current value without advancing.
    pub fn now(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Advances to `max(current, received) + 1` and returns the new value.
    ///
    /// `None` is a purely local event (e.g. stamping an outgoing request).
    pub fn advance(&self, received: Option<u64>) -> u64 {
        let received = received.unwrap_or(0);
        let mut current = self.current.load(Ordering::Acquire);
        loop {
            let next = current.max(received).saturating_add(1);
            match self.current.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}
