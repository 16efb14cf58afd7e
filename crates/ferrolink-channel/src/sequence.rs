//! Wrap-around sequence counters.
//!
//! Sequence numbers and request ids are 32-bit unsigned counters that wrap
//! from `u32::MAX` back to 1, never to 0. Each direction of a channel owns
//! its own counter; the atomic makes concurrent senders safe without a lock.

use std::sync::atomic::{AtomicU32, Ordering};

/// First value a counter takes after wrapping.
pub const SEQUENCE_WRAP_TO: u32 = 1;

/// The wrap-aware successor of a sequence number.
pub fn next_sequence(value: u32) -> u32 {
    if value == u32::MAX {
        SEQUENCE_WRAP_TO
    } else {
        value + 1
    }
}

/// A monotonically increasing u32 counter wrapping `u32::MAX -> 1`.
#[derive(Debug)]
pub struct SequenceCounter {
    value: AtomicU32,
}

impl SequenceCounter {
    /// Create a counter whose first [`next`](Self::next) call returns
    /// `start`.
    pub fn new(start: u32) -> Self {
        Self {
            value: AtomicU32::new(start),
        }
    }

    /// Take the current value and advance the counter.
    pub fn next(&self) -> u32 {
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            match self.value.compare_exchange_weak(
                current,
                next_sequence(current),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(taken) => return taken,
                Err(actual) => current = actual,
            }
        }
    }

    /// The value the next [`next`](Self::next) call will return.
    pub fn peek(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new(SEQUENCE_WRAP_TO)
    }
}
