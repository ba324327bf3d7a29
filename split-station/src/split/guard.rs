//! Per-batch exclusion
//!
//! A source batch may only be in one split at a time; the lease is
//! released when dropped, on every exit path.

use dashmap::DashSet;

/// Set of batch numbers with a split in flight
#[derive(Debug, Default)]
pub struct BatchLocks {
    in_flight: DashSet<String>,
}

impl BatchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `batch_number`, or `None` if another split holds it
    pub fn try_acquire(&self, batch_number: &str) -> Option<BatchLease<'_>> {
        if self.in_flight.insert(batch_number.to_string()) {
            Some(BatchLease {
                locks: self,
                batch_number: batch_number.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_locked(&self, batch_number: &str) -> bool {
        self.in_flight.contains(batch_number)
    }
}

/// Held for the duration of one split
#[derive(Debug)]
pub struct BatchLease<'a> {
    locks: &'a BatchLocks,
    batch_number: String,
}

impl BatchLease<'_> {
    pub fn batch_number(&self) -> &str {
        &self.batch_number
    }
}

impl Drop for BatchLease<'_> {
    fn drop(&mut self) {
        self.locks.in_flight.remove(&self.batch_number);
    }
}
