//! Exchange counters
//!
//! Fire-and-forget increments from event context; nothing in the state
//! machine reads these back. Hosts poll [`RangingStats::snapshot`] for
//! diagnostics.

use core::sync::atomic::{AtomicU32, Ordering};

/// Counters of a ranging instance
#[derive(Debug, Default)]
pub struct RangingStats {
    complete: AtomicU32,
    tx_error: AtomicU32,
    reset: AtomicU32,
}

/// A point-in-time copy of the counters
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatsSnapshot {
    /// Exchanges finished on the initiator side
    pub complete: u32,
    /// Transmission-start failures
    pub tx_error: u32,
    /// Stuck exchanges recovered through the reset signal
    pub reset: u32,
}

impl RangingStats {
    /// Creates a zeroed counter block
    pub const fn new() -> Self {
        RangingStats {
            complete: AtomicU32::new(0),
            tx_error: AtomicU32::new(0),
            reset: AtomicU32::new(0),
        }
    }

    /// Records a completed exchange
    pub fn record_complete(&self) {
        self.complete.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a transmission-start failure
    pub fn record_tx_error(&self) {
        self.tx_error.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reset that released a stuck exchange
    pub fn record_reset(&self) {
        self.reset.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            complete: self.complete.load(Ordering::Relaxed),
            tx_error: self.tx_error.load(Ordering::Relaxed),
            reset: self.reset.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independent() {
        let stats = RangingStats::new();
        stats.record_complete();
        stats.record_complete();
        stats.record_reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.complete, 2);
        assert_eq!(snapshot.tx_error, 0);
        assert_eq!(snapshot.reset, 1);
    }
}
