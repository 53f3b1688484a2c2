//! Bridge traffic counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of bridge traffic counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    /// Uplinks sent to the router
    pub uplinks_forwarded: u64,
    /// Uplinks dropped by the rate limiter
    pub uplinks_rate_limited: u64,
    /// Status reports sent to the router
    pub status_forwarded: u64,
    /// Downlinks handed to the TX channel
    pub downlinks_forwarded: u64,
    /// Downlinks dropped because they could not be translated
    pub downlinks_rejected: u64,
    /// Live gateway sessions
    pub sessions: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) uplinks_forwarded: AtomicU64,
    pub(crate) uplinks_rate_limited: AtomicU64,
    pub(crate) status_forwarded: AtomicU64,
    pub(crate) downlinks_forwarded: AtomicU64,
    pub(crate) downlinks_rejected: AtomicU64,
}

impl Counters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, sessions: usize) -> BridgeStats {
        BridgeStats {
            uplinks_forwarded: self.uplinks_forwarded.load(Ordering::Relaxed),
            uplinks_rate_limited: self.uplinks_rate_limited.load(Ordering::Relaxed),
            status_forwarded: self.status_forwarded.load(Ordering::Relaxed),
            downlinks_forwarded: self.downlinks_forwarded.load(Ordering::Relaxed),
            downlinks_rejected: self.downlinks_rejected.load(Ordering::Relaxed),
            sessions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let counters = Counters::default();
        Counters::incr(&counters.uplinks_forwarded);
        Counters::incr(&counters.uplinks_forwarded);
        Counters::incr(&counters.downlinks_rejected);

        let stats = counters.snapshot(3);
        assert_eq!(stats.uplinks_forwarded, 2);
        assert_eq!(stats.downlinks_rejected, 1);
        assert_eq!(stats.uplinks_rate_limited, 0);
        assert_eq!(stats.sessions, 3);
    }
}
