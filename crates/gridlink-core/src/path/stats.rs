//! Lock-free path counters and their snapshots.

use crate::queue::SampleQueue;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) fn add(counter: &AtomicU64, n: usize) {
    if n > 0 {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

/// Counters of one destination.
#[derive(Debug)]
pub struct DestinationStats {
    node: String,
    queue: Arc<SampleQueue>,
    pub(crate) enqueued: AtomicU64,
    pub(crate) written: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) write_errors: AtomicU64,
    pub(crate) hook_skipped: AtomicU64,
    pub(crate) healthy: AtomicBool,
}

impl DestinationStats {
    pub(crate) fn new(node: impl Into<String>, queue: Arc<SampleQueue>) -> Self {
        Self {
            node: node.into(),
            queue,
            enqueued: AtomicU64::new(0),
            written: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            hook_skipped: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    /// Name of the destination node.
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Samples accepted by the node so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        load(&self.written)
    }

    /// Samples lost to overflow, pool exhaustion or shutdown.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        load(&self.dropped)
    }

    /// Whether the node accepts writes, i.e. fewer consecutive failures
    /// than the threshold.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> DestinationSnapshot {
        DestinationSnapshot {
            node: self.node.clone(),
            enqueued: load(&self.enqueued),
            written: load(&self.written),
            dropped: load(&self.dropped),
            write_errors: load(&self.write_errors),
            hook_skipped: load(&self.hook_skipped),
            queued: self.queue.len(),
            healthy: self.is_healthy(),
        }
    }
}

/// Counters of one path.
#[derive(Debug, Default)]
pub struct PathStats {
    pub(crate) received: AtomicU64,
    pub(crate) read_errors: AtomicU64,
    pub(crate) source_skipped: AtomicU64,
    pub(crate) hook_skipped: AtomicU64,
    pub(crate) hook_errors: AtomicU64,
    pub(crate) hook_discarded: AtomicU64,
    pub(crate) emitted: AtomicU64,
    pub(crate) backpressure: AtomicU64,
    destinations: Vec<Arc<DestinationStats>>,
}

impl PathStats {
    pub(crate) fn new(destinations: Vec<Arc<DestinationStats>>) -> Self {
        Self {
            destinations,
            ..Self::default()
        }
    }

    /// Samples read from source nodes.
    #[must_use]
    pub fn received(&self) -> u64 {
        load(&self.received)
    }

    /// Samples leaving the path pipeline.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        load(&self.emitted)
    }

    /// Per destination counters, in configuration order.
    #[must_use]
    pub fn destinations(&self) -> &[Arc<DestinationStats>] {
        &self.destinations
    }

    /// Sum of samples written by all destinations.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.destinations.iter().map(|d| d.written()).sum()
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> PathSnapshot {
        PathSnapshot {
            received: load(&self.received),
            read_errors: load(&self.read_errors),
            source_skipped: load(&self.source_skipped),
            hook_skipped: load(&self.hook_skipped),
            hook_errors: load(&self.hook_errors),
            hook_discarded: load(&self.hook_discarded),
            emitted: load(&self.emitted),
            backpressure: load(&self.backpressure),
            destinations: self.destinations.iter().map(|d| d.snapshot()).collect(),
        }
    }
}

/// Serializable copy of [`DestinationStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationSnapshot {
    pub node: String,
    pub enqueued: u64,
    pub written: u64,
    pub dropped: u64,
    pub write_errors: u64,
    pub hook_skipped: u64,
    pub queued: usize,
    pub healthy: bool,
}

/// Serializable copy of [`PathStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathSnapshot {
    /// Samples read from source nodes.
    pub received: u64,
    /// Failed source reads.
    pub read_errors: u64,
    /// Samples rejected by node-read hooks.
    pub source_skipped: u64,
    /// Samples skipped by path hooks.
    pub hook_skipped: u64,
    /// Samples dropped by path hooks with an error.
    pub hook_errors: u64,
    /// Samples discarded because a path hook stopped the batch.
    pub hook_discarded: u64,
    /// Samples leaving the path pipeline.
    pub emitted: u64,
    /// Output samples lost to an exhausted pool.
    pub backpressure: u64,
    /// Per destination counters.
    pub destinations: Vec<DestinationSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::OverflowPolicy;

    #[test]
    fn test_snapshot() {
        let queue = Arc::new(SampleQueue::new(4, OverflowPolicy::DropOldest));
        let dest = Arc::new(DestinationStats::new("sink", queue));
        let stats = PathStats::new(vec![Arc::clone(&dest)]);

        add(&stats.received, 3);
        add(&dest.written, 2);
        dest.healthy.store(false, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.received, 3);
        assert_eq!(snapshot.destinations[0].written, 2);
        assert!(!snapshot.destinations[0].healthy);
        assert_eq!(stats.written(), 2);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["destinations"][0]["node"], "sink");
    }
}
