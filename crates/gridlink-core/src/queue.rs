//! Bounded sample queue between a path and one destination writer.
//!
//! The queue has a fixed capacity chosen at prepare time. Batches are
//! pushed atomically: either every sample of the batch is queued or, when
//! the policy says so, none is. Each entry carries a ticket so that a writer
//! can peek a batch, hand it to a node and later remove exactly the samples
//! the node accepted, even if the producer evicted entries meanwhile.

use crate::pool::Sample;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// What happens when a batch does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued samples to make room.
    #[default]
    DropOldest,
    /// Reject the incoming batch.
    DropIncoming,
}

/// Result of pushing a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum PushOutcome {
    /// The whole batch was queued.
    Pushed,
    /// The whole batch was queued after evicting this many old samples.
    Evicted(usize),
    /// The whole batch (of this many samples) was rejected.
    Rejected(usize),
}

struct QueueState {
    entries: VecDeque<(u64, Sample)>,
    next_ticket: u64,
    closed: bool,
}

/// Bounded FIFO of shared samples with a single producer and a single consumer.
pub struct SampleQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState {
                entries: VecDeque::with_capacity(capacity),
                next_ticket: 0,
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            policy,
        }
    }

    /// Queue a copy of every handle in `smps` (one reference each).
    pub fn push_batch(&self, smps: &[Sample]) -> PushOutcome {
        self.push_iter(smps.iter().cloned())
    }

    /// Move the samples of `smps` into the queue. `smps` is left empty.
    pub fn push_owned(&self, smps: &mut Vec<Sample>) -> PushOutcome {
        self.push_iter(smps.drain(..))
    }

    fn push_iter<I>(&self, smps: I) -> PushOutcome
    where
        I: ExactSizeIterator<Item = Sample>,
    {
        let count = smps.len();
        if count == 0 {
            return PushOutcome::Pushed;
        }

        let mut state = self.state.lock();
        if state.closed || count > self.capacity {
            return PushOutcome::Rejected(count);
        }

        let free = self.capacity - state.entries.len();
        let mut evicted = 0;
        if count > free {
            match self.policy {
                OverflowPolicy::DropIncoming => return PushOutcome::Rejected(count),
                OverflowPolicy::DropOldest => {
                    evicted = count - free;
                    state.entries.drain(..evicted);
                }
            }
        }

        for smp in smps {
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.entries.push_back((ticket, smp));
        }
        drop(state);

        self.notify.notify_one();

        if evicted > 0 {
            PushOutcome::Evicted(evicted)
        } else {
            PushOutcome::Pushed
        }
    }

    /// Take the oldest sample without waiting.
    #[must_use]
    pub fn try_pop(&self) -> Option<Sample> {
        self.state.lock().entries.pop_front().map(|(_, smp)| smp)
    }

    /// Take the oldest sample, waiting until one is available.
    ///
    /// Returns `None` once `cancel` fires or the queue is closed and empty.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<Sample> {
        loop {
            if let Some(smp) = self.try_pop() {
                return Some(smp);
            }
            if !self.wait_nonempty(cancel).await {
                return None;
            }
        }
    }

    /// Wait until the queue holds at least one sample.
    ///
    /// Returns `false` if `cancel` fired or the queue was closed while empty.
    pub async fn wait_nonempty(&self, cancel: &CancellationToken) -> bool {
        loop {
            // Register before checking so a close in between is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.lock();
                if !state.entries.is_empty() {
                    return true;
                }
                if state.closed {
                    return false;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = &mut notified => {}
            }
        }
    }

    /// Copy up to `max` handles from the front into `out`, without removing
    /// them. Returns the ticket of the first one.
    pub fn peek_into(&self, out: &mut Vec<Sample>, max: usize) -> Option<u64> {
        let state = self.state.lock();
        let first = state.entries.front().map(|(ticket, _)| *ticket)?;
        out.extend(state.entries.iter().take(max).map(|(_, smp)| smp.clone()));
        Some(first)
    }

    /// Remove the `count` samples starting at ticket `first` that are still
    /// queued. Returns how many were removed.
    pub fn consume(&self, first: u64, count: usize) -> usize {
        let end = first + count as u64;
        let mut state = self.state.lock();
        let mut removed = 0;
        while state
            .entries
            .front()
            .is_some_and(|(ticket, _)| *ticket < end)
        {
            state.entries.pop_front();
            removed += 1;
        }
        removed
    }

    /// Drop every queued sample. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        count
    }

    /// Refuse further pushes and wake any waiting consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Number of queued samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued samples.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Overflow policy.
    #[must_use]
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

impl std::fmt::Debug for SampleQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SamplePool;
    use std::sync::Arc;
    use std::time::Duration;

    fn batch(pool: &SamplePool, seqs: std::ops::Range<u64>) -> Vec<Sample> {
        seqs.map(|seq| {
            let mut smp = pool.allocate().unwrap();
            smp.sequence = seq;
            smp.freeze()
        })
        .collect()
    }

    fn sequences(queue: &SampleQueue) -> Vec<u64> {
        let mut out = Vec::new();
        queue.peek_into(&mut out, usize::MAX);
        out.iter().map(|s| s.sequence).collect()
    }

    #[test]
    fn test_drop_oldest_keeps_batch_whole() {
        let pool = SamplePool::new(16, 1);
        let queue = SampleQueue::new(4, OverflowPolicy::DropOldest);

        assert_eq!(queue.push_batch(&batch(&pool, 0..3)), PushOutcome::Pushed);
        assert_eq!(queue.push_batch(&batch(&pool, 3..6)), PushOutcome::Evicted(2));
        assert_eq!(sequences(&queue), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_drop_incoming_rejects_batch() {
        let pool = SamplePool::new(16, 1);
        let queue = SampleQueue::new(4, OverflowPolicy::DropIncoming);

        assert_eq!(queue.push_batch(&batch(&pool, 0..3)), PushOutcome::Pushed);
        assert_eq!(queue.push_batch(&batch(&pool, 3..5)), PushOutcome::Rejected(2));
        assert_eq!(sequences(&queue), vec![0, 1, 2]);
    }

    #[test]
    fn test_batch_larger_than_capacity_is_rejected() {
        let pool = SamplePool::new(16, 1);
        let queue = SampleQueue::new(2, OverflowPolicy::DropOldest);
        assert_eq!(queue.push_batch(&batch(&pool, 0..3)), PushOutcome::Rejected(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_shares_samples() {
        let pool = SamplePool::new(2, 1);
        let smps = batch(&pool, 0..1);
        let q1 = SampleQueue::new(2, OverflowPolicy::DropOldest);
        let q2 = SampleQueue::new(2, OverflowPolicy::DropOldest);

        let _ = q1.push_batch(&smps);
        let _ = q2.push_batch(&smps);
        assert_eq!(smps[0].ref_count(), 3);

        drop(smps);
        q1.clear();
        assert_eq!(pool.available(), 1);
        q2.clear();
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_consume_after_eviction() {
        let pool = SamplePool::new(16, 1);
        let queue = SampleQueue::new(4, OverflowPolicy::DropOldest);
        let _ = queue.push_batch(&batch(&pool, 0..4));

        let mut peeked = Vec::new();
        let first = queue.peek_into(&mut peeked, 3).unwrap();
        assert_eq!(first, 0);

        // Producer evicts two while the writer is busy
        let _ = queue.push_batch(&batch(&pool, 4..6));

        // Writer accepted all three peeked samples; only ticket 2 is still queued
        assert_eq!(queue.consume(first, 3), 1);
        assert_eq!(sequences(&queue), vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let pool = SamplePool::new(4, 1);
        let queue = Arc::new(SampleQueue::new(4, OverflowPolicy::DropOldest));
        let cancel = CancellationToken::new();

        let consumer = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.pop(&cancel).await.map(|s| s.sequence) })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = queue.push_batch(&batch(&pool, 7..8));
        assert_eq!(consumer.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_pop_cancelled() {
        let queue = SampleQueue::new(4, OverflowPolicy::DropOldest);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(queue.pop(&cancel).await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let queue = Arc::new(SampleQueue::new(4, OverflowPolicy::DropOldest));
        let cancel = CancellationToken::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let cancel = cancel.clone();
                tokio::spawn(async move { queue.wait_nonempty(&cancel).await })
            })
            .collect();

        tokio::task::yield_now().await;
        queue.close();
        for waiter in waiters {
            let woke = tokio::time::timeout(Duration::from_secs(1), waiter).await;
            assert!(!woke.unwrap().unwrap());
        }
    }
}
