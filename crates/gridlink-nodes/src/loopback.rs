//! In-process loopback node.
//!
//! Samples written to the node are queued as shared handles and copied into
//! the reader's slots only when read, so writing never copies values.

use async_trait::async_trait;
use gridlink_core::{Node, NodeDirection, NodeError, Sample, SampleMut};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::debug;

use crate::registry::{BuildError, NodeConfig};

fn default_queue_len() -> usize {
    1024
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    #[serde(default = "default_queue_len")]
    queue_len: usize,
}

/// Written samples become readable on the same node.
pub struct LoopbackNode {
    name: String,
    input: NodeDirection,
    output: NodeDirection,
    queue: Mutex<VecDeque<Sample>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl LoopbackNode {
    /// A loopback node holding up to `capacity` unread samples.
    ///
    /// Without an input schema the node reads what its output declares.
    #[must_use]
    pub fn new(name: impl Into<String>, mut input: NodeDirection, output: NodeDirection, capacity: usize) -> Self {
        if input.signals.is_empty() {
            input.signals = output.signals.clone();
        }
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            input,
            output,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Create from configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] for unknown parameters or a zero queue length.
    pub fn from_config(config: &NodeConfig) -> Result<Self, BuildError> {
        let params: Params = config.params()?;
        if params.queue_len == 0 {
            return Err(config.invalid("queue_len must be at least 1"));
        }
        Ok(Self::new(
            config.name.clone(),
            config.input.clone(),
            config.output.clone(),
            params.queue_len,
        ))
    }

    /// Number of unread samples.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    fn take(&self, smps: &mut [SampleMut]) -> usize {
        let mut queue = self.queue.lock();
        let n = queue.len().min(smps.len());
        for (slot, smp) in smps.iter_mut().zip(queue.drain(..n)) {
            let signals = slot.signals.take();
            slot.copy_from(&smp);
            if signals.is_some() {
                slot.signals = signals;
            }
        }
        n
    }
}

#[async_trait]
impl Node for LoopbackNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "loopback"
    }

    fn input(&self) -> &NodeDirection {
        &self.input
    }

    fn output(&self) -> &NodeDirection {
        &self.output
    }

    async fn start(&self) -> Result<(), NodeError> {
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    async fn stop(&self) -> Result<(), NodeError> {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        debug!(node = %self.name, pending = self.pending(), "Stopped loopback");
        Ok(())
    }

    async fn read(&self, smps: &mut [SampleMut]) -> Result<usize, NodeError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let n = self.take(smps);
            if n > 0 || smps.is_empty() {
                return Ok(n);
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(NodeError::Closed);
            }
            notified.await;
        }
    }

    async fn write(&self, smps: &[Sample]) -> Result<usize, NodeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NodeError::Closed);
        }
        let accepted = {
            let mut queue = self.queue.lock();
            let n = (self.capacity - queue.len()).min(smps.len());
            queue.extend(smps[..n].iter().cloned());
            n
        };
        if accepted > 0 {
            self.notify.notify_waiters();
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_core::{SamplePool, SignalData, SignalList};
    use std::sync::Arc;
    use std::time::Duration;

    fn published(pool: &SamplePool, seqs: std::ops::Range<u64>) -> Vec<Sample> {
        seqs.map(|seq| {
            let mut smp = pool.allocate().unwrap();
            smp.sequence = seq;
            smp.set_values(&[SignalData::Integer(seq as i64)]);
            smp.freeze()
        })
        .collect()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let node = LoopbackNode::new("lo", NodeDirection::default(), NodeDirection::default(), 2);
        let pool = SamplePool::new(8, 1);

        let out = published(&pool, 0..3);
        assert_eq!(node.write(&out).await.unwrap(), 2);
        // Queued handles share the writer's samples
        assert_eq!(out[0].ref_count(), 2);

        let mut slots = Vec::new();
        pool.allocate_into(&mut slots, 4);
        assert_eq!(node.read(&mut slots).await.unwrap(), 2);
        assert_eq!(slots[1].sequence, 1);
        assert_eq!(slots[1].values(), &[SignalData::Integer(1)]);
        assert_eq!(out[0].ref_count(), 1);
    }

    #[tokio::test]
    async fn test_read_waits_for_write() {
        let node = Arc::new(LoopbackNode::new(
            "lo",
            NodeDirection::default(),
            NodeDirection::default(),
            8,
        ));
        let pool = SamplePool::new(8, 1);

        let reader = {
            let node = Arc::clone(&node);
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut slots = Vec::new();
                pool.allocate_into(&mut slots, 1);
                let n = node.read(&mut slots).await.unwrap();
                (n, slots[0].sequence)
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        node.write(&published(&pool, 5..6)).await.unwrap();
        assert_eq!(reader.await.unwrap(), (1, 5));
    }

    #[tokio::test]
    async fn test_stop_closes_reads() {
        let node = LoopbackNode::new("lo", NodeDirection::default(), NodeDirection::default(), 8);
        let pool = SamplePool::new(2, 1);
        let mut slots = Vec::new();
        pool.allocate_into(&mut slots, 1);

        node.stop().await.unwrap();
        assert!(matches!(node.read(&mut slots).await, Err(NodeError::Closed)));
        assert!(matches!(
            node.write(&published(&pool, 0..1)).await,
            Err(NodeError::Closed)
        ));
    }

    #[test]
    fn test_input_schema_follows_output() {
        let output = NodeDirection::with_signals(SignalList::generic(3));
        let node = LoopbackNode::new("lo", NodeDirection::default(), output, 8);
        assert_eq!(node.input().signals.len(), 3);
    }
}
