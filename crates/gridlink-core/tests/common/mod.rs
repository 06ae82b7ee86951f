//! Common test utilities: scripted source and recording sink nodes.

#![allow(dead_code)] // Not every test file uses every helper

use async_trait::async_trait;
use gridlink_core::{
    Node, NodeDirection, NodeError, NodeRef, Sample, SampleFlags, SampleMut, SignalData, SignalList,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, Notify};

/// How long tests wait for samples to show up.
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// A source fed from the test through a channel.
///
/// Dropping the [`SourceFeed`] closes the node.
pub struct TestSource {
    name: String,
    input: NodeDirection,
    output: NodeDirection,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(u64, Vec<SignalData>)>>,
}

/// Sending side of a [`TestSource`].
#[derive(Clone)]
pub struct SourceFeed {
    tx: mpsc::UnboundedSender<(u64, Vec<SignalData>)>,
}

impl SourceFeed {
    pub fn send(&self, sequence: u64, values: Vec<SignalData>) {
        self.tx.send((sequence, values)).expect("source dropped");
    }

    /// Send samples whose only value is their sequence number.
    pub fn send_range(&self, sequences: std::ops::Range<u64>) {
        for seq in sequences {
            self.send(seq, vec![SignalData::Float(seq as f64)]);
        }
    }
}

impl TestSource {
    pub fn new(name: &str, signals: SignalList) -> (Arc<Self>, SourceFeed) {
        Self::with_input(name, NodeDirection::with_signals(signals))
    }

    pub fn with_input(name: &str, input: NodeDirection) -> (Arc<Self>, SourceFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Arc::new(Self {
            name: name.to_string(),
            input,
            output: NodeDirection {
                enabled: false,
                ..NodeDirection::default()
            },
            rx: tokio::sync::Mutex::new(rx),
        });
        (source, SourceFeed { tx })
    }

    fn fill(smp: &mut SampleMut, sequence: u64, values: &[SignalData]) {
        smp.sequence = sequence;
        smp.ts_origin = SystemTime::now();
        smp.set_values(values);
        smp.flags = SampleFlags::HAS_SEQUENCE | SampleFlags::HAS_TS_ORIGIN | SampleFlags::HAS_DATA;
    }
}

#[async_trait]
impl Node for TestSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "test-source"
    }

    fn input(&self) -> &NodeDirection {
        &self.input
    }

    fn output(&self) -> &NodeDirection {
        &self.output
    }

    async fn read(&self, smps: &mut [SampleMut]) -> Result<usize, NodeError> {
        if smps.is_empty() {
            return Ok(0);
        }
        let mut rx = self.rx.lock().await;

        let Some((sequence, values)) = rx.recv().await else {
            return Err(NodeError::Closed);
        };
        Self::fill(&mut smps[0], sequence, &values);

        let mut read = 1;
        while read < smps.len() {
            match rx.try_recv() {
                Ok((sequence, values)) => {
                    Self::fill(&mut smps[read], sequence, &values);
                    read += 1;
                }
                Err(_) => break,
            }
        }
        Ok(read)
    }

    async fn write(&self, _smps: &[Sample]) -> Result<usize, NodeError> {
        Err(NodeError::Other("test source is read only".into()))
    }
}

/// A sink recording everything it accepts.
pub struct TestSink {
    name: String,
    input: NodeDirection,
    output: NodeDirection,
    accept: AtomicUsize,
    blocked: AtomicBool,
    released: Notify,
    received: Mutex<Vec<Sample>>,
    notify: Notify,
}

impl TestSink {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_output(name, NodeDirection::default())
    }

    pub fn with_output(name: &str, output: NodeDirection) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            input: NodeDirection {
                enabled: false,
                ..NodeDirection::default()
            },
            output,
            accept: AtomicUsize::new(usize::MAX),
            blocked: AtomicBool::new(false),
            released: Notify::new(),
            received: Mutex::new(Vec::new()),
            notify: Notify::new(),
        })
    }

    /// Accept at most `limit` samples per write from now on.
    pub fn set_accept(&self, limit: usize) {
        self.accept.store(limit, Ordering::SeqCst);
    }

    /// Make writes wait until [`TestSink::release`] is called.
    pub fn block(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    /// Let blocked and future writes through.
    pub fn release(&self) {
        self.blocked.store(false, Ordering::SeqCst);
        self.released.notify_waiters();
    }

    /// Sequence numbers received so far.
    pub fn sequences(&self) -> Vec<u64> {
        self.received.lock().iter().map(|s| s.sequence).collect()
    }

    /// Samples received so far.
    pub fn samples(&self) -> Vec<Sample> {
        self.received.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    /// Drop the recorded samples.
    pub fn clear(&self) {
        self.received.lock().clear();
    }

    /// Wait until at least `count` samples arrived.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Node for TestSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "test-sink"
    }

    fn input(&self) -> &NodeDirection {
        &self.input
    }

    fn output(&self) -> &NodeDirection {
        &self.output
    }

    async fn read(&self, _smps: &mut [SampleMut]) -> Result<usize, NodeError> {
        Err(NodeError::Other("test sink is write only".into()))
    }

    async fn write(&self, smps: &[Sample]) -> Result<usize, NodeError> {
        loop {
            let released = self.released.notified();
            if !self.blocked.load(Ordering::SeqCst) {
                break;
            }
            released.await;
        }

        let accepted = smps.len().min(self.accept.load(Ordering::SeqCst));
        self.received.lock().extend(smps[..accepted].iter().cloned());
        self.notify.notify_waiters();
        Ok(accepted)
    }
}

/// Build a node table for [`gridlink_core::Path::prepare`].
pub fn nodes(list: &[NodeRef]) -> HashMap<String, NodeRef> {
    list.iter()
        .map(|node| (node.name().to_string(), Arc::clone(node)))
        .collect()
}

/// Poll `condition` until it holds or the test timeout passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + test_timeout();
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {:?}",
            test_timeout()
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
