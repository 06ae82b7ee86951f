//! Binding of one output node to a path: fan-out queue and writer.

use super::stats::{add, DestinationStats};
use crate::error::ConfigError;
use crate::hooks::{HookContext, HookList, HookRegistry};
use crate::node::{NodeError, NodeRef};
use crate::pool::{Sample, SampleMut, SamplePool};
use crate::queue::{OverflowPolicy, PushOutcome, SampleQueue};
use crate::signal::SignalList;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause between write attempts that made no progress.
pub(crate) const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Longest an inline write may hold up the path task. A destination
/// exceeding it continues on a dedicated writer.
pub(crate) const INLINE_WRITE_BUDGET: Duration = Duration::from_millis(100);

/// Where destination writes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterMode {
    /// On the path task, right after each enqueue.
    #[default]
    Inline,
    /// On a task of its own, for nodes whose writes may block.
    Dedicated,
}

/// Drives writes of one queue into one node.
pub(crate) struct DestinationWriter {
    node: NodeRef,
    queue: Arc<SampleQueue>,
    stats: Arc<DestinationStats>,
    scratch: Vec<Sample>,
    batch: usize,
    failure_threshold: u32,
    failures: u32,
}

impl DestinationWriter {
    /// Write queued samples until the queue is empty, the node accepts fewer
    /// than offered or a write fails. Returns the number accepted.
    pub(crate) async fn flush(&mut self) -> usize {
        let mut total = 0;
        loop {
            self.scratch.clear();
            let Some(first) = self.queue.peek_into(&mut self.scratch, self.batch) else {
                break;
            };
            let offered = self.scratch.len();

            match self.node.write(&self.scratch).await {
                Ok(accepted) => {
                    let accepted = accepted.min(offered);
                    self.queue.consume(first, accepted);
                    add(&self.stats.written, accepted);
                    total += accepted;
                    if accepted > 0 {
                        self.record_success();
                    }
                    if accepted < offered {
                        break;
                    }
                }
                Err(err) => {
                    self.record_failure(&err);
                    break;
                }
            }
        }
        self.scratch.clear();
        total
    }

    fn record_success(&mut self) {
        self.failures = 0;
        if !self.stats.healthy.swap(true, Ordering::Relaxed) {
            info!(node = %self.node.name(), "Destination recovered");
        }
    }

    fn record_failure(&mut self, err: &NodeError) {
        self.failures = self.failures.saturating_add(1);
        add(&self.stats.write_errors, 1);

        if self.failures == 1 {
            warn!(node = %self.node.name(), error = %err, "Destination write failed");
        } else {
            debug!(node = %self.node.name(), error = %err, failures = self.failures, "Destination write failed");
        }

        if self.failures >= self.failure_threshold && self.stats.healthy.swap(false, Ordering::Relaxed) {
            error!(
                node = %self.node.name(),
                failures = self.failures,
                "Destination marked unhealthy"
            );
        }
    }

    /// Keep writing until the queue is empty.
    pub(crate) async fn drain(&mut self) {
        while !self.queue.is_empty() {
            if self.flush().await == 0 {
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }

    /// Writer task body for [`WriterMode::Dedicated`].
    async fn run(mut self, cancel: CancellationToken) -> Self {
        while self.queue.wait_nonempty(&cancel).await {
            if self.flush().await == 0 {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_INTERVAL) => {}
                }
            }
        }
        self
    }
}

enum Writer {
    Inline(DestinationWriter),
    Dedicated {
        task: JoinHandle<DestinationWriter>,
        cancel: CancellationToken,
    },
    Gone,
}

/// Settings of one destination after defaults were applied.
#[derive(Debug, Clone)]
pub(crate) struct DestinationSettings {
    pub writer: WriterMode,
    pub queue_len: usize,
    pub overflow: OverflowPolicy,
    pub failure_threshold: u32,
    pub vectorize: usize,
}

pub(crate) struct PathDestination {
    node: NodeRef,
    queue: Arc<SampleQueue>,
    hooks: HookList,
    pool: Option<SamplePool>,
    stats: Arc<DestinationStats>,
    mode: WriterMode,
    writer: Writer,
    copies: Vec<SampleMut>,
    frozen: Vec<Sample>,
    overflowing: bool,
}

impl PathDestination {
    pub(crate) fn new(
        node: NodeRef,
        registry: &HookRegistry,
        settings: &DestinationSettings,
    ) -> Result<Self, ConfigError> {
        let direction = node.output();
        if !direction.enabled {
            return Err(ConfigError::InvalidSetting {
                name: "out",
                reason: format!("node '{}' has writing disabled", node.name()),
            });
        }
        if settings.queue_len < settings.vectorize {
            return Err(ConfigError::InvalidSetting {
                name: "queue_len",
                reason: format!(
                    "{} is smaller than the batch size {}",
                    settings.queue_len, settings.vectorize
                ),
            });
        }

        let mut hooks = HookList::new(HookContext::NodeWrite);
        hooks.parse(registry, &direction.hooks, direction.builtin)?;

        let queue = Arc::new(SampleQueue::new(settings.queue_len, settings.overflow));
        let stats = Arc::new(DestinationStats::new(node.name(), Arc::clone(&queue)));
        let writer = DestinationWriter {
            node: Arc::clone(&node),
            queue: Arc::clone(&queue),
            stats: Arc::clone(&stats),
            scratch: Vec::with_capacity(direction.vectorize.max(1)),
            batch: direction.vectorize.max(1),
            failure_threshold: settings.failure_threshold.max(1),
            failures: 0,
        };

        Ok(Self {
            node,
            queue,
            hooks,
            pool: None,
            stats,
            mode: settings.writer,
            writer: Writer::Inline(writer),
            copies: Vec::with_capacity(settings.vectorize),
            frozen: Vec::with_capacity(settings.vectorize),
            overflowing: false,
        })
    }

    /// Check the node's schema and prepare the write hooks.
    pub(crate) fn prepare(
        &mut self,
        signals: Arc<SignalList>,
        vectorize: usize,
    ) -> Result<(), ConfigError> {
        let expected = &self.node.output().signals;
        if !expected.is_empty() && expected.len() != signals.len() {
            return Err(ConfigError::SchemaMismatch {
                node: self.node.name().to_string(),
                expected: expected.len(),
                actual: signals.len(),
            });
        }

        if !self.hooks.is_empty() {
            let output = self.hooks.prepare(Arc::clone(&signals))?;
            let capacity = signals.len().max(output.len());
            self.pool = Some(SamplePool::new(self.queue.capacity() + vectorize, capacity));
        }
        Ok(())
    }

    pub(crate) fn node(&self) -> &NodeRef {
        &self.node
    }

    pub(crate) fn name(&self) -> &str {
        self.node.name()
    }

    pub(crate) fn stats(&self) -> &Arc<DestinationStats> {
        &self.stats
    }

    pub(crate) fn hooks_mut(&mut self) -> &mut HookList {
        &mut self.hooks
    }

    /// Push a published batch onto the queue, all or nothing.
    ///
    /// Without write hooks the queue shares the path's samples. With write
    /// hooks every sample is copied into this destination's pool first, so
    /// the hooks never modify a sample another destination can see.
    pub(crate) fn enqueue(&mut self, smps: &[Sample]) {
        if smps.is_empty() {
            return;
        }

        let outcome = match &self.pool {
            None => self.queue.push_batch(smps),
            Some(pool) => {
                self.copies.clear();
                for smp in smps {
                    match pool.copy_of(smp) {
                        Some(copy) => self.copies.push(copy),
                        None => break,
                    }
                }
                if self.copies.len() < smps.len() {
                    self.copies.clear();
                    self.overflowed(smps.len(), "Destination pool exhausted");
                    return;
                }

                let summary = self.hooks.process(&mut self.copies);
                add(
                    &self.stats.hook_skipped,
                    summary.skipped + summary.errors + summary.discarded,
                );
                self.frozen.extend(self.copies.drain(..).map(SampleMut::freeze));
                let count = self.frozen.len();
                if count == 0 {
                    return;
                }
                let outcome = self.queue.push_owned(&mut self.frozen);
                self.account(count, outcome);
                return;
            }
        };
        self.account(smps.len(), outcome);
    }

    fn account(&mut self, count: usize, outcome: PushOutcome) {
        match outcome {
            PushOutcome::Pushed => {
                add(&self.stats.enqueued, count);
                if self.overflowing {
                    self.overflowing = false;
                    debug!(node = %self.node.name(), "Destination queue has room again");
                }
            }
            PushOutcome::Evicted(evicted) => {
                add(&self.stats.enqueued, count);
                self.overflowed(evicted, "Destination queue full, dropping oldest samples");
            }
            PushOutcome::Rejected(rejected) => {
                self.overflowed(rejected, "Destination queue full, dropping incoming samples");
            }
        }
    }

    fn overflowed(&mut self, dropped: usize, message: &'static str) {
        add(&self.stats.dropped, dropped);
        if !self.overflowing {
            self.overflowing = true;
            warn!(node = %self.node.name(), dropped, "{message}");
        }
    }

    /// Run the inline writer. Dedicated writers were already woken by the push.
    ///
    /// An inline write that takes longer than [`INLINE_WRITE_BUDGET`] is
    /// abandoned, leaving its samples queued, and the destination moves onto
    /// a dedicated writer so it cannot stall the path again.
    pub(crate) async fn write(&mut self, parent: &CancellationToken) {
        let Writer::Inline(writer) = &mut self.writer else {
            return;
        };
        if tokio::time::timeout(INLINE_WRITE_BUDGET, writer.flush()).await.is_ok() {
            return;
        }

        warn!(
            node = %self.node.name(),
            budget = ?INLINE_WRITE_BUDGET,
            "Inline write blocked, moving destination to a dedicated writer"
        );
        self.mode = WriterMode::Dedicated;
        self.spawn_writer(parent);
    }

    /// Move the writer onto its own task if configured so.
    pub(crate) fn spawn_writer(&mut self, parent: &CancellationToken) {
        if self.mode != WriterMode::Dedicated {
            return;
        }
        if let Writer::Inline(writer) = std::mem::replace(&mut self.writer, Writer::Gone) {
            let cancel = parent.child_token();
            let task = tokio::spawn(writer.run(cancel.clone()));
            self.writer = Writer::Dedicated { task, cancel };
        }
    }

    /// Stop a dedicated writer and take it back once it has finished its
    /// current batch.
    ///
    /// The task handle stays in place until the task completed, so dropping
    /// this future leaves the writer reachable for [`Self::stop_writer`].
    async fn reclaim_writer(&mut self) -> Option<&mut DestinationWriter> {
        if let Writer::Dedicated { task, cancel } = &mut self.writer {
            cancel.cancel();
            let joined = task.await;
            self.writer = match joined {
                Ok(writer) => Writer::Inline(writer),
                Err(err) => {
                    error!(node = %self.node.name(), error = %err, "Destination writer failed");
                    Writer::Gone
                }
            };
        }

        match &mut self.writer {
            Writer::Inline(writer) => Some(writer),
            _ => None,
        }
    }

    /// Write what is still queued. Must be bounded by the caller.
    pub(crate) async fn drain(&mut self) {
        if let Some(writer) = self.reclaim_writer().await {
            writer.drain().await;
        }
    }

    /// Abort any dedicated writer, including a write in progress, and wait
    /// until it is gone. Nothing is written after this returns.
    pub(crate) async fn stop_writer(&mut self) {
        if let Writer::Dedicated { task, cancel } = &mut self.writer {
            cancel.cancel();
            task.abort();
            let joined = task.await;
            self.writer = match joined {
                Ok(writer) => Writer::Inline(writer),
                Err(err) if err.is_cancelled() => {
                    debug!(node = %self.node.name(), "Destination writer aborted");
                    Writer::Gone
                }
                Err(err) => {
                    error!(node = %self.node.name(), error = %err, "Destination writer failed");
                    Writer::Gone
                }
            };
        }
    }

    /// Drop everything still queued and refuse further pushes. Returns the
    /// number of samples dropped.
    pub(crate) fn close(&mut self) -> usize {
        let dropped = self.queue.clear();
        self.queue.close();
        add(&self.stats.dropped, dropped);
        dropped
    }
}
