//! Binding of one input node to a path.

use crate::error::ConfigError;
use crate::hooks::{HookContext, HookList, HookRegistry, ProcessSummary};
use crate::mapping::ResolvedMapping;
use crate::node::{NodeError, NodeRef};
use crate::pool::{SampleMut, SamplePool};
use crate::signal::SignalList;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one source read.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SourceRead {
    /// Samples returned by the node.
    pub read: usize,
    /// What the node-read hooks did with them.
    pub hooks: ProcessSummary,
}

pub(crate) struct PathSource {
    node: NodeRef,
    hooks: HookList,
    pool: Option<SamplePool>,
    signals: Option<Arc<SignalList>>,
    pub(crate) mappings: Vec<ResolvedMapping>,
    batch: Vec<SampleMut>,
    vectorize: usize,
    exhausted: bool,
    closed: bool,
}

impl PathSource {
    pub(crate) fn new(node: NodeRef, registry: &HookRegistry) -> Result<Self, ConfigError> {
        let direction = node.input();
        if !direction.enabled {
            return Err(ConfigError::InvalidSetting {
                name: "in",
                reason: format!("node '{}' has reading disabled", node.name()),
            });
        }

        let mut hooks = HookList::new(HookContext::NodeRead);
        hooks.parse(registry, &direction.hooks, direction.builtin)?;
        let vectorize = direction.vectorize.max(1);

        Ok(Self {
            node,
            hooks,
            pool: None,
            signals: None,
            mappings: Vec::new(),
            batch: Vec::with_capacity(vectorize),
            vectorize,
            exhausted: false,
            closed: false,
        })
    }

    /// Prepare the read hooks and size the pool. Returns the schema that
    /// mappings resolve against.
    pub(crate) fn prepare(&mut self) -> Result<Arc<SignalList>, ConfigError> {
        let input = Arc::new(self.node.input().signals.clone());
        let output = self.hooks.prepare(Arc::clone(&input))?;

        let capacity = input.len().max(output.len());
        self.pool = Some(SamplePool::new(2 * self.vectorize, capacity));
        self.signals = Some(input);

        debug!(
            node = %self.node.name(),
            vectorize = self.vectorize,
            signals = capacity,
            "Prepared path source"
        );
        Ok(output)
    }

    pub(crate) fn node(&self) -> &NodeRef {
        &self.node
    }

    pub(crate) fn name(&self) -> &str {
        self.node.name()
    }

    pub(crate) fn vectorize(&self) -> usize {
        self.vectorize
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn hooks_mut(&mut self) -> &mut HookList {
        &mut self.hooks
    }

    /// Samples that survived the last read.
    pub(crate) fn batch(&self) -> &[SampleMut] {
        &self.batch
    }

    /// Return the last batch to the pool.
    pub(crate) fn release(&mut self) {
        self.batch.clear();
    }

    /// Read one batch from the node and run the read hooks over it.
    ///
    /// Never completes once the node reported [`NodeError::Closed`]. Dropping
    /// the future is safe as long as the node's read is cancel safe.
    pub(crate) async fn read(&mut self) -> Result<SourceRead, NodeError> {
        if self.closed {
            return std::future::pending().await;
        }

        self.batch.clear();
        let Some(pool) = &self.pool else {
            return Err(NodeError::Other("source read before prepare".into()));
        };

        let allocated = pool.allocate_into(&mut self.batch, self.vectorize);
        if allocated == 0 {
            if !self.exhausted {
                warn!(node = %self.node.name(), "Source pool exhausted");
                self.exhausted = true;
            }
            tokio::task::yield_now().await;
            return Ok(SourceRead::default());
        }
        self.exhausted = false;

        if let Some(signals) = &self.signals {
            for smp in &mut self.batch {
                smp.signals = Some(Arc::clone(signals));
            }
        }

        let read = match self.node.read(&mut self.batch).await {
            Ok(read) => read.min(allocated),
            Err(NodeError::Closed) => {
                self.closed = true;
                self.batch.clear();
                return Err(NodeError::Closed);
            }
            Err(err) => {
                self.batch.clear();
                return Err(err);
            }
        };
        self.batch.truncate(read);

        let hooks = self.hooks.process(&mut self.batch);
        Ok(SourceRead { read, hooks })
    }
}
