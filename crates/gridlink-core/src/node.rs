//! Node contract consumed by the path engine.
//!
//! Nodes are transport endpoints. The engine only needs to read batches of
//! samples from them, write batches to them and know the schema and hooks of
//! each direction. Concrete nodes live outside this crate.

use crate::hooks::HookConfig;
use crate::pool::{Sample, SampleMut};
use crate::signal::SignalList;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;
use thiserror::Error;

#[cfg(unix)]
pub use std::os::fd::RawFd;
/// Raw descriptor type on platforms without `std::os::fd`.
#[cfg(not(unix))]
pub type RawFd = i32;

/// Shared handle to a node.
pub type NodeRef = Arc<dyn Node>;

/// Transient node errors. The engine logs and counts them and carries on.
#[derive(Debug, Error)]
pub enum NodeError {
    /// I/O error of the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The node was stopped or its peer went away.
    #[error("Node closed")]
    Closed,

    /// A message could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

fn default_vectorize() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Settings of one direction (input or output) of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDirection {
    /// Schema of the values flowing in this direction.
    #[serde(default)]
    pub signals: SignalList,

    /// Hooks applied to samples in this direction.
    #[serde(default)]
    pub hooks: Vec<HookConfig>,

    /// Maximum number of samples per read or write call.
    #[serde(default = "default_vectorize")]
    pub vectorize: usize,

    /// Add the builtin hooks of this direction.
    #[serde(default = "default_true")]
    pub builtin: bool,

    /// Whether this direction is used at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for NodeDirection {
    fn default() -> Self {
        Self {
            signals: SignalList::default(),
            hooks: Vec::new(),
            vectorize: default_vectorize(),
            builtin: true,
            enabled: true,
        }
    }
}

impl NodeDirection {
    /// A direction carrying `signals`.
    #[must_use]
    pub fn with_signals(signals: SignalList) -> Self {
        Self {
            signals,
            ..Self::default()
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn vectorize(mut self, vectorize: usize) -> Self {
        self.vectorize = vectorize.max(1);
        self
    }

    /// Add a hook.
    #[must_use]
    pub fn hook(mut self, hook: HookConfig) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Enable or disable builtin hooks.
    #[must_use]
    pub fn builtin(mut self, builtin: bool) -> Self {
        self.builtin = builtin;
        self
    }
}

/// A transport endpoint.
///
/// All methods take `&self`: a node is shared between the path reading from
/// it and the paths writing to it, and synchronizes internally.
#[async_trait]
pub trait Node: Send + Sync + 'static {
    /// Unique name of this node.
    fn name(&self) -> &str;

    /// Node type, e.g. `"socket"`.
    fn kind(&self) -> &str;

    /// Settings of the read direction.
    fn input(&self) -> &NodeDirection;

    /// Settings of the write direction.
    fn output(&self) -> &NodeDirection;

    /// Open resources.
    async fn start(&self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Release resources. Pending reads return [`NodeError::Closed`].
    async fn stop(&self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Resolve once the node can exchange samples (e.g. a peer connected).
    async fn ready(&self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Fill the front of `smps` with received samples and return how many.
    ///
    /// The slots are empty samples with capacity for the input schema. The
    /// call may wait for data. It must be cancel safe: if the returned
    /// future is dropped before completion, no received data is lost.
    async fn read(&self, smps: &mut [SampleMut]) -> Result<usize, NodeError>;

    /// Send samples and return how many were accepted, in order from the
    /// front. Accepting fewer than offered is not an error.
    async fn write(&self, smps: &[Sample]) -> Result<usize, NodeError>;

    /// Descriptors signalling readiness for reading, if the node has any.
    fn poll_fds(&self) -> Vec<RawFd> {
        Vec::new()
    }
}

/// Lookup of nodes by name, used while paths are prepared.
pub trait NodeLookup {
    /// The node called `name`.
    fn node(&self, name: &str) -> Option<NodeRef>;
}

impl<S: BuildHasher> NodeLookup for HashMap<String, NodeRef, S> {
    fn node(&self, name: &str) -> Option<NodeRef> {
        self.get(name).cloned()
    }
}

impl NodeLookup for [NodeRef] {
    fn node(&self, name: &str) -> Option<NodeRef> {
        self.iter().find(|n| n.name() == name).cloned()
    }
}

impl NodeLookup for Vec<NodeRef> {
    fn node(&self, name: &str) -> Option<NodeRef> {
        self.as_slice().node(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalType;

    #[test]
    fn test_direction_from_toml() {
        let direction: NodeDirection = toml::from_str(
            r#"
            vectorize = 8
            builtin = false
            signals = [{ name = "v", type = "float" }, { name = "tap", type = "integer" }]
            hooks = [{ type = "decimate", ratio = 2 }]
            "#,
        )
        .unwrap();

        assert_eq!(direction.vectorize, 8);
        assert!(!direction.builtin);
        assert!(direction.enabled);
        assert_eq!(direction.signals.get(1).unwrap().signal_type, SignalType::Integer);
        assert_eq!(direction.hooks[0].kind, "decimate");
    }

    #[test]
    fn test_direction_defaults() {
        let direction: NodeDirection = toml::from_str("").unwrap();
        assert_eq!(direction, NodeDirection::default());
        assert!(toml::from_str::<NodeDirection>("vectorise = 2").is_err());
    }
}
