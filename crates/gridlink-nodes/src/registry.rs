//! Node configuration and the explicit registry of node types.

use gridlink_core::{NodeDirection, NodeRef};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::{LoopbackNode, SignalNode, SocketNode};

/// Errors while turning a [`NodeConfig`] into a node.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No node type of that name is registered.
    #[error("Unknown node type '{0}'")]
    UnknownType(String),

    /// Parameters do not match the node type.
    #[error("Invalid parameters for node '{node}': {source}")]
    Params {
        node: String,
        #[source]
        source: serde_json::Error,
    },

    /// Parameters are well formed but not usable.
    #[error("Invalid node '{node}': {reason}")]
    Invalid { node: String, reason: String },
}

/// Configuration of one node.
///
/// Everything besides `name`, `type`, `in` and `out` is handed to the node
/// type as its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node name, referenced by paths.
    pub name: String,
    /// Registered node type.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "in", default)]
    pub input: NodeDirection,
    #[serde(rename = "out", default)]
    pub output: NodeDirection,
    /// Type specific parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl NodeConfig {
    /// Configuration of a node with default directions and no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            input: NodeDirection::default(),
            output: NodeDirection::default(),
            params: Map::new(),
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Deserialize the parameters into a typed struct.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Params`] if the parameters do not match `T`.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, BuildError> {
        serde_json::from_value(Value::Object(self.params.clone())).map_err(|source| BuildError::Params {
            node: self.name.clone(),
            source,
        })
    }

    /// Shorthand for [`BuildError::Invalid`].
    pub(crate) fn invalid(&self, reason: impl Into<String>) -> BuildError {
        BuildError::Invalid {
            node: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Creates a node from its configuration.
pub type NodeFactory = fn(&NodeConfig) -> Result<NodeRef, BuildError>;

/// Registry entry describing one node type.
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    /// Type name used in configuration.
    pub name: &'static str,
    /// One line description.
    pub description: &'static str,
    /// Constructor.
    pub factory: NodeFactory,
}

fn loopback(config: &NodeConfig) -> Result<NodeRef, BuildError> {
    Ok(Arc::new(LoopbackNode::from_config(config)?))
}

fn signal(config: &NodeConfig) -> Result<NodeRef, BuildError> {
    Ok(Arc::new(SignalNode::from_config(config)?))
}

fn socket(config: &NodeConfig) -> Result<NodeRef, BuildError> {
    Ok(Arc::new(SocketNode::from_config(config)?))
}

/// Registry of the node types a process knows about.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    descriptors: Vec<NodeDescriptor>,
}

impl NodeRegistry {
    /// A registry without any node type.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    /// A registry holding every node type shipped with Gridlink.
    #[must_use]
    pub fn with_builtin_nodes() -> Self {
        Self {
            descriptors: vec![
                NodeDescriptor {
                    name: "loopback",
                    description: "Read back what was written, within the process",
                    factory: loopback,
                },
                NodeDescriptor {
                    name: "signal",
                    description: "Generate waveforms at a fixed rate",
                    factory: signal,
                },
                NodeDescriptor {
                    name: "socket",
                    description: "Exchange samples over UDP",
                    factory: socket,
                },
            ],
        }
    }

    /// Add a node type, replacing one of the same name.
    pub fn register(&mut self, descriptor: NodeDescriptor) {
        match self
            .descriptors
            .iter_mut()
            .find(|d| d.name == descriptor.name)
        {
            Some(existing) => *existing = descriptor,
            None => self.descriptors.push(descriptor),
        }
    }

    /// Find a node type by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&NodeDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// All registered node types, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.descriptors.iter()
    }

    /// Create a node.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] for unknown types and invalid parameters.
    pub fn build(&self, config: &NodeConfig) -> Result<NodeRef, BuildError> {
        let descriptor = self
            .lookup(&config.kind)
            .ok_or_else(|| BuildError::UnknownType(config.kind.clone()))?;
        (descriptor.factory)(config)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtin_nodes()
    }
}
