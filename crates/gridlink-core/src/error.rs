//! Error types of the path engine.
//!
//! Configuration problems are [`ConfigError`]s and are raised while a path
//! is parsed, checked or prepared, never while samples flow. Runtime I/O
//! failures are [`NodeError`](crate::node::NodeError)s; the engine logs and
//! counts them but keeps running.

use crate::hooks::HookError;
use crate::state::State;
use thiserror::Error;

/// Configuration errors, fatal for the path they belong to.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A mapping expression could not be parsed.
    #[error("Invalid mapping '{expr}': {reason}")]
    InvalidMapping { expr: String, reason: String },

    /// A mapping refers to a node that does not exist.
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// A mapping refers to a signal the source does not provide.
    #[error("Node '{node}' has no signal '{signal}'")]
    UnknownSignal { node: String, signal: String },

    /// A destination slot is not written by any mapping entry.
    #[error("Destination signal {index} ('{name}') is not mapped")]
    UnmappedSignal { index: usize, name: String },

    /// Mapping entries extend past the declared destination schema.
    #[error("Mapping needs {needed} destination signals but only {declared} are declared")]
    MappingOverflow { needed: usize, declared: usize },

    /// Hook type not present in the registry.
    #[error("Unknown hook type: {0}")]
    UnknownHook(String),

    /// Hook attached somewhere it does not support.
    #[error("Hook '{hook}' can not be used in {context} context")]
    HookContext { hook: String, context: &'static str },

    /// Hook rejected its parameters or its input signals.
    #[error("Hook '{hook}': {source}")]
    Hook {
        hook: String,
        #[source]
        source: HookError,
    },

    /// Path has no sources or no destinations.
    #[error("Path '{0}' needs at least one source and one destination")]
    EmptyPath(String),

    /// A node appears twice where it may appear once.
    #[error("Node '{0}' is used more than once")]
    DuplicateNode(String),

    /// Invalid numeric setting.
    #[error("Invalid setting '{name}': {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    /// Schema of a destination node does not match the path output.
    #[error("Node '{node}' expects {expected} signals but the path produces {actual}")]
    SchemaMismatch {
        node: String,
        expected: usize,
        actual: usize,
    },
}

/// Path lifecycle errors.
#[derive(Debug, Error)]
pub enum PathError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A resource could not be set up.
    #[error("Resource error: {0}")]
    Resource(String),

    /// Operation not allowed in the current state.
    #[error("Invalid state: expected {expected}, path is {actual}")]
    InvalidState { expected: State, actual: State },

    /// The path task failed.
    #[error("Path task failed: {0}")]
    Join(String),
}
