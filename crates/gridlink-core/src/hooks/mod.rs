//! Sample hooks: per-sample transformation and inspection steps.
//!
//! A hook is created from a [`HookConfig`] through the [`HookRegistry`],
//! owned by exactly one [`HookList`] and driven through its lifecycle:
//!
//! ```text
//! Initialized ─parse─▶ Parsed ─check─▶ Checked ─prepare─▶ Prepared ─start─▶ Started ─stop─▶ Stopped
//! ```
//!
//! While started, [`Hook::process`] is called for every sample in arrival
//! order and answers with a [`Reason`] that tells the list whether the
//! sample continues down the pipeline.

mod average;
mod cast;
mod decimate;
mod drop;
mod fix;
mod limit_rate;
mod list;
mod print;
mod registry;
mod restart;
mod scale;
mod shift;
mod skip_first;
mod stats;
mod ts;

pub use average::AverageHook;
pub use cast::CastHook;
pub use decimate::DecimateHook;
pub use drop::DropHook;
pub use fix::FixHook;
pub use limit_rate::{LimitRateHook, LimitRateMode};
pub use list::{HookList, ProcessSummary};
pub use print::PrintHook;
pub use registry::{HookDescriptor, HookFactory, HookRegistry};
pub use restart::RestartHook;
pub use scale::ScaleHook;
pub use shift::{ShiftSeqHook, ShiftTsHook, TimestampKind};
pub use skip_first::SkipFirstHook;
pub use stats::{RunningStats, StatsHook};
pub use ts::TsHook;

use crate::sample::SampleData;
use crate::signal::{SignalList, SignalType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use thiserror::Error;

/// Verdict of a hook for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Continue with the next hook, or emit the sample.
    Ok,
    /// Drop this sample silently and continue with the next one.
    SkipSample,
    /// Drop this sample and the rest of the batch.
    StopProcessing,
    /// Drop this sample and count it as a processing error.
    Error,
}

/// Errors raised by a hook while it is being configured.
#[derive(Debug, Error)]
pub enum HookError {
    /// Parameters did not deserialize.
    #[error("Invalid parameters: {0}")]
    Params(#[from] serde_json::Error),

    /// Parameters the hook does not take.
    #[error("Unexpected parameters: {0}")]
    UnexpectedParams(String),

    /// A parameter value is out of range.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParam { name: &'static str, reason: String },

    /// Referenced signal is not present in the input schema.
    #[error("Unknown signal: {0}")]
    UnknownSignal(String),

    /// Referenced signal has an unsupported type.
    #[error("Signal '{signal}' has unsupported type {actual}")]
    SignalType { signal: String, actual: SignalType },
}

/// Contexts a hook can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HookFlags(u8);

impl HookFlags {
    /// Read direction of a node.
    pub const NODE_READ: Self = Self(1 << 0);
    /// Write direction of a node.
    pub const NODE_WRITE: Self = Self(1 << 1);
    /// Path pipeline.
    pub const PATH: Self = Self(1 << 2);
    /// Added automatically when the context enables builtin hooks.
    pub const BUILTIN: Self = Self(1 << 3);
    /// Every context.
    pub const ALL_CONTEXTS: Self = Self::NODE_READ.union(Self::NODE_WRITE).union(Self::PATH);

    /// Flags set in either operand.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether all flags in `other` are set.
    #[must_use]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for HookFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Where a hook list runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookContext {
    /// Samples read from a node, before mapping.
    NodeRead,
    /// Samples about to be written to a node.
    NodeWrite,
    /// Multiplexed samples of a path.
    Path,
}

impl HookContext {
    /// The registry flag that allows a hook in this context.
    #[must_use]
    pub fn flag(&self) -> HookFlags {
        match self {
            HookContext::NodeRead => HookFlags::NODE_READ,
            HookContext::NodeWrite => HookFlags::NODE_WRITE,
            HookContext::Path => HookFlags::PATH,
        }
    }

    /// Context name for messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HookContext::NodeRead => "node-read",
            HookContext::NodeWrite => "node-write",
            HookContext::Path => "path",
        }
    }
}

impl fmt::Display for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// Configuration of one hook.
///
/// Everything besides `type`, `enabled` and `priority` is handed to the
/// hook as its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    /// Registered hook type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Disabled hooks are not instantiated.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides the type's default priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Type specific parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl HookConfig {
    /// Configuration of a hook type with default settings.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            enabled: true,
            priority: None,
            params: Map::new(),
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Override the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// A reference to a signal by position or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalRef {
    /// Position in the list.
    Index(usize),
    /// Signal name.
    Name(String),
}

impl SignalRef {
    /// Resolve against a schema.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::UnknownSignal`] if the signal does not exist.
    pub fn resolve(&self, signals: &SignalList) -> Result<usize, HookError> {
        match self {
            SignalRef::Index(index) if *index < signals.len() => Ok(*index),
            SignalRef::Index(index) => Err(HookError::UnknownSignal(index.to_string())),
            SignalRef::Name(name) => signals
                .resolve(name)
                .ok_or_else(|| HookError::UnknownSignal(name.clone())),
        }
    }
}

/// Deserialize hook parameters into a typed struct.
///
/// # Errors
///
/// Returns [`HookError::Params`] if the parameters do not match `T`.
pub fn parse_params<T: DeserializeOwned>(params: &Map<String, Value>) -> Result<T, HookError> {
    Ok(serde_json::from_value(Value::Object(params.clone()))?)
}

/// Common capability interface of all hooks.
///
/// Only [`process`](Hook::process) is mandatory. Configuration callbacks run
/// once, before any sample flows; `start`/`stop` bracket the active window
/// and reset transient state.
pub trait Hook: Send {
    /// Take the type specific parameters.
    ///
    /// # Errors
    ///
    /// The default rejects any parameter.
    fn parse(&mut self, params: &Map<String, Value>) -> Result<(), HookError> {
        if params.is_empty() {
            Ok(())
        } else {
            let keys: Vec<&str> = params.keys().map(String::as_str).collect();
            Err(HookError::UnexpectedParams(keys.join(", ")))
        }
    }

    /// Validate parameters that depend on each other.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are inconsistent.
    fn check(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Resolve signal references against the input schema and return the
    /// output schema.
    ///
    /// # Errors
    ///
    /// Returns an error if required signals are missing or mistyped.
    fn prepare(&mut self, signals: Arc<SignalList>) -> Result<Arc<SignalList>, HookError> {
        Ok(signals)
    }

    /// Reset transient state before samples flow.
    fn start(&mut self) {}

    /// Release transient state after samples stopped flowing.
    fn stop(&mut self) {}

    /// Called on the engine's statistics interval.
    fn periodic(&mut self) {}

    /// Inspect or modify one sample.
    fn process(&mut self, smp: &mut SampleData) -> Reason;
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::sample::{SampleData, SampleFlags};

    pub fn sample(sequence: u64) -> SampleData {
        let mut smp = SampleData::with_capacity(8);
        smp.sequence = sequence;
        smp.flags = SampleFlags::HAS_SEQUENCE;
        smp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_config_from_toml() {
        let config: HookConfig = toml::from_str(
            r#"
            type = "decimate"
            priority = 5
            ratio = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.kind, "decimate");
        assert!(config.enabled);
        assert_eq!(config.priority, Some(5));
        assert_eq!(config.params.get("ratio"), Some(&Value::from(3)));
    }

    #[test]
    fn test_signal_ref() {
        let signals = SignalList::generic(3);
        assert_eq!(SignalRef::Index(2).resolve(&signals).unwrap(), 2);
        assert_eq!(SignalRef::Name("signal1".into()).resolve(&signals).unwrap(), 1);
        assert!(SignalRef::Index(3).resolve(&signals).is_err());
        assert!(SignalRef::Name("x".into()).resolve(&signals).is_err());
    }

    #[test]
    fn test_flags() {
        let flags = HookFlags::NODE_READ | HookFlags::PATH;
        assert!(flags.contains(HookContext::Path.flag()));
        assert!(!flags.contains(HookContext::NodeWrite.flag()));
        assert!(HookFlags::ALL_CONTEXTS.contains(flags));
    }
}
