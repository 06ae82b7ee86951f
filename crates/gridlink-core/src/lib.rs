//! # gridlink-core
//!
//! Path execution engine for the Gridlink sample gateway.
//!
//! This crate provides the building blocks every node type and the server
//! are made of:
//!
//! - **Sample** - Timestamped vectors of typed signal values
//! - **Pool** - Fixed-size, reference-counted sample allocation
//! - **Queue** - Bounded per-destination sample queues
//! - **Hooks** - Per-sample processing pipelines
//! - **Mapping** - Projection of source samples into a path's schema
//! - **Path** - Source → hooks → destination orchestration
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Source node │────▶│   Mapping   │────▶│    Hooks    │────▶│    Queue    │──▶ Destination node
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!        │                                       │                   ▲
//!        ▼                                       ▼                   │
//!   ┌─────────┐                            ┌─────────┐               │
//!   │  Pool   │                            │  Pool   │───── Sample ──┘
//!   └─────────┘                            └─────────┘   (shared by all queues)
//! ```

pub mod context;
pub mod error;
pub mod hooks;
pub mod mapping;
pub mod node;
pub mod path;
pub mod pool;
pub mod queue;
pub mod sample;
pub mod signal;
pub mod state;

pub use context::Context;
pub use error::{ConfigError, PathError};
pub use hooks::{Hook, HookConfig, HookContext, HookError, HookList, HookRegistry, Reason};
pub use mapping::{MappingEntry, MappingExpr, MappingList, MappingSpec};
pub use node::{Node, NodeDirection, NodeError, NodeLookup, NodeRef};
pub use path::{
    DestinationConfig, DestinationSpec, Path, PathConfig, PathHandle, PathMode, PathSnapshot, PathStats,
    ShutdownReport, WriterMode,
};
pub use pool::{Sample, SampleMut, SamplePool};
pub use queue::{OverflowPolicy, PushOutcome, SampleQueue};
pub use sample::{SampleData, SampleFlags};
pub use signal::{Complex, Signal, SignalData, SignalList, SignalType};
pub use state::{AtomicState, State};
