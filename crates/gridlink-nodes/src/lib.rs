//! # gridlink-nodes
//!
//! Node types for the Gridlink gateway.
//!
//! All nodes implement [`gridlink_core::Node`], so paths treat them alike:
//!
//! - **Loopback** - In-process node; what is written can be read back
//! - **Signal** - Waveform generator for tests and demos
//! - **Socket** - UDP socket speaking the binary or MessagePack format
//!
//! Nodes are created from configuration through a [`NodeRegistry`]:
//!
//! ```rust
//! use gridlink_nodes::{NodeConfig, NodeRegistry};
//!
//! let config: NodeConfig = toml::from_str(r#"
//!     name = "gen"
//!     type = "signal"
//!     signal = "sine"
//!     rate = 10.0
//! "#).unwrap();
//!
//! let node = NodeRegistry::with_builtin_nodes().build(&config).unwrap();
//! assert_eq!(node.kind(), "signal");
//! ```

pub mod format;
pub mod loopback;
pub mod registry;
pub mod signal;
pub mod socket;

pub use format::Format;
pub use loopback::LoopbackNode;
pub use registry::{BuildError, NodeConfig, NodeDescriptor, NodeRegistry};
pub use signal::{SignalNode, Waveform};
pub use socket::SocketNode;
