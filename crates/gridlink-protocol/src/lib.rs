//! # gridlink-protocol
//!
//! Wire formats used by Gridlink socket nodes.
//!
//! Two encodings are provided:
//!
//! - **Binary messages** - a fixed 16-byte big-endian header followed by
//!   32-bit values, compatible with simple C and FPGA peers
//! - **Sample frames** - length-prefixed MessagePack with full 64-bit
//!   sequence numbers, timestamps, flags and typed values
//!
//! ## Example
//!
//! ```rust
//! use gridlink_protocol::{frame, Message, SampleFrame, FrameValue};
//!
//! let mut msg = Message::data(7, 42);
//! msg.push_f32(1.5);
//! let bytes = msg.to_bytes().unwrap();
//! assert_eq!(Message::decode(&bytes).unwrap().0, msg);
//!
//! let smp = SampleFrame::new(42, vec![FrameValue::Float(1.5), FrameValue::Boolean(true)]);
//! let encoded = frame::encode(&smp).unwrap();
//! assert_eq!(frame::decode(&encoded).unwrap(), smp);
//! ```

pub mod error;
pub mod frame;
pub mod message;

pub use error::ProtocolError;
pub use frame::{FrameCodec, FrameValue, SampleFrame};
pub use message::{Message, MessageType, HEADER_SIZE, MESSAGE_VERSION};
