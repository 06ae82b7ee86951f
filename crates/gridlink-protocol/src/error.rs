//! Protocol errors.

use thiserror::Error;

use crate::frame::MAX_FRAME_SIZE;

/// Errors that can occur during encoding and decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Not enough data to decode.
    #[error("Incomplete data: need {0} more bytes")]
    Incomplete(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Binary message with a version other than ours.
    #[error("Unsupported message version {0}")]
    UnsupportedVersion(u8),

    /// Binary message with an unknown type.
    #[error("Unknown message type {0}")]
    UnknownType(u8),

    /// A message carries more values than the length field can express.
    #[error("Message with {0} values exceeds the maximum of {max}", max = u16::MAX)]
    TooManyValues(usize),

    /// Invalid data.
    #[error("Invalid data: {0}")]
    Invalid(String),
}
