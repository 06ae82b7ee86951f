//! MessagePack sample frames with length-prefixed framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Maximum frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// One typed value of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    /// Real and imaginary part.
    Complex([f32; 2]),
}

/// A sample as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleFrame {
    pub sequence: u64,
    /// Origin timestamp as seconds and nanoseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts_origin: Option<(u64, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts_received: Option<(u64, u32)>,
    /// Raw sample flags.
    #[serde(default)]
    pub flags: u32,
    pub values: Vec<FrameValue>,
}

impl SampleFrame {
    /// A frame without timestamps or flags.
    #[must_use]
    pub fn new(sequence: u64, values: Vec<FrameValue>) -> Self {
        Self {
            sequence,
            ts_origin: None,
            ts_received: None,
            flags: 0,
            values,
        }
    }
}

/// Encode a frame to bytes.
///
/// The encoded format is:
/// - 4 bytes: Big-endian length prefix
/// - N bytes: MessagePack-encoded frame
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &SampleFrame) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a frame into an existing buffer.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode_into(frame: &SampleFrame, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let payload = rmp_serde::to_vec_named(frame)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    buf.reserve(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);

    Ok(())
}

/// Decode a frame from bytes.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode(data: &[u8]) -> Result<SampleFrame, ProtocolError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if data.len() < total_size {
        return Err(ProtocolError::Incomplete(total_size - data.len()));
    }

    let frame = rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?;
    Ok(frame)
}

/// Try to decode a frame from a buffer, advancing it if successful.
///
/// Returns `Ok(Some(frame))` if a complete frame was decoded,
/// `Ok(None)` if more data is needed, or `Err` on protocol error.
///
/// # Errors
///
/// Returns an error if the frame is too large or invalid.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<SampleFrame>, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if buf.len() < total_size {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(length);
    let frame = rmp_serde::from_slice(&payload)?;

    Ok(Some(frame))
}

/// Codec for batches of frames in one datagram.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buf: BytesMut,
}

impl FrameCodec {
    /// Create a new codec instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode frames back to back into one buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding any frame fails.
    pub fn encode_batch<'a>(
        &mut self,
        frames: impl IntoIterator<Item = &'a SampleFrame>,
    ) -> Result<Bytes, ProtocolError> {
        self.buf.clear();
        for frame in frames {
            encode_into(frame, &mut self.buf)?;
        }
        Ok(self.buf.split().freeze())
    }

    /// Decode all frames in `data`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid or truncated frames.
    pub fn decode_batch(&mut self, data: &[u8]) -> Result<Vec<SampleFrame>, ProtocolError> {
        self.buf.clear();
        self.buf.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = decode_from(&mut self.buf)? {
            frames.push(frame);
        }
        if !self.buf.is_empty() {
            let left = self.buf.len();
            self.buf.clear();
            return Err(ProtocolError::Invalid(format!("{left} trailing bytes")));
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> SampleFrame {
        SampleFrame {
            sequence,
            ts_origin: Some((1_700_000_000, 5)),
            ts_received: None,
            flags: 0b1011,
            values: vec![
                FrameValue::Float(1.25),
                FrameValue::Integer(-3),
                FrameValue::Boolean(true),
                FrameValue::Complex([0.5, -0.5]),
            ],
        }
    }

    #[test]
    fn test_value_types_survive() {
        let original = frame(u64::MAX);
        let decoded = decode(&encode(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_incomplete() {
        let encoded = encode(&frame(1)).unwrap();

        match decode(&encoded[..5]) {
            Err(ProtocolError::Incomplete(_)) => {}
            other => panic!("Expected Incomplete error, got {:?}", other),
        }
    }

    #[test]
    fn test_length_prefix_too_large() {
        let mut data = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes().to_vec();
        data.extend_from_slice(&[0; 8]);

        match decode(&data) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_batch() {
        let frames = vec![frame(1), frame(2), frame(3)];
        let mut codec = FrameCodec::new();

        let encoded = codec.encode_batch(&frames).unwrap();
        assert_eq!(codec.decode_batch(&encoded).unwrap(), frames);

        let truncated = &encoded[..encoded.len() - 1];
        assert!(matches!(
            codec.decode_batch(truncated),
            Err(ProtocolError::Invalid(_))
        ));
    }
}
