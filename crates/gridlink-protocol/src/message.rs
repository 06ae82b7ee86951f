//! Fixed-layout binary messages.
//!
//! Every message is a 16-byte header followed by `length` 32-bit values.
//! All fields are big-endian:
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-------+---+---+---------------+-------------------------------+
//! |  ver  |typ|rsv|    source     |            length             |
//! +-------+---+---+---------------+-------------------------------+
//! |                           sequence                            |
//! +---------------------------------------------------------------+
//! |                         timestamp sec                         |
//! +---------------------------------------------------------------+
//! |                        timestamp nsec                         |
//! +---------------------------------------------------------------+
//! |                      value 0 (f32 or i32)                     |
//! |                              ...                              |
//! ```
//!
//! Values are carried as raw words. Whether a word is a float or an
//! integer is part of the peers' shared schema, not of the message.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Header version written and accepted by this implementation.
pub const MESSAGE_VERSION: u8 = 2;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Size of one value in bytes.
pub const VALUE_SIZE: usize = 4;

/// Message type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Regular sample data.
    Data = 0,
    /// The sender starts a new stream.
    Start = 1,
    /// The sender stops.
    Stop = 2,
}

impl From<MessageType> for u8 {
    fn from(ty: MessageType) -> u8 {
        ty as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Data),
            1 => Ok(MessageType::Start),
            2 => Ok(MessageType::Stop),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

/// One binary message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    /// Identifies the sending node.
    pub source: u8,
    pub sequence: u32,
    pub ts_sec: u32,
    pub ts_nsec: u32,
    /// Raw big-endian value words.
    pub values: Vec<u32>,
}

impl Message {
    /// An empty data message.
    #[must_use]
    pub fn data(source: u8, sequence: u32) -> Self {
        Self {
            kind: MessageType::Data,
            source,
            sequence,
            ts_sec: 0,
            ts_nsec: 0,
            values: Vec::new(),
        }
    }

    /// Set the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, sec: u32, nsec: u32) -> Self {
        self.ts_sec = sec;
        self.ts_nsec = nsec;
        self
    }

    /// Append a float value.
    pub fn push_f32(&mut self, value: f32) {
        self.values.push(value.to_bits());
    }

    /// Append an integer value.
    pub fn push_i32(&mut self, value: i32) {
        self.values.push(u32::from_ne_bytes(value.to_ne_bytes()));
    }

    /// Value `index` read as a float.
    #[must_use]
    pub fn f32_at(&self, index: usize) -> Option<f32> {
        self.values.get(index).map(|w| f32::from_bits(*w))
    }

    /// Value `index` read as an integer.
    #[must_use]
    pub fn i32_at(&self, index: usize) -> Option<i32> {
        self.values
            .get(index)
            .map(|w| i32::from_ne_bytes(w.to_ne_bytes()))
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.values.len() * VALUE_SIZE
    }

    /// Append the encoded message to `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TooManyValues`] if the value count does not
    /// fit the 16-bit length field.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let length = u16::try_from(self.values.len())
            .map_err(|_| ProtocolError::TooManyValues(self.values.len()))?;

        buf.reserve(self.encoded_len());
        buf.put_u8((MESSAGE_VERSION << 4) | (u8::from(self.kind) << 2));
        buf.put_u8(self.source);
        buf.put_u16(length);
        buf.put_u32(self.sequence);
        buf.put_u32(self.ts_sec);
        buf.put_u32(self.ts_nsec);
        for word in &self.values {
            buf.put_u32(*word);
        }
        Ok(())
    }

    /// Encode into a new buffer.
    ///
    /// # Errors
    ///
    /// See [`encode_into`](Self::encode_into).
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode the message at the front of `data`. Returns the message and
    /// the number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// Returns an error for truncated input, a foreign version or an
    /// unknown type.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), ProtocolError> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::Incomplete(HEADER_SIZE - data.len()));
        }

        let mut header = &data[..HEADER_SIZE];
        let first = header.get_u8();
        let version = first >> 4;
        if version != MESSAGE_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        let kind = MessageType::try_from((first >> 2) & 0x03)?;
        let source = header.get_u8();
        let length = header.get_u16() as usize;
        let sequence = header.get_u32();
        let ts_sec = header.get_u32();
        let ts_nsec = header.get_u32();

        let total = HEADER_SIZE + length * VALUE_SIZE;
        if data.len() < total {
            return Err(ProtocolError::Incomplete(total - data.len()));
        }

        let mut body = &data[HEADER_SIZE..total];
        let values = (0..length).map(|_| body.get_u32()).collect();

        Ok((
            Self {
                kind,
                source,
                sequence,
                ts_sec,
                ts_nsec,
                values,
            },
            total,
        ))
    }

    /// Decode every message in a datagram.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed message.
    pub fn decode_all(mut data: &[u8]) -> Result<Vec<Self>, ProtocolError> {
        let mut messages = Vec::new();
        while !data.is_empty() {
            let (msg, used) = Self::decode(data)?;
            messages.push(msg);
            data = &data[used..];
        }
        Ok(messages)
    }
}
