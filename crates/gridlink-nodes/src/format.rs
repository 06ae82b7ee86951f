//! Conversion between samples and the wire formats of `gridlink-protocol`.

use bytes::BytesMut;
use gridlink_core::sample::{from_timespec, timespec};
use gridlink_core::{
    Complex, NodeError, Sample, SampleData, SampleFlags, SampleMut, SignalData, SignalList, SignalType,
};
use gridlink_protocol::{frame, FrameCodec, FrameValue, Message, ProtocolError, SampleFrame};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Wire format of a socket node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// Fixed 16-byte header with 32-bit big-endian values.
    #[default]
    Binary,
    /// Length-prefixed MessagePack frames.
    Msgpack,
}

fn codec_error(err: ProtocolError) -> NodeError {
    NodeError::Codec(err.to_string())
}

fn timestamp(sec: u64, nsec: u32) -> Result<SystemTime, NodeError> {
    from_timespec(sec, nsec).ok_or_else(|| NodeError::Codec(format!("timestamp {sec}.{nsec:09} out of range")))
}

/// Encoder and decoder state of one node.
#[derive(Debug, Default)]
pub struct Codec {
    format: Format,
    source_id: u8,
    frames: FrameCodec,
}

impl Codec {
    #[must_use]
    pub fn new(format: Format, source_id: u8) -> Self {
        Self {
            format,
            source_id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Encode as many samples from the front of `smps` as fit into `limit`
    /// bytes. Returns the number encoded, which is at least one.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Codec`] if the first sample cannot be encoded
    /// or does not fit on its own.
    pub fn encode(&mut self, smps: &[Sample], buf: &mut BytesMut, limit: usize) -> Result<usize, NodeError> {
        buf.clear();
        for (count, smp) in smps.iter().enumerate() {
            let mark = buf.len();
            let encoded = match self.format {
                Format::Binary => to_message(smp, self.source_id).encode_into(buf),
                Format::Msgpack => frame::encode_into(&to_frame(smp), buf),
            };

            let error = match encoded {
                Ok(()) if buf.len() <= limit => continue,
                Ok(()) => NodeError::Codec(format!(
                    "sample of {} bytes exceeds the {limit} byte limit",
                    buf.len() - mark
                )),
                Err(err) => codec_error(err),
            };
            buf.truncate(mark);
            return if count == 0 { Err(error) } else { Ok(count) };
        }
        Ok(smps.len())
    }

    /// Decode a datagram into the front of `smps`. Returns the number of
    /// samples filled; messages beyond `smps.len()` are discarded.
    ///
    /// `signals` gives the types of binary values; without it every value
    /// is read as a float.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Codec`] for malformed data, including
    /// timestamps this platform cannot represent.
    pub fn decode(
        &mut self,
        data: &[u8],
        signals: Option<&SignalList>,
        smps: &mut [SampleMut],
    ) -> Result<usize, NodeError> {
        let received = SystemTime::now();
        let filled = match self.format {
            Format::Binary => {
                let messages = Message::decode_all(data).map_err(codec_error)?;
                for (msg, smp) in messages.iter().zip(smps.iter_mut()) {
                    from_message(msg, signals, smp)?;
                }
                messages.len().min(smps.len())
            }
            Format::Msgpack => {
                let frames = self.frames.decode_batch(data).map_err(codec_error)?;
                for (frame, smp) in frames.iter().zip(smps.iter_mut()) {
                    from_frame(frame, smp)?;
                }
                frames.len().min(smps.len())
            }
        };

        for smp in &mut smps[..filled] {
            smp.ts_received = received;
            smp.flags.insert(SampleFlags::HAS_TS_RECEIVED);
        }
        Ok(filled)
    }
}

fn to_message(smp: &SampleData, source_id: u8) -> Message {
    let (sec, nsec) = timespec(smp.ts_origin);
    let mut msg = Message::data(source_id, smp.sequence as u32).with_timestamp(sec as u32, nsec);
    for value in smp.values() {
        match *value {
            SignalData::Float(f) => msg.push_f32(f as f32),
            SignalData::Integer(i) => msg.push_i32(i as i32),
            SignalData::Boolean(b) => msg.push_i32(i32::from(b)),
            SignalData::Complex(z) => {
                msg.push_f32(z.re);
                msg.push_f32(z.im);
            }
        }
    }
    msg
}

fn from_message(msg: &Message, signals: Option<&SignalList>, smp: &mut SampleData) -> Result<(), NodeError> {
    smp.sequence = u64::from(msg.sequence);
    smp.ts_origin = timestamp(u64::from(msg.ts_sec), msg.ts_nsec)?;
    smp.flags = SampleFlags::HAS_SEQUENCE | SampleFlags::HAS_TS_ORIGIN;
    smp.clear_values();

    let mut words = 0..msg.values.len();
    for slot in 0.. {
        let ty = match signals {
            Some(signals) => match signals.get(slot) {
                Some(signal) => signal.signal_type,
                None => break,
            },
            None => SignalType::Float,
        };
        let Some(word) = words.next() else {
            break;
        };
        let value = match ty {
            SignalType::Float => SignalData::Float(f64::from(msg.f32_at(word).unwrap_or_default())),
            SignalType::Integer => SignalData::Integer(i64::from(msg.i32_at(word).unwrap_or_default())),
            SignalType::Boolean => SignalData::Boolean(msg.i32_at(word).unwrap_or_default() != 0),
            SignalType::Complex => {
                let re = msg.f32_at(word).unwrap_or_default();
                let im = words.next().and_then(|w| msg.f32_at(w)).unwrap_or_default();
                SignalData::Complex(Complex::new(re, im))
            }
        };
        if !smp.push(value) {
            break;
        }
    }
    Ok(())
}

fn to_frame(smp: &SampleData) -> SampleFrame {
    SampleFrame {
        sequence: smp.sequence,
        ts_origin: smp
            .flags
            .contains(SampleFlags::HAS_TS_ORIGIN)
            .then(|| timespec(smp.ts_origin)),
        ts_received: smp
            .flags
            .contains(SampleFlags::HAS_TS_RECEIVED)
            .then(|| timespec(smp.ts_received)),
        flags: smp.flags.bits(),
        values: smp
            .values()
            .iter()
            .map(|v| match *v {
                SignalData::Boolean(b) => FrameValue::Boolean(b),
                SignalData::Integer(i) => FrameValue::Integer(i),
                SignalData::Float(f) => FrameValue::Float(f),
                SignalData::Complex(z) => FrameValue::Complex([z.re, z.im]),
            })
            .collect(),
    }
}

fn from_frame(frame: &SampleFrame, smp: &mut SampleData) -> Result<(), NodeError> {
    smp.sequence = frame.sequence;
    smp.flags = SampleFlags::from_bits_truncate(frame.flags);
    smp.flags.insert(SampleFlags::HAS_SEQUENCE);

    // The receiver decides about these two
    smp.flags.remove(SampleFlags::IS_FIRST | SampleFlags::IS_REORDERED);

    match frame.ts_origin {
        Some((sec, nsec)) => {
            smp.ts_origin = timestamp(sec, nsec)?;
            smp.flags.insert(SampleFlags::HAS_TS_ORIGIN);
        }
        None => smp.flags.remove(SampleFlags::HAS_TS_ORIGIN),
    }

    smp.clear_values();
    for value in &frame.values {
        let value = match *value {
            FrameValue::Boolean(b) => SignalData::Boolean(b),
            FrameValue::Integer(i) => SignalData::Integer(i),
            FrameValue::Float(f) => SignalData::Float(f),
            FrameValue::Complex([re, im]) => SignalData::Complex(Complex::new(re, im)),
        };
        if !smp.push(value) {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_core::{Signal, SamplePool};
    use gridlink_protocol::HEADER_SIZE;

    fn sample(pool: &SamplePool, seq: u64, values: &[SignalData]) -> Sample {
        let mut smp = pool.allocate().unwrap();
        smp.sequence = seq;
        smp.ts_origin = from_timespec(1_700_000_000, 250).unwrap();
        smp.flags = SampleFlags::HAS_SEQUENCE | SampleFlags::HAS_TS_ORIGIN;
        smp.set_values(values);
        smp.freeze()
    }

    fn exchange(format: Format, signals: Option<&SignalList>, values: &[SignalData]) -> Vec<SignalData> {
        let pool = SamplePool::new(4, 8);
        let out = [sample(&pool, 7, values), sample(&pool, 8, values)];

        let mut codec = Codec::new(format, 3);
        let mut buf = BytesMut::new();
        assert_eq!(codec.encode(&out, &mut buf, usize::MAX).unwrap(), out.len());

        let mut slots = Vec::new();
        pool.allocate_into(&mut slots, 2);
        assert_eq!(codec.decode(&buf, signals, &mut slots).unwrap(), 2);

        assert_eq!(slots[1].sequence, 8);
        assert_eq!(timespec(slots[0].ts_origin), (1_700_000_000, 250));
        assert!(slots[0]
            .flags
            .contains(SampleFlags::HAS_SEQUENCE | SampleFlags::HAS_TS_ORIGIN | SampleFlags::HAS_TS_RECEIVED));
        slots[0].values().to_vec()
    }

    #[test]
    fn test_binary_uses_schema_types() {
        let signals: SignalList = vec![
            Signal::new("f", SignalType::Float),
            Signal::new("i", SignalType::Integer),
            Signal::new("b", SignalType::Boolean),
            Signal::new("z", SignalType::Complex),
        ]
        .into_iter()
        .collect();
        let values = [
            SignalData::Float(0.5),
            SignalData::Integer(-7),
            SignalData::Boolean(true),
            SignalData::Complex(Complex::new(1.0, -1.0)),
        ];

        assert_eq!(exchange(Format::Binary, Some(&signals), &values), values.to_vec());
    }

    #[test]
    fn test_binary_without_schema_reads_floats() {
        let values = [SignalData::Float(1.5), SignalData::Float(-2.0)];
        assert_eq!(exchange(Format::Binary, None, &values), values.to_vec());
    }

    #[test]
    fn test_msgpack_keeps_types() {
        let values = [
            SignalData::Float(0.1),
            SignalData::Integer(i64::MAX),
            SignalData::Boolean(false),
        ];
        assert_eq!(exchange(Format::Msgpack, None, &values), values.to_vec());
    }

    #[test]
    fn test_extra_messages_are_discarded() {
        let pool = SamplePool::new(4, 1);
        let out = [
            sample(&pool, 1, &[SignalData::Float(1.0)]),
            sample(&pool, 2, &[SignalData::Float(2.0)]),
        ];
        let mut codec = Codec::new(Format::Binary, 0);
        let mut buf = BytesMut::new();
        assert_eq!(codec.encode(&out, &mut buf, usize::MAX).unwrap(), out.len());

        let mut slots = Vec::new();
        pool.allocate_into(&mut slots, 1);
        assert_eq!(codec.decode(&buf, None, &mut slots).unwrap(), 1);
        assert_eq!(slots[0].sequence, 1);
    }

    #[test]
    fn test_malformed_datagram() {
        let pool = SamplePool::new(1, 1);
        let mut slots = Vec::new();
        pool.allocate_into(&mut slots, 1);

        let mut codec = Codec::new(Format::Binary, 0);
        assert!(matches!(
            codec.decode(&[0x20, 0, 0], None, &mut slots),
            Err(NodeError::Codec(_))
        ));
    }

    #[test]
    fn test_timestamp_out_of_range() {
        let pool = SamplePool::new(2, 1);
        let mut slots = Vec::new();
        pool.allocate_into(&mut slots, 2);

        let frames = [
            SampleFrame {
                ts_origin: Some((1, 0)),
                ..SampleFrame::new(1, vec![FrameValue::Float(1.0)])
            },
            SampleFrame {
                ts_origin: Some((u64::MAX, 0)),
                ..SampleFrame::new(2, vec![FrameValue::Float(2.0)])
            },
        ];
        let data = FrameCodec::new().encode_batch(&frames).unwrap();

        let mut codec = Codec::new(Format::Msgpack, 0);
        assert!(matches!(
            codec.decode(&data, None, &mut slots),
            Err(NodeError::Codec(_))
        ));
    }

    #[test]
    fn test_binary_nanoseconds_carry() {
        let pool = SamplePool::new(1, 1);
        let mut slots = Vec::new();
        pool.allocate_into(&mut slots, 1);

        let mut buf = BytesMut::new();
        Message::data(0, 5)
            .with_timestamp(u32::MAX, u32::MAX)
            .encode_into(&mut buf)
            .unwrap();

        let mut codec = Codec::new(Format::Binary, 0);
        assert_eq!(codec.decode(&buf, None, &mut slots).unwrap(), 1);
        assert_eq!(
            timespec(slots[0].ts_origin),
            (u64::from(u32::MAX) + 4, 294_967_295)
        );
    }

    #[test]
    fn test_encode_stops_at_limit() {
        let pool = SamplePool::new(4, 4);
        let values = [SignalData::Float(1.0); 4];
        let out: Vec<Sample> = (0..3).map(|seq| sample(&pool, seq, &values)).collect();
        let one = HEADER_SIZE + 4 * 4;

        let mut codec = Codec::new(Format::Binary, 0);
        let mut buf = BytesMut::new();
        assert_eq!(codec.encode(&out, &mut buf, 2 * one + 1).unwrap(), 2);
        assert_eq!(buf.len(), 2 * one);

        assert!(matches!(
            codec.encode(&out, &mut buf, one - 1),
            Err(NodeError::Codec(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_reuses_slots() {
        let pool = SamplePool::new(4, 3);
        let long = [sample(&pool, 1, &[SignalData::Float(1.0); 3])];
        let short = [sample(&pool, 2, &[SignalData::Integer(4)])];

        let mut codec = Codec::new(Format::Msgpack, 0);
        let mut slots = Vec::new();
        pool.allocate_into(&mut slots, 1);
        let mut buf = BytesMut::new();

        codec.encode(&long, &mut buf, usize::MAX).unwrap();
        codec.decode(&buf, None, &mut slots).unwrap();
        assert_eq!(slots[0].len(), 3);

        codec.encode(&short, &mut buf, usize::MAX).unwrap();
        codec.decode(&buf, None, &mut slots).unwrap();
        assert_eq!(slots[0].values(), &[SignalData::Integer(4)]);
        assert_eq!(slots[0].capacity(), 3);
    }
}
