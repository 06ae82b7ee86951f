//! Sample header and value storage.
//!
//! [`SampleData`] is the payload stored in a pool slot. It is only ever
//! reached through the [`Sample`](crate::Sample) and
//! [`SampleMut`](crate::SampleMut) handles handed out by a
//! [`SamplePool`](crate::SamplePool).

use crate::signal::{SignalData, SignalList};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Bitset describing which parts of a sample are valid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SampleFlags(u32);

impl SampleFlags {
    /// The sequence number is valid.
    pub const HAS_SEQUENCE: Self = Self(1 << 0);
    /// The origin timestamp is valid.
    pub const HAS_TS_ORIGIN: Self = Self(1 << 1);
    /// The receive timestamp is valid.
    pub const HAS_TS_RECEIVED: Self = Self(1 << 2);
    /// The sample carries values.
    pub const HAS_DATA: Self = Self(1 << 3);
    /// First sample of a (re)started stream.
    pub const IS_FIRST: Self = Self(1 << 4);
    /// Sequence number went backwards.
    pub const IS_REORDERED: Self = Self(1 << 5);

    const NAMES: [(Self, &'static str); 6] = [
        (Self::HAS_SEQUENCE, "HAS_SEQUENCE"),
        (Self::HAS_TS_ORIGIN, "HAS_TS_ORIGIN"),
        (Self::HAS_TS_RECEIVED, "HAS_TS_RECEIVED"),
        (Self::HAS_DATA, "HAS_DATA"),
        (Self::IS_FIRST, "IS_FIRST"),
        (Self::IS_REORDERED, "IS_REORDERED"),
    ];

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Build from raw bits, ignoring unknown ones.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0x3f)
    }

    /// Whether all flags in `other` are set.
    #[must_use]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set flags.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear flags.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Set or clear flags.
    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for SampleFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SampleFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for SampleFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// Split a timestamp into seconds and nanoseconds since the UNIX epoch.
#[must_use]
pub fn timespec(ts: SystemTime) -> (u64, u32) {
    let since = ts.duration_since(UNIX_EPOCH).unwrap_or_default();
    (since.as_secs(), since.subsec_nanos())
}

/// Build a timestamp from seconds and nanoseconds since the UNIX epoch.
///
/// Returns `None` if the result is not representable on this platform.
/// Nanoseconds of a second or more carry into the seconds.
#[must_use]
pub fn from_timespec(secs: u64, nanos: u32) -> Option<SystemTime> {
    let since = Duration::from_secs(secs).checked_add(Duration::from_nanos(u64::from(nanos)))?;
    UNIX_EPOCH.checked_add(since)
}

/// Header and values of one sample.
///
/// The value vector is allocated once with the pool's sample capacity and
/// never grows beyond it, so filling a sample never allocates.
pub struct SampleData {
    /// Sequence number, monotonic per source.
    pub sequence: u64,
    /// When the sample was produced at its origin.
    pub ts_origin: SystemTime,
    /// When the sample was received by this process.
    pub ts_received: SystemTime,
    /// Validity flags.
    pub flags: SampleFlags,
    /// Schema of the values, if known.
    pub signals: Option<Arc<SignalList>>,
    values: Vec<SignalData>,
}

impl SampleData {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            sequence: 0,
            ts_origin: UNIX_EPOCH,
            ts_received: UNIX_EPOCH,
            flags: SampleFlags::empty(),
            signals: None,
            values: Vec::with_capacity(capacity),
        }
    }

    /// Clear header and values, keeping the storage.
    pub fn reset(&mut self) {
        self.sequence = 0;
        self.ts_origin = UNIX_EPOCH;
        self.ts_received = UNIX_EPOCH;
        self.flags = SampleFlags::empty();
        self.signals = None;
        self.values.clear();
    }

    /// The values currently held.
    #[must_use]
    pub fn values(&self) -> &[SignalData] {
        &self.values
    }

    /// Mutable access to the values currently held.
    pub fn values_mut(&mut self) -> &mut [SignalData] {
        &mut self.values
    }

    /// Number of values held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the sample holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Maximum number of values this sample can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    /// Value at a position.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<SignalData> {
        self.values.get(index).copied()
    }

    /// Drop every value, keeping the storage.
    pub fn clear_values(&mut self) {
        self.values.clear();
        self.flags.remove(SampleFlags::HAS_DATA);
    }

    /// Append a value. Returns `false` if the sample is full.
    pub fn push(&mut self, value: SignalData) -> bool {
        if self.values.len() == self.values.capacity() {
            return false;
        }
        self.values.push(value);
        self.flags.insert(SampleFlags::HAS_DATA);
        true
    }

    /// Insert a value at a position. Returns `false` if the sample is full
    /// or the position is out of range.
    pub fn insert(&mut self, index: usize, value: SignalData) -> bool {
        if self.values.len() == self.values.capacity() || index > self.values.len() {
            return false;
        }
        self.values.insert(index, value);
        self.flags.insert(SampleFlags::HAS_DATA);
        true
    }

    /// Resize to `len` values, padding with `fill`. Clamped to the capacity;
    /// returns the resulting length.
    pub fn resize(&mut self, len: usize, fill: SignalData) -> usize {
        let len = len.min(self.values.capacity());
        self.values.resize(len, fill);
        if len > 0 {
            self.flags.insert(SampleFlags::HAS_DATA);
        }
        len
    }

    /// Replace the values with a copy of `values`, truncated to the capacity.
    /// Returns the number of values copied.
    pub fn set_values(&mut self, values: &[SignalData]) -> usize {
        let n = values.len().min(self.values.capacity());
        self.values.clear();
        self.values.extend_from_slice(&values[..n]);
        self.flags.set(SampleFlags::HAS_DATA, n > 0);
        n
    }

    /// Copy header and values of another sample.
    pub fn copy_from(&mut self, other: &SampleData) -> usize {
        self.sequence = other.sequence;
        self.ts_origin = other.ts_origin;
        self.ts_received = other.ts_received;
        self.signals = other.signals.clone();
        let n = self.set_values(&other.values);
        self.flags = other.flags;
        n
    }
}

impl fmt::Debug for SampleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleData")
            .field("sequence", &self.sequence)
            .field("flags", &self.flags)
            .field("ts_origin", &timespec(self.ts_origin))
            .field("ts_received", &timespec(self.ts_received))
            .field("values", &self.values)
            .finish()
    }
}

impl fmt::Display for SampleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (secs, nanos) = timespec(self.ts_origin);
        write!(f, "{secs}.{nanos:09}({})", self.sequence)?;
        for value in &self.values {
            write!(f, "\t{value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let mut flags = SampleFlags::HAS_SEQUENCE | SampleFlags::HAS_DATA;
        assert!(flags.contains(SampleFlags::HAS_SEQUENCE));
        assert!(!flags.contains(SampleFlags::HAS_TS_ORIGIN));

        flags.set(SampleFlags::HAS_TS_ORIGIN, true);
        flags.remove(SampleFlags::HAS_DATA);
        assert_eq!(flags, SampleFlags::HAS_SEQUENCE | SampleFlags::HAS_TS_ORIGIN);
        assert_eq!(format!("{flags:?}"), "{HAS_SEQUENCE, HAS_TS_ORIGIN}");
    }

    #[test]
    fn test_values_never_exceed_capacity() {
        let mut data = SampleData::with_capacity(2);
        assert!(data.push(SignalData::Float(1.0)));
        assert!(data.push(SignalData::Float(2.0)));
        assert!(!data.push(SignalData::Float(3.0)));
        assert_eq!(data.len(), 2);

        let n = data.set_values(&[SignalData::Integer(1); 5]);
        assert_eq!(n, 2);
        assert_eq!(data.capacity(), 2);
        assert_eq!(data.resize(10, SignalData::Float(0.0)), 2);
    }

    #[test]
    fn test_timespec_round_trip() {
        let ts = from_timespec(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(timespec(ts), (1_700_000_000, 123_456_789));
    }

    #[test]
    fn test_timespec_out_of_range() {
        assert!(from_timespec(u64::MAX, 0).is_none());
        assert!(from_timespec(u64::MAX, 999_999_999).is_none());
        assert_eq!(
            from_timespec(1, 1_500_000_000),
            from_timespec(2, 500_000_000)
        );
    }

    #[test]
    fn test_display() {
        let mut data = SampleData::with_capacity(4);
        data.sequence = 7;
        data.ts_origin = from_timespec(1, 5).unwrap();
        data.push(SignalData::Float(1.5));
        data.push(SignalData::Integer(2));
        assert_eq!(data.to_string(), "1.000000005(7)\t1.5\t2");
    }
}
