//! Signal descriptors and typed sample values.
//!
//! A [`SignalList`] is the positional schema of the values carried by a
//! sample. Lists are built while a node or path is being configured and are
//! shared as `Arc<SignalList>` afterwards; they are never mutated once a
//! path has been checked.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// The semantic type of one value slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    /// 64-bit floating point.
    #[default]
    Float,
    /// 64-bit signed integer.
    Integer,
    /// Boolean.
    Boolean,
    /// Complex number with single precision parts.
    Complex,
}

impl SignalType {
    /// Type name as used in configuration files.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Float => "float",
            SignalType::Integer => "integer",
            SignalType::Boolean => "boolean",
            SignalType::Complex => "complex",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float" | "f" => Ok(SignalType::Float),
            "integer" | "int" | "i" => Ok(SignalType::Integer),
            "boolean" | "bool" | "b" => Ok(SignalType::Boolean),
            "complex" | "z" => Ok(SignalType::Complex),
            other => Err(format!("unknown signal type '{other}'")),
        }
    }
}

/// A complex value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Complex {
    /// Real part.
    pub re: f32,
    /// Imaginary part.
    pub im: f32,
}

impl Complex {
    /// Create a complex value.
    #[must_use]
    pub const fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }

    /// Magnitude of the value.
    #[must_use]
    pub fn norm(&self) -> f32 {
        self.re.hypot(self.im)
    }
}

/// A single typed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalData {
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Complex value.
    Complex(Complex),
}

impl Default for SignalData {
    fn default() -> Self {
        SignalData::Float(0.0)
    }
}

impl SignalData {
    /// The zero value of a type.
    #[must_use]
    pub fn zero(ty: SignalType) -> Self {
        match ty {
            SignalType::Float => SignalData::Float(0.0),
            SignalType::Integer => SignalData::Integer(0),
            SignalType::Boolean => SignalData::Boolean(false),
            SignalType::Complex => SignalData::Complex(Complex::default()),
        }
    }

    /// The type of this value.
    #[must_use]
    pub fn signal_type(&self) -> SignalType {
        match self {
            SignalData::Boolean(_) => SignalType::Boolean,
            SignalData::Integer(_) => SignalType::Integer,
            SignalData::Float(_) => SignalType::Float,
            SignalData::Complex(_) => SignalType::Complex,
        }
    }

    /// Convert this value to another type.
    ///
    /// Complex values collapse to their magnitude, booleans become 0 / 1.
    #[must_use]
    pub fn cast(self, to: SignalType) -> Self {
        match to {
            SignalType::Float => SignalData::Float(self.as_f64()),
            SignalType::Integer => SignalData::Integer(self.as_i64()),
            SignalType::Boolean => SignalData::Boolean(self.as_bool()),
            SignalType::Complex => match self {
                SignalData::Complex(z) => SignalData::Complex(z),
                other => SignalData::Complex(Complex::new(other.as_f64() as f32, 0.0)),
            },
        }
    }

    /// Numeric view of the value.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match *self {
            SignalData::Boolean(b) => f64::from(u8::from(b)),
            SignalData::Integer(i) => i as f64,
            SignalData::Float(f) => f,
            SignalData::Complex(z) => f64::from(z.norm()),
        }
    }

    /// Integer view of the value (floats are truncated).
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        match *self {
            SignalData::Boolean(b) => i64::from(b),
            SignalData::Integer(i) => i,
            SignalData::Float(f) => f as i64,
            SignalData::Complex(z) => z.norm() as i64,
        }
    }

    /// Boolean view of the value (non-zero is true).
    #[must_use]
    pub fn as_bool(&self) -> bool {
        match *self {
            SignalData::Boolean(b) => b,
            SignalData::Integer(i) => i != 0,
            SignalData::Float(f) => f != 0.0,
            SignalData::Complex(z) => z.re != 0.0 || z.im != 0.0,
        }
    }
}

impl fmt::Display for SignalData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalData::Boolean(b) => write!(f, "{b}"),
            SignalData::Integer(i) => write!(f, "{i}"),
            SignalData::Float(v) => write!(f, "{v}"),
            SignalData::Complex(z) if z.im < 0.0 => write!(f, "{}-{}i", z.re, -z.im),
            SignalData::Complex(z) => write!(f, "{}+{}i", z.re, z.im),
        }
    }
}

impl From<f64> for SignalData {
    fn from(v: f64) -> Self {
        SignalData::Float(v)
    }
}

impl From<i64> for SignalData {
    fn from(v: i64) -> Self {
        SignalData::Integer(v)
    }
}

impl From<bool> for SignalData {
    fn from(v: bool) -> Self {
        SignalData::Boolean(v)
    }
}

/// Descriptor of one value slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Signal name, unique within its list.
    pub name: String,
    /// Physical unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Value type.
    #[serde(default, rename = "type")]
    pub signal_type: SignalType,
    /// Value used before the first sample arrives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<SignalData>,
}

impl Signal {
    /// Create a signal without unit or initial value.
    #[must_use]
    pub fn new(name: impl Into<String>, signal_type: SignalType) -> Self {
        Self {
            name: name.into(),
            unit: None,
            signal_type,
            init: None,
        }
    }

    /// Set the unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the initial value.
    #[must_use]
    pub fn with_init(mut self, init: SignalData) -> Self {
        self.init = Some(init);
        self
    }

    /// The initial value, cast to the signal type.
    #[must_use]
    pub fn init_value(&self) -> SignalData {
        self.init
            .map(|v| v.cast(self.signal_type))
            .unwrap_or_else(|| SignalData::zero(self.signal_type))
    }
}

/// Ordered, name-addressable list of signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalList {
    signals: Vec<Signal>,
}

impl SignalList {
    /// Create a list from signals.
    #[must_use]
    pub fn new(signals: Vec<Signal>) -> Self {
        Self { signals }
    }

    /// Create `count` float signals named `signal0`, `signal1`, ...
    #[must_use]
    pub fn generic(count: usize) -> Self {
        (0..count)
            .map(|i| Signal::new(format!("signal{i}"), SignalType::Float))
            .collect()
    }

    /// Number of signals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Signal at a position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Signal> {
        self.signals.get(index)
    }

    /// Iterate over the signals in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Signal> {
        self.signals.iter()
    }

    /// All signals as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Signal] {
        &self.signals
    }

    /// Position of a signal by name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.signals.iter().position(|s| s.name == name)
    }

    /// Signal by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// Resolve a signal reference to a position: either a name or an index.
    #[must_use]
    pub fn resolve(&self, reference: &str) -> Option<usize> {
        if let Some(index) = self.index_of(reference) {
            return Some(index);
        }
        reference
            .parse::<usize>()
            .ok()
            .filter(|&index| index < self.len())
    }

    /// Resolve `a`, `a-b` (names or indices, inclusive) to a range of positions.
    #[must_use]
    pub fn resolve_range(&self, reference: &str) -> Option<Range<usize>> {
        if let Some(index) = self.resolve(reference) {
            return Some(index..index + 1);
        }
        let (first, last) = reference.split_once('-')?;
        let first = self.resolve(first.trim())?;
        let last = self.resolve(last.trim())?;
        (first <= last).then_some(first..last + 1)
    }

    /// Append a signal. Only used while a list is being built.
    pub fn push(&mut self, signal: Signal) {
        self.signals.push(signal);
    }

    /// Insert a signal at a position. Only used while a list is being built.
    pub fn insert(&mut self, index: usize, signal: Signal) {
        self.signals.insert(index, signal);
    }

    /// Mutable access to a signal. Only used while a list is being built.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Signal> {
        self.signals.get_mut(index)
    }
}

impl FromIterator<Signal> for SignalList {
    fn from_iter<T: IntoIterator<Item = Signal>>(iter: T) -> Self {
        Self {
            signals: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SignalList {
    type Item = &'a Signal;
    type IntoIter = std::slice::Iter<'a, Signal>;

    fn into_iter(self) -> Self::IntoIter {
        self.signals.iter()
    }
}
