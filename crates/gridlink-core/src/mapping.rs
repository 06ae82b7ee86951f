//! Projection of source samples into the path's output schema.
//!
//! A path's `in` list is a sequence of mapping entries. Each entry selects
//! something from one source node (a range of values, a header field, a
//! timestamp) or a constant, and places it at a position of the output
//! sample. Entries given as plain strings are placed at a running cursor;
//! entries given as `{ map, to }` tables are placed at a named slot of the
//! declared output schema and move the cursor behind it.
//!
//! ```text
//! in = [
//!     "pmu.data[voltage-current]",        # slots 0..2
//!     "pmu.hdr.sequence",                 # slot 2
//!     { map = "rtu.data[0]", to = "breaker" },
//!     "const(50.0)",
//! ]
//! ```
//!
//! Resolution happens once at prepare time. [`ResolvedMapping::remap`] is
//! the per-sample operation and does not allocate.

use crate::error::ConfigError;
use crate::sample::{timespec, SampleData};
use crate::signal::{Signal, SignalData, SignalList, SignalType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Header fields that can be mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    /// Sequence number.
    Sequence,
    /// Number of values.
    Length,
}

/// Timestamps that can be mapped, each as two integer slots (sec, nsec).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampField {
    /// Origin timestamp.
    Origin,
    /// Receive timestamp.
    Received,
}

/// A parsed mapping expression.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingExpr {
    /// Values of a node: all of them, or a selector (`i`, `i-j`, `name`, `a-b`).
    Data {
        node: String,
        selector: Option<String>,
    },
    /// A header field of a node's samples.
    Header { node: String, field: HeaderField },
    /// A timestamp of a node's samples.
    Timestamp { node: String, field: TimestampField },
    /// A constant value.
    Constant(SignalData),
}

impl MappingExpr {
    /// The node this expression reads from, if any.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        match self {
            MappingExpr::Data { node, .. }
            | MappingExpr::Header { node, .. }
            | MappingExpr::Timestamp { node, .. } => Some(node),
            MappingExpr::Constant(_) => None,
        }
    }
}

fn invalid(expr: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidMapping {
        expr: expr.to_string(),
        reason: reason.into(),
    }
}

fn parse_constant(expr: &str, inner: &str) -> Result<SignalData, ConfigError> {
    let inner = inner.trim();
    match inner {
        "true" => return Ok(SignalData::Boolean(true)),
        "false" => return Ok(SignalData::Boolean(false)),
        _ => {}
    }
    if let Ok(value) = inner.parse::<i64>() {
        return Ok(SignalData::Integer(value));
    }
    inner
        .parse::<f64>()
        .map(SignalData::Float)
        .map_err(|_| invalid(expr, format!("'{inner}' is not a constant value")))
}

impl FromStr for MappingExpr {
    type Err = ConfigError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let s = expr.trim();

        if let Some(inner) = s.strip_prefix("const(").and_then(|r| r.strip_suffix(')')) {
            return parse_constant(expr, inner).map(MappingExpr::Constant);
        }

        let (node, rest) = match s.split_once('.') {
            Some((node, rest)) => (node, Some(rest)),
            None => (s, None),
        };
        if node.is_empty() || node.contains(['[', ']', '(', ')']) {
            return Err(invalid(expr, "missing node name"));
        }
        let node = node.to_string();

        let Some(rest) = rest else {
            return Ok(MappingExpr::Data {
                node,
                selector: None,
            });
        };

        let (kind, field) = match rest.split_once('.') {
            Some((kind, field)) => (kind, Some(field)),
            None => (rest, None),
        };

        match (kind, field) {
            ("data", None) => Ok(MappingExpr::Data {
                node,
                selector: None,
            }),
            (data, None) if data.starts_with("data[") => {
                let selector = data
                    .strip_prefix("data[")
                    .and_then(|r| r.strip_suffix(']'))
                    .map(str::trim)
                    .filter(|sel| !sel.is_empty())
                    .ok_or_else(|| invalid(expr, "malformed data selector"))?;
                Ok(MappingExpr::Data {
                    node,
                    selector: Some(selector.to_string()),
                })
            }
            ("hdr", Some("sequence")) => Ok(MappingExpr::Header {
                node,
                field: HeaderField::Sequence,
            }),
            ("hdr", Some("length")) => Ok(MappingExpr::Header {
                node,
                field: HeaderField::Length,
            }),
            ("ts", Some("origin")) => Ok(MappingExpr::Timestamp {
                node,
                field: TimestampField::Origin,
            }),
            ("ts", Some("received")) => Ok(MappingExpr::Timestamp {
                node,
                field: TimestampField::Received,
            }),
            ("hdr" | "ts", Some(other)) => Err(invalid(expr, format!("unknown field '{other}'"))),
            (other, _) => Err(invalid(expr, format!("unknown mapping type '{other}'"))),
        }
    }
}

impl fmt::Display for MappingExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingExpr::Data {
                node,
                selector: None,
            } => write!(f, "{node}.data"),
            MappingExpr::Data {
                node,
                selector: Some(sel),
            } => write!(f, "{node}.data[{sel}]"),
            MappingExpr::Header { node, field } => match field {
                HeaderField::Sequence => write!(f, "{node}.hdr.sequence"),
                HeaderField::Length => write!(f, "{node}.hdr.length"),
            },
            MappingExpr::Timestamp { node, field } => match field {
                TimestampField::Origin => write!(f, "{node}.ts.origin"),
                TimestampField::Received => write!(f, "{node}.ts.received"),
            },
            MappingExpr::Constant(value) => write!(f, "const({value})"),
        }
    }
}

/// One entry of a path's `in` list as written in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingSpec {
    /// Placed at the running cursor.
    Expr(String),
    /// Placed at a named output signal.
    Target { map: String, to: String },
}

impl MappingSpec {
    fn parts(&self) -> (&str, Option<&str>) {
        match self {
            MappingSpec::Expr(expr) => (expr, None),
            MappingSpec::Target { map, to } => (map, Some(to)),
        }
    }
}

impl From<&str> for MappingSpec {
    fn from(expr: &str) -> Self {
        MappingSpec::Expr(expr.to_string())
    }
}

/// A parsed entry, not yet resolved against node schemas.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    /// What to read.
    pub expr: MappingExpr,
    /// Named output slot, if any.
    pub to: Option<String>,
}

impl MappingEntry {
    /// Parse a configuration entry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMapping`] on syntax errors.
    pub fn parse(spec: &MappingSpec) -> Result<Self, ConfigError> {
        let (expr, to) = spec.parts();
        Ok(Self {
            expr: expr.parse()?,
            to: to.map(str::to_string),
        })
    }
}

/// Parse every entry of an `in` list.
///
/// # Errors
///
/// Returns the first syntax error.
pub fn parse_mappings(specs: &[MappingSpec]) -> Result<Vec<MappingEntry>, ConfigError> {
    specs.iter().map(MappingEntry::parse).collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Source {
    Data { first: usize },
    Header(HeaderField),
    Timestamp(TimestampField),
    Constant(SignalData),
}

/// A mapping entry bound to concrete positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMapping {
    node: Option<String>,
    source: Source,
    offset: usize,
    length: usize,
    /// Output types, when they differ from the source types.
    casts: Option<Vec<SignalType>>,
}

impl ResolvedMapping {
    /// Node the entry reads from; `None` for constants.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// First output slot.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of output slots.
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Whether this entry is a constant.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(self.source, Source::Constant(_))
    }

    fn put(&self, dst: &mut [SignalData], k: usize, value: SignalData) {
        let value = match &self.casts {
            Some(types) => value.cast(types[k]),
            None => value,
        };
        dst[self.offset + k] = value;
    }

    /// Copy the selected fields of `src` into `dst`.
    ///
    /// Values missing from a short source sample leave their slot untouched,
    /// so the previous value stays in effect.
    pub fn remap(&self, dst: &mut [SignalData], src: &SampleData) {
        if self.offset + self.length > dst.len() {
            return;
        }

        match &self.source {
            Source::Data { first } => {
                for k in 0..self.length {
                    if let Some(value) = src.value(first + k) {
                        self.put(dst, k, value);
                    }
                }
            }
            Source::Header(HeaderField::Sequence) => {
                self.put(dst, 0, SignalData::Integer(src.sequence as i64));
            }
            Source::Header(HeaderField::Length) => {
                self.put(dst, 0, SignalData::Integer(src.len() as i64));
            }
            Source::Timestamp(field) => {
                let ts = match field {
                    TimestampField::Origin => src.ts_origin,
                    TimestampField::Received => src.ts_received,
                };
                let (secs, nanos) = timespec(ts);
                self.put(dst, 0, SignalData::Integer(secs as i64));
                self.put(dst, 1, SignalData::Integer(i64::from(nanos)));
            }
            Source::Constant(value) => self.put(dst, 0, *value),
        }
    }
}

/// The result of resolving a path's mappings.
#[derive(Debug, Clone)]
pub struct MappingList {
    entries: Vec<ResolvedMapping>,
    signals: Arc<SignalList>,
}

impl MappingList {
    /// Resolve entries against the schemas of their source nodes.
    ///
    /// `lookup` returns the read schema of a node. With `declared` set, the
    /// output schema is the declared one and must be covered completely;
    /// otherwise it is derived from the entries.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unknown nodes or signals, unknown
    /// target slots, entries reaching past the declared schema and output
    /// slots no entry writes.
    pub fn resolve<F>(
        entries: &[MappingEntry],
        lookup: F,
        declared: Option<&SignalList>,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<Arc<SignalList>>,
    {
        let mut resolved = Vec::with_capacity(entries.len());
        let mut derived: Vec<Option<Signal>> = Vec::new();
        let mut cursor = 0;

        for (i, entry) in entries.iter().enumerate() {
            let (source, mut signals) = resolve_source(&entry.expr, &lookup, i)?;
            let length = signals.len();

            let offset = match (&entry.to, declared) {
                (Some(to), Some(declared)) => declared
                    .index_of(to)
                    .ok_or_else(|| invalid(&entry.expr.to_string(), format!("no output signal '{to}'")))?,
                (Some(_), None) => {
                    return Err(invalid(
                        &entry.expr.to_string(),
                        "named targets require declared path signals",
                    ))
                }
                (None, _) => cursor,
            };
            cursor = offset + length;

            let mut casts = None;
            if let Some(declared) = declared {
                if cursor > declared.len() {
                    return Err(ConfigError::MappingOverflow {
                        needed: cursor,
                        declared: declared.len(),
                    });
                }
                let targets: Vec<SignalType> = (offset..cursor)
                    .filter_map(|slot| declared.get(slot).map(|s| s.signal_type))
                    .collect();
                if targets.iter().zip(&signals).any(|(t, s)| *t != s.signal_type) {
                    casts = Some(targets);
                }
            } else {
                if derived.len() < cursor {
                    derived.resize(cursor, None);
                }
                for (k, signal) in signals.drain(..).enumerate() {
                    derived[offset + k] = Some(signal);
                }
            }

            resolved.push(ResolvedMapping {
                node: entry.expr.node().map(str::to_string),
                source,
                offset,
                length,
                casts,
            });
        }

        let signals = match declared {
            Some(declared) => {
                let mut covered = vec![false; declared.len()];
                for entry in &resolved {
                    covered[entry.offset..entry.offset + entry.length].fill(true);
                }
                if let Some(index) = covered.iter().position(|c| !c) {
                    let name = declared
                        .get(index)
                        .map(|s| s.name.clone())
                        .unwrap_or_default();
                    return Err(ConfigError::UnmappedSignal { index, name });
                }
                declared.clone()
            }
            None => derived
                .into_iter()
                .enumerate()
                .map(|(index, signal)| {
                    signal.ok_or_else(|| ConfigError::UnmappedSignal {
                        index,
                        name: format!("signal{index}"),
                    })
                })
                .collect::<Result<SignalList, _>>()?,
        };

        Ok(Self {
            entries: resolved,
            signals: Arc::new(signals),
        })
    }

    /// Output schema.
    #[must_use]
    pub fn signals(&self) -> &Arc<SignalList> {
        &self.signals
    }

    /// All resolved entries.
    #[must_use]
    pub fn entries(&self) -> &[ResolvedMapping] {
        &self.entries
    }

    /// Entries reading from `node`.
    pub fn for_node<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a ResolvedMapping> + 'a {
        self.entries.iter().filter(move |e| e.node() == Some(node))
    }

    /// Initial output values: signal init values, then constants.
    #[must_use]
    pub fn initial_values(&self) -> Vec<SignalData> {
        let mut values: Vec<SignalData> = self.signals.iter().map(Signal::init_value).collect();
        for entry in &self.entries {
            if let Source::Constant(value) = entry.source {
                if entry.offset < values.len() {
                    entry.put(&mut values, 0, value);
                }
            }
        }
        values
    }
}

fn resolve_source<F>(
    expr: &MappingExpr,
    lookup: &F,
    index: usize,
) -> Result<(Source, Vec<Signal>), ConfigError>
where
    F: Fn(&str) -> Option<Arc<SignalList>>,
{
    let node_signals = |node: &str| lookup(node).ok_or_else(|| ConfigError::UnknownNode(node.to_string()));

    match expr {
        MappingExpr::Data { node, selector } => {
            let signals = node_signals(node)?;
            let range = match selector {
                None => 0..signals.len(),
                Some(sel) => signals
                    .resolve_range(sel)
                    .ok_or_else(|| ConfigError::UnknownSignal {
                        node: node.clone(),
                        signal: sel.clone(),
                    })?,
            };
            let first = range.start;
            let selected = signals.as_slice()[range].to_vec();
            Ok((Source::Data { first }, selected))
        }
        MappingExpr::Header { node, field } => {
            node_signals(node)?;
            let name = match field {
                HeaderField::Sequence => format!("{node}.sequence"),
                HeaderField::Length => format!("{node}.length"),
            };
            Ok((
                Source::Header(*field),
                vec![Signal::new(name, SignalType::Integer)],
            ))
        }
        MappingExpr::Timestamp { node, field } => {
            node_signals(node)?;
            let base = match field {
                TimestampField::Origin => format!("{node}.ts_origin"),
                TimestampField::Received => format!("{node}.ts_received"),
            };
            Ok((
                Source::Timestamp(*field),
                vec![
                    Signal::new(format!("{base}.sec"), SignalType::Integer),
                    Signal::new(format!("{base}.nsec"), SignalType::Integer),
                ],
            ))
        }
        MappingExpr::Constant(value) => Ok((
            Source::Constant(*value),
            vec![Signal::new(format!("const{index}"), value.signal_type()).with_init(*value)],
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SamplePool;
    use crate::sample::from_timespec;

    fn schemas(node: &str) -> Option<Arc<SignalList>> {
        match node {
            "pmu" => Some(Arc::new(SignalList::new(vec![
                Signal::new("voltage", SignalType::Float),
                Signal::new("current", SignalType::Float),
                Signal::new("freq", SignalType::Float),
            ]))),
            "rtu" => Some(Arc::new(SignalList::generic(2))),
            _ => None,
        }
    }

    fn entries(exprs: &[&str]) -> Vec<MappingEntry> {
        exprs
            .iter()
            .map(|e| MappingEntry::parse(&MappingSpec::from(*e)).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_expressions() {
        let cases = [
            ("pmu", MappingExpr::Data { node: "pmu".into(), selector: None }),
            ("pmu.data", MappingExpr::Data { node: "pmu".into(), selector: None }),
            (
                "pmu.data[1-2]",
                MappingExpr::Data { node: "pmu".into(), selector: Some("1-2".into()) },
            ),
            (
                "pmu.hdr.sequence",
                MappingExpr::Header { node: "pmu".into(), field: HeaderField::Sequence },
            ),
            (
                "pmu.ts.received",
                MappingExpr::Timestamp { node: "pmu".into(), field: TimestampField::Received },
            ),
            ("const(3)", MappingExpr::Constant(SignalData::Integer(3))),
            ("const(2.5)", MappingExpr::Constant(SignalData::Float(2.5))),
            ("const(true)", MappingExpr::Constant(SignalData::Boolean(true))),
        ];

        for (text, expected) in cases {
            assert_eq!(text.parse::<MappingExpr>().unwrap(), expected, "{text}");
        }

        for bad in ["", ".data", "pmu.foo", "pmu.hdr.bogus", "pmu.data[]", "const(x)"] {
            assert!(bad.parse::<MappingExpr>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_derived_schema() {
        let list = MappingList::resolve(
            &entries(&["pmu.data[current-freq]", "rtu", "pmu.ts.origin", "const(7)"]),
            schemas,
            None,
        )
        .unwrap();

        let names: Vec<&str> = list.signals().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "current",
                "freq",
                "signal0",
                "signal1",
                "pmu.ts_origin.sec",
                "pmu.ts_origin.nsec",
                "const3",
            ]
        );
        assert_eq!(list.for_node("pmu").count(), 2);
        assert_eq!(list.initial_values()[6], SignalData::Integer(7));
    }

    #[test]
    fn test_remap() {
        let list = MappingList::resolve(
            &entries(&["pmu.data[freq]", "pmu.hdr.sequence", "pmu.ts.origin", "pmu.data[0]"]),
            schemas,
            None,
        )
        .unwrap();

        let pool = SamplePool::new(1, 4);
        let mut src = pool.allocate().unwrap();
        src.sequence = 42;
        src.ts_origin = from_timespec(1_000, 250).unwrap();
        src.push(SignalData::Float(230.0));
        src.push(SignalData::Float(1.5));
        src.push(SignalData::Float(50.0));

        let mut dst = list.initial_values();
        for entry in list.for_node("pmu") {
            entry.remap(&mut dst, &src);
        }

        assert_eq!(
            dst,
            vec![
                SignalData::Float(50.0),
                SignalData::Integer(42),
                SignalData::Integer(1_000),
                SignalData::Integer(250),
                SignalData::Float(230.0),
            ]
        );
    }

    #[test]
    fn test_declared_schema_coverage() {
        let declared = SignalList::new(vec![
            Signal::new("v", SignalType::Float),
            Signal::new("i", SignalType::Float),
            Signal::new("breaker", SignalType::Boolean),
        ]);

        // Slot 2 is never written
        let err = MappingList::resolve(&entries(&["pmu.data[0-1]"]), schemas, Some(&declared))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnmappedSignal { index: 2, .. }));

        let err = MappingList::resolve(&entries(&["pmu", "rtu"]), schemas, Some(&declared))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MappingOverflow { needed: 5, declared: 3 }));

        let mut with_target = entries(&["pmu.data[0-1]"]);
        with_target.push(MappingEntry {
            expr: "rtu.data[1]".parse().unwrap(),
            to: Some("breaker".into()),
        });
        let list = MappingList::resolve(&with_target, schemas, Some(&declared)).unwrap();
        assert_eq!(list.signals().len(), 3);

        // Float source cast into the boolean slot
        let pool = SamplePool::new(1, 2);
        let mut src = pool.allocate().unwrap();
        src.push(SignalData::Float(0.0));
        src.push(SignalData::Float(1.0));
        let mut dst = list.initial_values();
        for entry in list.for_node("rtu") {
            entry.remap(&mut dst, &src);
        }
        assert_eq!(dst[2], SignalData::Boolean(true));
    }

    #[test]
    fn test_resolve_errors() {
        assert!(matches!(
            MappingList::resolve(&entries(&["nope.data"]), schemas, None),
            Err(ConfigError::UnknownNode(_))
        ));
        assert!(matches!(
            MappingList::resolve(&entries(&["pmu.data[power]"]), schemas, None),
            Err(ConfigError::UnknownSignal { .. })
        ));
        assert!(matches!(
            MappingList::resolve(&entries(&["pmu.data[2-0]"]), schemas, None),
            Err(ConfigError::UnknownSignal { .. })
        ));
    }

    #[test]
    fn test_spec_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            r#in: Vec<MappingSpec>,
        }

        let wrapper: Wrapper = toml::from_str(
            r#"in = ["pmu.data[0]", { map = "rtu.data[1]", to = "breaker" }]"#,
        )
        .unwrap();
        assert_eq!(wrapper.r#in[0], MappingSpec::Expr("pmu.data[0]".into()));
        assert_eq!(
            wrapper.r#in[1],
            MappingSpec::Target { map: "rtu.data[1]".into(), to: "breaker".into() }
        );
    }
}
