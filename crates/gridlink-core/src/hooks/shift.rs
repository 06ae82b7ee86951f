//! Shift sequence numbers and timestamps.

use super::{parse_params, Hook, HookError, Reason};
use crate::sample::SampleData;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, SystemTime};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SeqParams {
    offset: i64,
}

/// Adds a signed offset to every sequence number, wrapping on overflow.
#[derive(Debug, Default)]
pub struct ShiftSeqHook {
    offset: i64,
}

impl ShiftSeqHook {
    /// Create a configured hook.
    #[must_use]
    pub fn new(offset: i64) -> Self {
        Self { offset }
    }
}

impl Hook for ShiftSeqHook {
    fn parse(&mut self, params: &Map<String, Value>) -> Result<(), HookError> {
        let params: SeqParams = parse_params(params)?;
        self.offset = params.offset;
        Ok(())
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        smp.sequence = smp.sequence.wrapping_add_signed(self.offset);
        Reason::Ok
    }
}

/// Which timestamp of a sample to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampKind {
    /// Origin timestamp.
    #[default]
    Origin,
    /// Receive timestamp.
    Received,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TsParams {
    offset: f64,
    #[serde(default)]
    mode: TimestampKind,
}

/// Shifts one timestamp of every sample by a signed number of seconds.
#[derive(Debug, Default)]
pub struct ShiftTsHook {
    offset: Duration,
    negative: bool,
    mode: TimestampKind,
}

impl ShiftTsHook {
    fn shift(&self, ts: SystemTime) -> SystemTime {
        let shifted = if self.negative {
            ts.checked_sub(self.offset)
        } else {
            ts.checked_add(self.offset)
        };
        shifted.unwrap_or(ts)
    }
}

impl Hook for ShiftTsHook {
    fn parse(&mut self, params: &Map<String, Value>) -> Result<(), HookError> {
        let params: TsParams = parse_params(params)?;
        if !params.offset.is_finite() {
            return Err(HookError::InvalidParam {
                name: "offset",
                reason: "must be finite".into(),
            });
        }
        self.offset = Duration::from_secs_f64(params.offset.abs());
        self.negative = params.offset < 0.0;
        self.mode = params.mode;
        Ok(())
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        match self.mode {
            TimestampKind::Origin => smp.ts_origin = self.shift(smp.ts_origin),
            TimestampKind::Received => smp.ts_received = self.shift(smp.ts_received),
        }
        Reason::Ok
    }
}
