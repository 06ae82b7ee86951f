//! Limit the sample rate.

use super::{parse_params, Hook, HookError, Reason};
use crate::sample::{SampleData, SampleFlags};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, SystemTime};

/// Timestamp used to measure the distance between samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitRateMode {
    /// Wall clock at processing time.
    #[default]
    Local,
    /// Origin timestamp of the sample.
    Origin,
    /// Receive timestamp of the sample.
    Received,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    rate: f64,
    #[serde(default)]
    mode: LimitRateMode,
}

/// Skips samples that follow the last passed one closer than `1 / rate`.
#[derive(Debug, Default)]
pub struct LimitRateHook {
    rate: f64,
    mode: LimitRateMode,
    deadtime: Duration,
    last: Option<SystemTime>,
}

impl LimitRateHook {
    /// Create a configured hook.
    #[must_use]
    pub fn new(rate: f64, mode: LimitRateMode) -> Self {
        let mut hook = Self {
            rate,
            mode,
            ..Self::default()
        };
        hook.update_deadtime();
        hook
    }

    fn update_deadtime(&mut self) {
        if self.rate > 0.0 && self.rate.is_finite() {
            self.deadtime = Duration::from_secs_f64(1.0 / self.rate);
        }
    }

    fn timestamp(&self, smp: &SampleData) -> SystemTime {
        match self.mode {
            LimitRateMode::Origin if smp.flags.contains(SampleFlags::HAS_TS_ORIGIN) => {
                smp.ts_origin
            }
            LimitRateMode::Received if smp.flags.contains(SampleFlags::HAS_TS_RECEIVED) => {
                smp.ts_received
            }
            _ => SystemTime::now(),
        }
    }
}

impl Hook for LimitRateHook {
    fn parse(&mut self, params: &Map<String, Value>) -> Result<(), HookError> {
        let params: Params = parse_params(params)?;
        self.rate = params.rate;
        self.mode = params.mode;
        self.update_deadtime();
        Ok(())
    }

    fn check(&self) -> Result<(), HookError> {
        if !(self.rate > 0.0 && self.rate.is_finite()) {
            return Err(HookError::InvalidParam {
                name: "rate",
                reason: format!("must be a positive number, got {}", self.rate),
            });
        }
        Ok(())
    }

    fn start(&mut self) {
        self.last = None;
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        let now = self.timestamp(smp);

        if let Some(last) = self.last {
            // A timestamp before the last one counts as too close
            let elapsed = now.duration_since(last).unwrap_or_default();
            if elapsed < self.deadtime {
                return Reason::SkipSample;
            }
        }

        self.last = Some(now);
        Reason::Ok
    }
}
