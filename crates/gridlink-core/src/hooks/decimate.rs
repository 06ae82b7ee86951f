//! Keep every n-th sample.

use super::{parse_params, Hook, HookError, Reason};
use crate::sample::SampleData;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    ratio: u32,
    #[serde(default)]
    renumber: bool,
}

/// Passes the first sample and then every `ratio`-th one.
///
/// With `renumber` set, surviving samples get consecutive sequence numbers.
#[derive(Debug, Default)]
pub struct DecimateHook {
    ratio: u32,
    renumber: bool,
    counter: u64,
}

impl DecimateHook {
    /// Create a configured hook.
    #[must_use]
    pub fn new(ratio: u32) -> Self {
        Self {
            ratio,
            ..Self::default()
        }
    }
}

impl Hook for DecimateHook {
    fn parse(&mut self, params: &Map<String, Value>) -> Result<(), HookError> {
        let params: Params = parse_params(params)?;
        self.ratio = params.ratio;
        self.renumber = params.renumber;
        Ok(())
    }

    fn check(&self) -> Result<(), HookError> {
        if self.ratio == 0 {
            return Err(HookError::InvalidParam {
                name: "ratio",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    fn start(&mut self) {
        self.counter = 0;
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        let ratio = u64::from(self.ratio.max(1));
        let counter = self.counter;
        self.counter += 1;

        if counter % ratio != 0 {
            return Reason::SkipSample;
        }

        if self.renumber {
            smp.sequence = counter / ratio;
        }
        Reason::Ok
    }
}
