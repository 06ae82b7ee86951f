//! Linear scaling of one signal.

use super::{parse_params, Hook, HookError, Reason, SignalRef};
use crate::sample::SampleData;
use crate::signal::{SignalData, SignalList, SignalType};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    signal: SignalRef,
    #[serde(default = "one")]
    scale: f64,
    #[serde(default)]
    offset: f64,
}

fn one() -> f64 {
    1.0
}

/// Replaces one signal by `value * scale + offset`. The signal becomes a float.
#[derive(Debug)]
pub struct ScaleHook {
    signal: SignalRef,
    scale: f64,
    offset: f64,
    index: usize,
}

impl Default for ScaleHook {
    fn default() -> Self {
        Self {
            signal: SignalRef::Index(0),
            scale: 1.0,
            offset: 0.0,
            index: 0,
        }
    }
}

impl Hook for ScaleHook {
    fn parse(&mut self, params: &Map<String, Value>) -> Result<(), HookError> {
        let params: Params = parse_params(params)?;
        self.signal = params.signal;
        self.scale = params.scale;
        self.offset = params.offset;
        Ok(())
    }

    fn prepare(&mut self, signals: Arc<SignalList>) -> Result<Arc<SignalList>, HookError> {
        self.index = self.signal.resolve(&signals)?;

        let ty = signals.get(self.index).map(|s| s.signal_type).unwrap_or_default();
        if ty == SignalType::Complex {
            return Err(HookError::SignalType {
                signal: format!("{:?}", self.signal),
                actual: ty,
            });
        }
        if ty == SignalType::Float {
            return Ok(signals);
        }

        let mut out = SignalList::clone(&signals);
        if let Some(signal) = out.get_mut(self.index) {
            signal.signal_type = SignalType::Float;
        }
        Ok(Arc::new(out))
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        let Some(value) = smp.values_mut().get_mut(self.index) else {
            return Reason::Ok;
        };
        *value = SignalData::Float(value.as_f64() * self.scale + self.offset);
        Reason::Ok
    }
}
