//! Mean of several signals.

use super::{parse_params, Hook, HookError, Reason, SignalRef};
use crate::sample::SampleData;
use crate::signal::{Signal, SignalData, SignalList, SignalType};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    signals: Vec<SignalRef>,
    offset: usize,
}

/// Inserts a float signal named `average` at position `offset`, holding the
/// mean of the selected signals.
#[derive(Debug, Default)]
pub struct AverageHook {
    signals: Vec<SignalRef>,
    offset: usize,
    indices: Vec<usize>,
}

impl Hook for AverageHook {
    fn parse(&mut self, params: &Map<String, Value>) -> Result<(), HookError> {
        let params: Params = parse_params(params)?;
        self.signals = params.signals;
        self.offset = params.offset;
        Ok(())
    }

    fn check(&self) -> Result<(), HookError> {
        if self.signals.is_empty() {
            return Err(HookError::InvalidParam {
                name: "signals",
                reason: "at least one signal is required".into(),
            });
        }
        Ok(())
    }

    fn prepare(&mut self, signals: Arc<SignalList>) -> Result<Arc<SignalList>, HookError> {
        if self.offset > signals.len() {
            return Err(HookError::InvalidParam {
                name: "offset",
                reason: format!("{} is past the {} input signals", self.offset, signals.len()),
            });
        }

        self.indices = self
            .signals
            .iter()
            .map(|r| r.resolve(&signals))
            .collect::<Result<_, _>>()?;

        let mut out = SignalList::clone(&signals);
        out.insert(self.offset, Signal::new("average", SignalType::Float));
        Ok(Arc::new(out))
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        let mut sum = 0.0;
        for &index in &self.indices {
            match smp.value(index) {
                Some(value) => sum += value.as_f64(),
                None => return Reason::Error,
            }
        }
        let avg = sum / self.indices.len().max(1) as f64;

        if smp.insert(self.offset, SignalData::Float(avg)) {
            Reason::Ok
        } else {
            Reason::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::sample;
    use super::*;
    use serde_json::json;

    fn prepared(params: Value, inputs: usize) -> (AverageHook, Arc<SignalList>) {
        let mut hook = AverageHook::default();
        hook.parse(params.as_object().unwrap()).unwrap();
        hook.check().unwrap();
        let out = hook.prepare(Arc::new(SignalList::generic(inputs))).unwrap();
        (hook, out)
    }

    #[test]
    fn test_inserts_average() {
        let (mut hook, out) = prepared(json!({ "signals": [0, "signal2"], "offset": 1 }), 3);
        assert_eq!(out.len(), 4);
        assert_eq!(out.get(1).unwrap().name, "average");

        let mut smp = sample(0);
        for v in [2.0, 100.0, 4.0] {
            smp.push(SignalData::Float(v));
        }
        assert_eq!(hook.process(&mut smp), Reason::Ok);
        assert_eq!(smp.value(1), Some(SignalData::Float(3.0)));
        assert_eq!(smp.len(), 4);
    }

    #[test]
    fn test_missing_value_is_an_error() {
        let (mut hook, _) = prepared(json!({ "signals": [2], "offset": 0 }), 3);
        let mut smp = sample(0);
        smp.push(SignalData::Float(1.0));
        assert_eq!(hook.process(&mut smp), Reason::Error);
    }

    #[test]
    fn test_offset_out_of_range() {
        let mut hook = AverageHook::default();
        hook.parse(json!({ "signals": [0], "offset": 5 }).as_object().unwrap())
            .unwrap();
        assert!(hook.prepare(Arc::new(SignalList::generic(2))).is_err());
    }
}
