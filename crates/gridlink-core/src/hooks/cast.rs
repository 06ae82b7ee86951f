//! Change type, name or unit of a signal.

use super::{parse_params, Hook, HookError, Reason, SignalRef};
use crate::sample::SampleData;
use crate::signal::{SignalList, SignalType};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    signal: SignalRef,
    new_type: Option<SignalType>,
    new_name: Option<String>,
    new_unit: Option<String>,
}

#[derive(Debug)]
pub struct CastHook {
    signal: SignalRef,
    new_type: Option<SignalType>,
    new_name: Option<String>,
    new_unit: Option<String>,
    index: usize,
}

impl Default for CastHook {
    fn default() -> Self {
        Self {
            signal: SignalRef::Index(0),
            new_type: None,
            new_name: None,
            new_unit: None,
            index: 0,
        }
    }
}

impl Hook for CastHook {
    fn parse(&mut self, params: &Map<String, Value>) -> Result<(), HookError> {
        let params: Params = parse_params(params)?;
        self.signal = params.signal;
        self.new_type = params.new_type;
        self.new_name = params.new_name;
        self.new_unit = params.new_unit;
        Ok(())
    }

    fn check(&self) -> Result<(), HookError> {
        if self.new_type.is_none() && self.new_name.is_none() && self.new_unit.is_none() {
            return Err(HookError::InvalidParam {
                name: "new_type",
                reason: "nothing to change".into(),
            });
        }
        Ok(())
    }

    fn prepare(&mut self, signals: Arc<SignalList>) -> Result<Arc<SignalList>, HookError> {
        self.index = self.signal.resolve(&signals)?;

        let mut out = SignalList::clone(&signals);
        if let Some(signal) = out.get_mut(self.index) {
            if let Some(ty) = self.new_type {
                signal.signal_type = ty;
                signal.init = signal.init.map(|v| v.cast(ty));
            }
            if let Some(name) = &self.new_name {
                signal.name.clone_from(name);
            }
            if let Some(unit) = &self.new_unit {
                signal.unit = Some(unit.clone());
            }
        }
        Ok(Arc::new(out))
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        if let (Some(ty), Some(value)) = (self.new_type, smp.values_mut().get_mut(self.index)) {
            *value = value.cast(ty);
        }
        Reason::Ok
    }
}
