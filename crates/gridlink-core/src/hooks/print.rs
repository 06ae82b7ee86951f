//! Log every sample.

use super::{parse_params, Hook, HookError, Reason};
use crate::sample::SampleData;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    #[serde(default)]
    prefix: String,
}

/// Logs each sample at info level, one line per sample.
#[derive(Debug, Default)]
pub struct PrintHook {
    prefix: String,
}

impl Hook for PrintHook {
    fn parse(&mut self, params: &Map<String, Value>) -> Result<(), HookError> {
        let params: Params = parse_params(params)?;
        self.prefix = params.prefix;
        Ok(())
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        info!(prefix = %self.prefix, flags = ?smp.flags, "{smp}");
        Reason::Ok
    }
}
