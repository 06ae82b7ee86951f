//! Skip the beginning of a stream.

use super::{parse_params, Hook, HookError, Reason};
use crate::sample::{SampleData, SampleFlags};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::{Duration, SystemTime};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    samples: Option<u64>,
    seconds: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Window {
    Samples(u64),
    Time(Duration),
}

impl Default for Window {
    fn default() -> Self {
        Window::Samples(0)
    }
}

/// Skips the first `samples` samples, or every sample whose origin
/// timestamp lies within `seconds` of the first one, after each start.
#[derive(Debug, Default)]
pub struct SkipFirstHook {
    window: Window,
    seen: u64,
    first: Option<SystemTime>,
}

impl Hook for SkipFirstHook {
    fn parse(&mut self, params: &Map<String, Value>) -> Result<(), HookError> {
        let params: Params = parse_params(params)?;
        self.window = match (params.samples, params.seconds) {
            (Some(samples), None) => Window::Samples(samples),
            (None, Some(seconds)) if seconds >= 0.0 && seconds.is_finite() => {
                Window::Time(Duration::from_secs_f64(seconds))
            }
            (None, Some(seconds)) => {
                return Err(HookError::InvalidParam {
                    name: "seconds",
                    reason: format!("must be a non-negative number, got {seconds}"),
                })
            }
            _ => {
                return Err(HookError::InvalidParam {
                    name: "samples",
                    reason: "exactly one of 'samples' or 'seconds' is required".into(),
                })
            }
        };
        Ok(())
    }

    fn start(&mut self) {
        self.seen = 0;
        self.first = None;
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        match self.window {
            Window::Samples(count) => {
                let seen = self.seen;
                self.seen = self.seen.saturating_add(1);
                if seen < count {
                    return Reason::SkipSample;
                }
            }
            Window::Time(window) => {
                let ts = if smp.flags.contains(SampleFlags::HAS_TS_ORIGIN) {
                    smp.ts_origin
                } else {
                    SystemTime::now()
                };
                let first = *self.first.get_or_insert(ts);
                if ts.duration_since(first).unwrap_or_default() < window {
                    return Reason::SkipSample;
                }
            }
        }
        Reason::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::sample;
    use super::*;
    use crate::sample::from_timespec;
    use serde_json::json;

    fn configured(params: Value) -> SkipFirstHook {
        let mut hook = SkipFirstHook::default();
        hook.parse(params.as_object().unwrap()).unwrap();
        hook.start();
        hook
    }

    #[test]
    fn test_skip_samples() {
        let mut hook = configured(json!({ "samples": 3 }));
        let kept: Vec<u64> = (0..6)
            .filter(|&seq| hook.process(&mut sample(seq)) == Reason::Ok)
            .collect();
        assert_eq!(kept, vec![3, 4, 5]);

        hook.start();
        assert_eq!(hook.process(&mut sample(6)), Reason::SkipSample);
    }

    #[test]
    fn test_skip_seconds() {
        let mut hook = configured(json!({ "seconds": 2.0 }));
        let kept: Vec<u64> = (0..5)
            .filter(|&secs| {
                let mut smp = sample(secs);
                smp.ts_origin = from_timespec(100 + secs, 0).unwrap();
                smp.flags.insert(SampleFlags::HAS_TS_ORIGIN);
                hook.process(&mut smp) == Reason::Ok
            })
            .collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn test_requires_exactly_one() {
        let mut hook = SkipFirstHook::default();
        assert!(hook.parse(json!({}).as_object().unwrap()).is_err());
        assert!(hook
            .parse(json!({ "samples": 1, "seconds": 1.0 }).as_object().unwrap())
            .is_err());
    }
}
