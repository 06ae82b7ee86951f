//! Stream statistics.

use super::{parse_params, Hook, HookError, Reason};
use crate::sample::{SampleData, SampleFlags};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::SystemTime;
use tracing::info;

/// Running mean, variance and extremes (Welford's algorithm).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add an observation.
    pub fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Forget all observations.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance; zero with fewer than two observations.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    #[must_use]
    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    #[serde(default)]
    verbose: bool,
}

fn seconds_between(later: SystemTime, earlier: SystemTime) -> f64 {
    match later.duration_since(earlier) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Collects one-way delay, inter-sample gaps, reordering and loss.
///
/// Results are logged on every statistics interval and when stopped.
#[derive(Debug, Default)]
pub struct StatsHook {
    verbose: bool,
    owd: RunningStats,
    gap_sample: RunningStats,
    gap_received: RunningStats,
    reordered: u64,
    skipped: u64,
    total: u64,
    last: Option<(u64, SystemTime, SystemTime)>,
}

impl StatsHook {
    /// One-way delay statistics in seconds.
    #[must_use]
    pub fn owd(&self) -> &RunningStats {
        &self.owd
    }

    /// Origin timestamp gap statistics in seconds.
    #[must_use]
    pub fn gap_sample(&self) -> &RunningStats {
        &self.gap_sample
    }

    /// Receive timestamp gap statistics in seconds.
    #[must_use]
    pub fn gap_received(&self) -> &RunningStats {
        &self.gap_received
    }

    /// Samples whose sequence number did not increase.
    #[must_use]
    pub fn reordered(&self) -> u64 {
        self.reordered
    }

    /// Sequence numbers missing from the stream.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn report(&self) {
        info!(
            total = self.total,
            reordered = self.reordered,
            skipped = self.skipped,
            owd_mean = self.owd.mean(),
            owd_max = self.owd.max(),
            gap_mean = self.gap_sample.mean(),
            "Stream statistics"
        );
        if self.verbose {
            info!(
                owd_stddev = self.owd.stddev(),
                owd_min = self.owd.min(),
                gap_stddev = self.gap_sample.stddev(),
                gap_received_mean = self.gap_received.mean(),
                gap_received_stddev = self.gap_received.stddev(),
                "Stream statistics details"
            );
        }
    }
}

impl Hook for StatsHook {
    fn parse(&mut self, params: &Map<String, Value>) -> Result<(), HookError> {
        let params: Params = parse_params(params)?;
        self.verbose = params.verbose;
        Ok(())
    }

    fn start(&mut self) {
        let verbose = self.verbose;
        *self = Self {
            verbose,
            ..Self::default()
        };
    }

    fn stop(&mut self) {
        self.report();
    }

    fn periodic(&mut self) {
        self.report();
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        self.total += 1;

        let has_ts = smp
            .flags
            .contains(SampleFlags::HAS_TS_ORIGIN | SampleFlags::HAS_TS_RECEIVED);
        if has_ts {
            self.owd.push(seconds_between(smp.ts_received, smp.ts_origin));
        }

        if let Some((prev_seq, prev_origin, prev_received)) = self.last {
            if smp.flags.contains(SampleFlags::HAS_SEQUENCE) {
                if smp.sequence <= prev_seq {
                    self.reordered += 1;
                    return Reason::Ok;
                }
                self.skipped += smp.sequence - prev_seq - 1;
            }
            if has_ts {
                self.gap_sample.push(seconds_between(smp.ts_origin, prev_origin));
                self.gap_received
                    .push(seconds_between(smp.ts_received, prev_received));
            }
        }

        self.last = Some((smp.sequence, smp.ts_origin, smp.ts_received));
        Reason::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::sample;
    use super::*;
    use crate::sample::from_timespec;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.push(v);
        }
        assert_eq!(stats.count(), 8);
        assert!((stats.mean() - 5.0).abs() < 1e-12);
        assert!((stats.variance() - 32.0 / 7.0).abs() < 1e-12);
        assert_eq!(stats.min(), 2.0);
        assert_eq!(stats.max(), 9.0);

        stats.reset();
        assert_eq!(stats.count(), 0);
    }

    #[test]
    fn test_stream_statistics() {
        let mut hook = StatsHook::default();
        hook.start();

        for (seq, origin_ms) in [(0, 0), (1, 100), (4, 400), (3, 300), (5, 500)] {
            let mut smp = sample(seq);
            smp.ts_origin = from_timespec(10, origin_ms * 1_000_000).unwrap();
            smp.ts_received = from_timespec(10, (origin_ms + 5) * 1_000_000).unwrap();
            smp.flags.insert(SampleFlags::HAS_TS_ORIGIN | SampleFlags::HAS_TS_RECEIVED);
            assert_eq!(hook.process(&mut smp), Reason::Ok);
        }

        assert_eq!(hook.reordered(), 1);
        assert_eq!(hook.skipped(), 2);
        assert_eq!(hook.owd().count(), 5);
        assert!((hook.owd().mean() - 0.005).abs() < 1e-9);
        assert_eq!(hook.gap_sample().count(), 3);
        assert!((hook.gap_sample().max() - 0.3).abs() < 1e-9);
    }
}
