//! Waveform generator node.

use async_trait::async_trait;
use gridlink_core::{
    Node, NodeDirection, NodeError, Sample, SampleFlags, SampleMut, Signal, SignalData, SignalList,
    SignalType,
};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::info;

use crate::registry::{BuildError, NodeConfig};

/// Shape of a generated signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Triangle,
    Ramp,
    /// The sample counter itself.
    Counter,
    /// Always `offset + amplitude`.
    Constant,
}

impl Waveform {
    fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Triangle => "triangle",
            Waveform::Ramp => "ramp",
            Waveform::Counter => "counter",
            Waveform::Constant => "constant",
        }
    }

    fn signal_type(self) -> SignalType {
        match self {
            Waveform::Counter => SignalType::Integer,
            _ => SignalType::Float,
        }
    }

    /// Value at `counter`, sampled at `rate` Hz.
    fn value(self, counter: u64, rate: f64, shape: &Shape) -> SignalData {
        let t = counter as f64 / rate;
        let phase = (t * shape.frequency).fract();
        let unit = match self {
            Waveform::Sine => (2.0 * PI * phase).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            Waveform::Ramp => phase,
            Waveform::Counter => return SignalData::Integer(counter as i64),
            Waveform::Constant => 1.0,
        };
        SignalData::Float(shape.offset + shape.amplitude * unit)
    }
}

/// One or several waveforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum Waveforms {
    One(Waveform),
    Many(Vec<Waveform>),
}

impl Default for Waveforms {
    fn default() -> Self {
        Waveforms::One(Waveform::default())
    }
}

fn default_rate() -> f64 {
    10.0
}

fn default_one() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    #[serde(default)]
    signal: Waveforms,
    /// Number of values; repeats a single waveform.
    #[serde(default)]
    values: Option<usize>,
    #[serde(default = "default_rate")]
    rate: f64,
    #[serde(default = "default_one")]
    frequency: f64,
    #[serde(default = "default_one")]
    amplitude: f64,
    #[serde(default)]
    offset: f64,
    /// Stop after this many samples.
    #[serde(default)]
    limit: Option<u64>,
    /// Pace samples at `rate`; otherwise generate as fast as read.
    #[serde(default = "default_true")]
    realtime: bool,
}

#[derive(Debug, Clone, Copy)]
struct Shape {
    frequency: f64,
    amplitude: f64,
    offset: f64,
}

struct Generator {
    counter: u64,
    interval: Option<Interval>,
}

/// Generates waveforms at a fixed rate.
pub struct SignalNode {
    name: String,
    input: NodeDirection,
    output: NodeDirection,
    waveforms: Vec<Waveform>,
    shape: Shape,
    rate: f64,
    limit: Option<u64>,
    realtime: bool,
    state: Mutex<Generator>,
}

impl SignalNode {
    /// Create from configuration.
    ///
    /// Without declared input signals, one signal per waveform is created,
    /// named after the waveform.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] for unknown parameters, a non-positive rate
    /// or a declared schema that does not match the waveforms.
    pub fn from_config(config: &NodeConfig) -> Result<Self, BuildError> {
        let params: Params = config.params()?;
        if !(params.rate > 0.0 && params.rate.is_finite()) {
            return Err(config.invalid(format!("rate must be positive, got {}", params.rate)));
        }

        let waveforms = match (params.signal, params.values) {
            (Waveforms::One(w), count) => vec![w; count.unwrap_or(1).max(1)],
            (Waveforms::Many(list), None) if !list.is_empty() => list,
            (Waveforms::Many(_), _) => {
                return Err(config.invalid("a list of signals takes no 'values' and must not be empty"))
            }
        };

        let mut input = config.input.clone();
        if input.signals.is_empty() {
            input.signals = waveforms
                .iter()
                .enumerate()
                .map(|(i, w)| Signal::new(format!("{}{i}", w.name()), w.signal_type()))
                .collect::<SignalList>();
        } else if input.signals.len() != waveforms.len() {
            return Err(config.invalid(format!(
                "{} signals declared for {} waveforms",
                input.signals.len(),
                waveforms.len()
            )));
        }

        Ok(Self {
            name: config.name.clone(),
            input,
            output: NodeDirection {
                enabled: false,
                ..config.output.clone()
            },
            waveforms,
            shape: Shape {
                frequency: params.frequency,
                amplitude: params.amplitude,
                offset: params.offset,
            },
            rate: params.rate,
            limit: params.limit,
            realtime: params.realtime,
            state: Mutex::new(Generator {
                counter: 0,
                interval: None,
            }),
        })
    }

    /// Samples generated so far.
    pub async fn generated(&self) -> u64 {
        self.state.lock().await.counter
    }

    fn fill(&self, smp: &mut SampleMut, counter: u64, now: SystemTime) {
        let values: Vec<SignalData> = self
            .waveforms
            .iter()
            .zip(self.input.signals.iter())
            .map(|(w, signal)| w.value(counter, self.rate, &self.shape).cast(signal.signal_type))
            .collect();
        smp.sequence = counter;
        smp.ts_origin = now;
        smp.set_values(&values);
        smp.flags = SampleFlags::HAS_SEQUENCE | SampleFlags::HAS_TS_ORIGIN | SampleFlags::HAS_DATA;
    }
}

#[async_trait]
impl Node for SignalNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "signal"
    }

    fn input(&self) -> &NodeDirection {
        &self.input
    }

    fn output(&self) -> &NodeDirection {
        &self.output
    }

    async fn start(&self) -> Result<(), NodeError> {
        let mut state = self.state.lock().await;
        state.counter = 0;
        state.interval = self.realtime.then(|| {
            let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / self.rate));
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            interval
        });
        info!(node = %self.name, rate = self.rate, signals = self.waveforms.len(), "Started signal generator");
        Ok(())
    }

    async fn read(&self, smps: &mut [SampleMut]) -> Result<usize, NodeError> {
        let mut state = self.state.lock().await;
        if self.limit.is_some_and(|limit| state.counter >= limit) {
            return Err(NodeError::Closed);
        }
        if smps.is_empty() {
            return Ok(0);
        }

        let count = match &mut state.interval {
            Some(interval) => {
                interval.tick().await;
                1
            }
            None => {
                tokio::task::yield_now().await;
                smps.len()
            }
        };
        let count = match self.limit {
            Some(limit) => count.min((limit - state.counter) as usize),
            None => count,
        };

        let now = SystemTime::now();
        for smp in &mut smps[..count] {
            self.fill(smp, state.counter, now);
            state.counter += 1;
        }
        Ok(count)
    }

    async fn write(&self, _smps: &[Sample]) -> Result<usize, NodeError> {
        Err(NodeError::Other(format!("node '{}' does not accept samples", self.name)))
    }
}
