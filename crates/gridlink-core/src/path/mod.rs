//! Paths: the orchestration unit of the engine.
//!
//! A path reads from one or more source nodes, projects their samples into
//! its output schema through the mapping, runs its hook pipeline and fans
//! the result out to the queues of its destinations.
//!
//! ```text
//!  Node ─read─▶ PathSource ─remap─▶ mux ─▶ HookList ─freeze─▶ PathDestination ─write─▶ Node
//!              (pool, hooks)                 (path)           (queue, hooks)
//! ```
//!
//! Every path runs on its own tokio task. The destination queues are the
//! only state shared with other tasks.

mod destination;
mod source;
mod stats;

pub use destination::WriterMode;
pub use stats::{DestinationSnapshot, DestinationStats, PathSnapshot, PathStats};

use crate::context::Context;
use crate::error::{ConfigError, PathError};
use crate::hooks::{HookConfig, HookContext, HookList, ProcessSummary};
use crate::mapping::{parse_mappings, MappingEntry, MappingList, MappingSpec};
use crate::node::{NodeError, NodeLookup, NodeRef};
use crate::pool::{Sample, SampleMut, SamplePool};
use crate::queue::OverflowPolicy;
use crate::sample::{SampleData, SampleFlags};
use crate::signal::{SignalData, SignalList};
use crate::state::{AtomicState, State};
use destination::{DestinationSettings, PathDestination};
use futures_util::future::{join_all, select_all};
use serde::{Deserialize, Serialize};
use source::{PathSource, SourceRead};
use stats::add;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default capacity of destination queues.
pub const DEFAULT_QUEUE_LEN: usize = 1024;

/// Default number of consecutive write failures that flag a destination.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 10;

/// When a multi-source path emits a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMode {
    /// Whenever any masked source delivered a sample.
    #[default]
    Any,
    /// Once every masked source delivered a sample since the last emission.
    All,
}

/// Destination settings of a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    /// Destination node.
    pub node: String,
    /// Where writes run.
    #[serde(default)]
    pub writer: WriterMode,
    /// Overrides the path's queue length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_len: Option<usize>,
    /// Overrides the path's overflow policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow: Option<OverflowPolicy>,
}

/// A destination given by node name only, or with settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DestinationSpec {
    Node(String),
    Detailed(DestinationConfig),
}

impl DestinationSpec {
    /// Settings with unset fields left empty.
    #[must_use]
    pub fn config(&self) -> DestinationConfig {
        match self {
            DestinationSpec::Node(node) => DestinationConfig {
                node: node.clone(),
                writer: WriterMode::default(),
                queue_len: None,
                overflow: None,
            },
            DestinationSpec::Detailed(config) => config.clone(),
        }
    }
}

impl From<&str> for DestinationSpec {
    fn from(node: &str) -> Self {
        DestinationSpec::Node(node.to_string())
    }
}

fn default_true() -> bool {
    true
}

fn default_queue_len() -> usize {
    DEFAULT_QUEUE_LEN
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

/// Configuration of one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathConfig {
    /// Name used in logs and statistics. Derived from the nodes if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Mapping entries, which also name the source nodes.
    #[serde(rename = "in")]
    pub sources: Vec<MappingSpec>,

    /// Destination nodes.
    #[serde(rename = "out", default)]
    pub destinations: Vec<DestinationSpec>,

    /// Path hooks.
    #[serde(default)]
    pub hooks: Vec<HookConfig>,

    /// Add the builtin path hooks.
    #[serde(default = "default_true")]
    pub builtin: bool,

    /// Disabled paths are not started.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Emission trigger with several sources.
    #[serde(default)]
    pub mode: PathMode,

    /// Sources whose arrival triggers emission. Empty means all.
    #[serde(default)]
    pub mask: Vec<String>,

    /// Emit at this fixed rate (Hz) instead of on arrival. Zero disables.
    #[serde(default)]
    pub rate: f64,

    /// Capacity of each destination queue.
    #[serde(default = "default_queue_len")]
    pub queue_len: usize,

    /// What a full destination queue does.
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Declared output schema. Derived from the mapping if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<SignalList>,

    /// Keep the source sequence numbers. Defaults to true for one source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_sequence: Option<bool>,

    /// Bound for draining the queues on stop. Uses the context default if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_grace_ms: Option<u64>,

    /// Consecutive write failures after which a destination is unhealthy.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl PathConfig {
    /// A path from `sources` to `destinations` with default settings.
    #[must_use]
    pub fn new<I, O>(sources: I, destinations: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<MappingSpec>,
        O: IntoIterator,
        O::Item: Into<DestinationSpec>,
    {
        Self {
            name: None,
            sources: sources.into_iter().map(Into::into).collect(),
            destinations: destinations.into_iter().map(Into::into).collect(),
            hooks: Vec::new(),
            builtin: true,
            enabled: true,
            mode: PathMode::default(),
            mask: Vec::new(),
            rate: 0.0,
            queue_len: DEFAULT_QUEUE_LEN,
            overflow: OverflowPolicy::default(),
            signals: None,
            original_sequence: None,
            shutdown_grace_ms: None,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

/// Samples written and dropped while a path stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Queued samples written during the grace period.
    pub written: u64,
    /// Queued samples dropped after the grace period.
    pub dropped: u64,
}

/// Decides which arrivals emit a sample.
#[derive(Debug)]
struct Trigger {
    mode: PathMode,
    masked: Vec<bool>,
    updated: Vec<bool>,
}

impl Trigger {
    fn arrived(&mut self, source: usize) -> bool {
        if !self.masked[source] {
            return false;
        }
        match self.mode {
            PathMode::Any => true,
            PathMode::All => {
                self.updated[source] = true;
                let complete = self
                    .masked
                    .iter()
                    .zip(&self.updated)
                    .all(|(masked, updated)| !masked || *updated);
                if complete {
                    self.updated.fill(false);
                }
                complete
            }
        }
    }
}

/// Output stage state, split from the sources so both can be borrowed at once.
struct Mux {
    values: Vec<SignalData>,
    signals: Arc<SignalList>,
    pool: SamplePool,
    sequence: u64,
    original_sequence: bool,
    received_any: bool,
}

impl Mux {
    /// Build one output sample from the current values.
    fn sample(&mut self, src: Option<&SampleData>) -> Option<SampleMut> {
        let mut out = self.pool.allocate()?;
        out.set_values(&self.values);
        out.signals = Some(Arc::clone(&self.signals));

        let now = SystemTime::now();
        let mut flags = SampleFlags::HAS_SEQUENCE
            | SampleFlags::HAS_TS_ORIGIN
            | SampleFlags::HAS_TS_RECEIVED
            | SampleFlags::HAS_DATA;

        match src {
            Some(src) if self.original_sequence => out.sequence = src.sequence,
            _ => {
                out.sequence = self.sequence;
                self.sequence = self.sequence.wrapping_add(1);
            }
        }

        match src {
            Some(src) => {
                out.ts_origin = if src.flags.contains(SampleFlags::HAS_TS_ORIGIN) {
                    src.ts_origin
                } else {
                    now
                };
                out.ts_received = if src.flags.contains(SampleFlags::HAS_TS_RECEIVED) {
                    src.ts_received
                } else {
                    now
                };
                if src.flags.contains(SampleFlags::IS_FIRST) {
                    flags.insert(SampleFlags::IS_FIRST);
                }
            }
            None => {
                out.ts_origin = now;
                out.ts_received = now;
            }
        }

        out.flags = flags;
        Some(out)
    }
}

/// A configured path.
///
/// Lifecycle: [`new`](Self::new) parses and checks the configuration,
/// [`prepare`](Self::prepare) resolves nodes, mappings and hooks and
/// allocates every pool and queue, [`start`](Self::start) moves the path
/// onto its own task and hands back a [`PathHandle`].
pub struct Path {
    name: String,
    config: PathConfig,
    entries: Vec<MappingEntry>,
    state: Arc<AtomicState>,
    stats: Arc<PathStats>,
    sources: Vec<PathSource>,
    destinations: Vec<PathDestination>,
    hooks: HookList,
    mux: Option<Mux>,
    trigger: Trigger,
    output: Vec<SampleMut>,
    published: Vec<Sample>,
    stats_interval: Duration,
    shutdown_grace: Duration,
}

impl Path {
    /// Parse and check a path configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for malformed mappings and invalid settings.
    pub fn new(config: PathConfig) -> Result<Self, ConfigError> {
        let entries = parse_mappings(&config.sources)?;

        let mut source_names: Vec<String> = Vec::new();
        for name in entries.iter().filter_map(|e| e.expr.node()) {
            if !source_names.iter().any(|n| n == name) {
                source_names.push(name.to_string());
            }
        }

        let mut seen = HashSet::new();
        let destination_names: Vec<String> = config
            .destinations
            .iter()
            .map(|d| d.config().node)
            .collect();
        for name in &destination_names {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateNode(name.clone()));
            }
        }

        let name = config.name.clone().unwrap_or_else(|| {
            format!("{}->{}", source_names.join(","), destination_names.join(","))
        });

        if source_names.is_empty() || destination_names.is_empty() {
            return Err(ConfigError::EmptyPath(name));
        }
        if config.queue_len == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "queue_len",
                reason: "must be at least 1".into(),
            });
        }
        if !(config.rate >= 0.0 && config.rate.is_finite()) {
            return Err(ConfigError::InvalidSetting {
                name: "rate",
                reason: format!("must be a non-negative number, got {}", config.rate),
            });
        }
        for masked in &config.mask {
            if !source_names.contains(masked) {
                return Err(ConfigError::UnknownNode(masked.clone()));
            }
        }

        Ok(Self {
            name,
            config,
            entries,
            state: Arc::new(AtomicState::new(State::Checked)),
            stats: Arc::new(PathStats::default()),
            sources: Vec::new(),
            destinations: Vec::new(),
            hooks: HookList::new(HookContext::Path),
            mux: None,
            trigger: Trigger {
                mode: PathMode::Any,
                masked: Vec::new(),
                updated: Vec::new(),
            },
            output: Vec::new(),
            published: Vec::new(),
            stats_interval: Duration::ZERO,
            shutdown_grace: Duration::ZERO,
        })
    }

    /// Path name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration this path was built from.
    #[must_use]
    pub fn config(&self) -> &PathConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state.get()
    }

    /// Counters; complete once prepared.
    #[must_use]
    pub fn stats(&self) -> &Arc<PathStats> {
        &self.stats
    }

    /// Names of the source nodes, in mapping order.
    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.entries.iter().filter_map(|e| e.expr.node()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names.into_iter()
    }

    /// Names of the destination nodes, in configuration order.
    pub fn destination_names(&self) -> impl Iterator<Item = String> + '_ {
        self.config.destinations.iter().map(|d| d.config().node)
    }

    /// Output schema, once prepared.
    #[must_use]
    pub fn signals(&self) -> Option<&Arc<SignalList>> {
        self.hooks.signals()
    }

    /// Resolve nodes, mappings and hooks and allocate pools and queues.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidState`] unless the path is checked, and
    /// [`PathError::Config`] for any configuration problem. A failed path
    /// ends up in [`State::Error`].
    pub fn prepare(&mut self, ctx: &Context, nodes: &(impl NodeLookup + ?Sized)) -> Result<(), PathError> {
        let actual = self.state.get();
        if actual != State::Checked {
            return Err(PathError::InvalidState {
                expected: State::Checked,
                actual,
            });
        }

        match self.prepare_inner(ctx, nodes) {
            Ok(()) => {
                self.state.set(State::Prepared);
                Ok(())
            }
            Err(err) => {
                self.state.set(State::Error);
                Err(err.into())
            }
        }
    }

    fn prepare_inner(&mut self, ctx: &Context, nodes: &(impl NodeLookup + ?Sized)) -> Result<(), ConfigError> {
        let lookup = |name: &str| nodes.node(name).ok_or_else(|| ConfigError::UnknownNode(name.to_string()));

        // Sources and their read pipelines
        let source_names: Vec<String> = self.source_names().map(str::to_string).collect();
        let mut sources = Vec::with_capacity(source_names.len());
        let mut schemas = Vec::with_capacity(source_names.len());
        for name in &source_names {
            let mut source = PathSource::new(lookup(name)?, ctx.hooks())?;
            schemas.push((name.clone(), source.prepare()?));
            sources.push(source);
        }

        // Mapping into the output schema
        let mappings = MappingList::resolve(
            &self.entries,
            |node| schemas.iter().find(|(n, _)| n == node).map(|(_, s)| Arc::clone(s)),
            self.config.signals.as_ref(),
        )?;
        for source in &mut sources {
            source.mappings = mappings.for_node(source.name()).cloned().collect();
        }

        // Path pipeline
        let mut hooks = HookList::new(HookContext::Path);
        hooks.parse(ctx.hooks(), &self.config.hooks, self.config.builtin)?;
        let output = hooks.prepare(Arc::clone(mappings.signals()))?;

        let vectorize = sources.iter().map(PathSource::vectorize).max().unwrap_or(1);

        // Destinations
        let mut destinations = Vec::with_capacity(self.config.destinations.len());
        for spec in &self.config.destinations {
            let config = spec.config();
            let settings = DestinationSettings {
                writer: config.writer,
                queue_len: config.queue_len.unwrap_or(self.config.queue_len),
                overflow: config.overflow.unwrap_or(self.config.overflow),
                failure_threshold: self.config.failure_threshold,
                vectorize,
            };
            let mut destination = PathDestination::new(lookup(&config.node)?, ctx.hooks(), &settings)?;
            destination.prepare(Arc::clone(&output), vectorize)?;
            destinations.push(destination);
        }

        // Output pool: every queue full, one batch in flight and one spare
        let queued: usize = self
            .config
            .destinations
            .iter()
            .map(|d| d.config().queue_len.unwrap_or(self.config.queue_len))
            .sum();
        let capacity = mappings.signals().len().max(output.len());
        let pool = SamplePool::new(queued + 2 * vectorize + 1, capacity);

        let masked: Vec<bool> = source_names
            .iter()
            .map(|name| self.config.mask.is_empty() || self.config.mask.contains(name))
            .collect();

        self.mux = Some(Mux {
            values: mappings.initial_values(),
            signals: Arc::clone(mappings.signals()),
            pool,
            sequence: 0,
            original_sequence: self
                .config
                .original_sequence
                .unwrap_or(sources.len() == 1),
            received_any: false,
        });
        self.trigger = Trigger {
            mode: self.config.mode,
            updated: vec![false; masked.len()],
            masked,
        };
        self.stats = Arc::new(PathStats::new(
            destinations.iter().map(|d| Arc::clone(d.stats())).collect(),
        ));
        self.output = Vec::with_capacity(vectorize);
        self.published = Vec::with_capacity(vectorize);
        self.stats_interval = ctx.stats_interval();
        self.shutdown_grace = self
            .config
            .shutdown_grace_ms
            .map_or(ctx.shutdown_grace(), Duration::from_millis);
        self.sources = sources;
        self.destinations = destinations;
        self.hooks = hooks;

        info!(
            path = %self.name,
            sources = self.sources.len(),
            destinations = self.destinations.len(),
            signals = output.len(),
            hooks = ?self.hooks.names(),
            "Prepared path"
        );
        Ok(())
    }

    /// Nodes this path reads from or writes to.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeRef> {
        self.sources
            .iter()
            .map(PathSource::node)
            .chain(self.destinations.iter().map(PathDestination::node))
    }

    /// Run the path on a new task.
    ///
    /// The path first waits in [`State::PendingConnect`] until every node
    /// is ready, then enters [`State::Started`].
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidState`] unless the path is prepared.
    pub fn start(self) -> Result<PathHandle, PathError> {
        let actual = self.state.get();
        if actual != State::Prepared {
            return Err(PathError::InvalidState {
                expected: State::Prepared,
                actual,
            });
        }

        let cancel = CancellationToken::new();
        let (paused_tx, paused_rx) = watch::channel(false);
        let name = self.name.clone();
        let state = Arc::clone(&self.state);
        let stats = Arc::clone(&self.stats);

        state.set(State::PendingConnect);
        let task = tokio::spawn(self.run(cancel.clone(), paused_rx));

        Ok(PathHandle {
            name,
            state,
            stats,
            cancel,
            paused: paused_tx,
            task,
        })
    }

    fn start_hooks(&mut self) {
        for source in &mut self.sources {
            source.hooks_mut().start();
        }
        self.hooks.start();
        for destination in &mut self.destinations {
            destination.hooks_mut().start();
        }
    }

    fn stop_hooks(&mut self) {
        for source in &mut self.sources {
            source.hooks_mut().stop();
        }
        self.hooks.stop();
        for destination in &mut self.destinations {
            destination.hooks_mut().stop();
        }
    }

    fn periodic(&mut self) {
        for source in &mut self.sources {
            source.hooks_mut().periodic();
        }
        self.hooks.periodic();
        for destination in &mut self.destinations {
            destination.hooks_mut().periodic();
        }
    }

    async fn run(mut self, cancel: CancellationToken, mut paused: watch::Receiver<bool>) -> ShutdownReport {
        let nodes: Vec<NodeRef> = self.nodes().cloned().collect();
        tokio::select! {
            _ = cancel.cancelled() => {
                self.state.set(State::Stopped);
                return ShutdownReport::default();
            }
            ready = wait_ready(&nodes) => {
                if let Err(err) = ready {
                    error!(path = %self.name, error = %err, "Nodes did not become ready");
                    self.state.set(State::Error);
                    return ShutdownReport::default();
                }
            }
        }

        self.start_hooks();
        for destination in &mut self.destinations {
            destination.spawn_writer(&cancel);
        }
        self.state.set(State::Started);
        info!(path = %self.name, "Started path");

        let mut stats_tick = interval(self.stats_interval);
        let rate = (self.config.rate > 0.0).then(|| Duration::from_secs_f64(1.0 / self.config.rate));
        let mut rate_tick = rate.and_then(interval);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                changed = paused.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *paused.borrow_and_update() && !self.pause(&cancel, &mut paused).await {
                        break;
                    }
                }

                _ = tick(&mut stats_tick) => self.periodic(),

                _ = tick(&mut rate_tick) => self.emit_periodic(&cancel).await,

                (index, result) = read_any(&mut self.sources) => match result {
                    Ok(read) => self.on_read(index, read, &cancel).await,
                    Err(NodeError::Closed) => {
                        info!(path = %self.name, node = %self.sources[index].name(), "Source closed");
                        if self.sources.iter().all(PathSource::is_closed) {
                            break;
                        }
                    }
                    Err(err) => {
                        add(&self.stats.read_errors, 1);
                        warn!(path = %self.name, node = %self.sources[index].name(), error = %err, "Source read failed");
                        tokio::time::sleep(destination::RETRY_INTERVAL).await;
                    }
                },
            }
        }

        self.shutdown().await
    }

    /// Stay paused until resumed (true) or stopped (false).
    async fn pause(&mut self, cancel: &CancellationToken, paused: &mut watch::Receiver<bool>) -> bool {
        self.state.set(State::Paused);
        info!(path = %self.name, "Paused path");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                changed = paused.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    if !*paused.borrow_and_update() {
                        break;
                    }
                }
            }
        }

        self.state.set(State::Started);
        info!(path = %self.name, "Resumed path");
        true
    }

    async fn on_read(&mut self, index: usize, read: SourceRead, cancel: &CancellationToken) {
        add(&self.stats.received, read.read);
        add(
            &self.stats.source_skipped,
            read.hooks.skipped + read.hooks.errors + read.hooks.discarded,
        );

        let Some(mux) = &mut self.mux else {
            return;
        };
        let source = &mut self.sources[index];
        let periodic = self.config.rate > 0.0;

        for smp in source.batch() {
            for mapping in &source.mappings {
                mapping.remap(&mut mux.values, smp);
            }
            mux.received_any = true;

            if periodic || !self.trigger.arrived(index) {
                continue;
            }
            let data: &SampleData = smp;
            match mux.sample(Some(data)) {
                Some(out) => self.output.push(out),
                None => add(&self.stats.backpressure, 1),
            }
        }
        source.release();

        self.emit(cancel).await;
    }

    async fn emit_periodic(&mut self, cancel: &CancellationToken) {
        let Some(mux) = &mut self.mux else {
            return;
        };
        if !mux.received_any {
            return;
        }
        match mux.sample(None) {
            Some(out) => self.output.push(out),
            None => add(&self.stats.backpressure, 1),
        }
        self.emit(cancel).await;
    }

    /// Run the path hooks over the pending output, publish it to every
    /// destination queue and trigger the writes.
    ///
    /// Inline writes run side by side and give way to `cancel`; whatever
    /// they did not get to stays queued for the shutdown drain.
    async fn emit(&mut self, cancel: &CancellationToken) {
        if self.output.is_empty() {
            return;
        }

        let summary: ProcessSummary = self.hooks.process(&mut self.output);
        add(&self.stats.hook_skipped, summary.skipped);
        add(&self.stats.hook_errors, summary.errors);
        add(&self.stats.hook_discarded, summary.discarded);
        if self.output.is_empty() {
            return;
        }

        let signals = self.hooks.signals().cloned();
        self.published.extend(self.output.drain(..).map(|mut smp| {
            if signals.is_some() {
                smp.signals.clone_from(&signals);
            }
            smp.freeze()
        }));
        add(&self.stats.emitted, self.published.len());

        for destination in &mut self.destinations {
            destination.enqueue(&self.published);
        }
        self.published.clear();

        let writes = join_all(self.destinations.iter_mut().map(|d| d.write(cancel)));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => debug!(path = %self.name, "Writes interrupted by stop"),
            _ = writes => {}
        }
    }

    async fn shutdown(mut self) -> ShutdownReport {
        self.state.set(State::Stopping);
        debug!(path = %self.name, grace = ?self.shutdown_grace, "Stopping path");

        let written_before = self.stats.written();
        let drained = tokio::time::timeout(
            self.shutdown_grace,
            join_all(self.destinations.iter_mut().map(|d| d.drain())),
        )
        .await;

        if drained.is_err() {
            for destination in &mut self.destinations {
                destination.stop_writer().await;
            }
        }

        let mut report = ShutdownReport {
            written: self.stats.written() - written_before,
            dropped: 0,
        };
        for destination in &mut self.destinations {
            let dropped = destination.close();
            if dropped > 0 {
                warn!(
                    path = %self.name,
                    node = %destination.name(),
                    dropped,
                    "Dropped queued samples on shutdown"
                );
            }
            report.dropped += dropped as u64;
        }

        self.stop_hooks();
        self.state.set(State::Stopped);
        info!(
            path = %self.name,
            written = report.written,
            dropped = report.dropped,
            "Stopped path"
        );
        report
    }
}

impl std::fmt::Debug for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Path")
            .field("name", &self.name)
            .field("state", &self.state.get())
            .finish()
    }
}

fn interval(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    Some(interval)
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_ready(nodes: &[NodeRef]) -> Result<(), NodeError> {
    for node in nodes {
        node.ready().await?;
    }
    Ok(())
}

async fn read_any(sources: &mut [PathSource]) -> (usize, Result<SourceRead, NodeError>) {
    if let [source] = sources {
        return (0, source.read().await);
    }
    let (result, index, _) = select_all(sources.iter_mut().map(|s| Box::pin(s.read()))).await;
    (index, result)
}

/// Control handle of a running path.
#[derive(Debug)]
pub struct PathHandle {
    name: String,
    state: Arc<AtomicState>,
    stats: Arc<PathStats>,
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    task: JoinHandle<ShutdownReport>,
}

impl PathHandle {
    /// Path name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state.get()
    }

    /// Live counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<PathStats> {
        &self.stats
    }

    /// Whether the path task has ended, e.g. because all sources closed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop reading until [`resume`](Self::resume) is called.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidState`] unless the path is started.
    pub fn pause(&self) -> Result<(), PathError> {
        self.state
            .transition(State::Started, State::Pausing)
            .map_err(|actual| PathError::InvalidState {
                expected: State::Started,
                actual,
            })?;
        self.paused.send_replace(true);
        Ok(())
    }

    /// Continue after [`pause`](Self::pause).
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidState`] unless the path is paused.
    pub fn resume(&self) -> Result<(), PathError> {
        self.state
            .transition(State::Paused, State::Resuming)
            .map_err(|actual| PathError::InvalidState {
                expected: State::Paused,
                actual,
            })?;
        self.paused.send_replace(false);
        Ok(())
    }

    /// Stop the path, drain its queues within the grace period and wait
    /// for the task to end.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Join`] if the path task panicked.
    pub async fn stop(self) -> Result<ShutdownReport, PathError> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|err| PathError::Join(err.to_string()))
    }
}
