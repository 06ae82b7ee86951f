//! Ordered hook pipeline.

use super::{Hook, HookConfig, HookContext, HookRegistry, Reason};
use crate::error::ConfigError;
use crate::pool::SampleMut;
use crate::signal::SignalList;
use crate::state::State;
use std::sync::Arc;
use tracing::{debug, trace};

struct HookEntry {
    name: String,
    priority: i32,
    state: State,
    hook: Box<dyn Hook>,
}

/// Counters of one [`HookList::process`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Samples that survived every hook.
    pub kept: usize,
    /// Samples dropped with [`Reason::SkipSample`].
    pub skipped: usize,
    /// Samples dropped with [`Reason::Error`].
    pub errors: usize,
    /// Samples discarded because a hook stopped the batch.
    pub discarded: usize,
}

impl ProcessSummary {
    /// Whether a hook stopped the batch.
    #[must_use]
    pub fn stopped(&self) -> bool {
        self.discarded > 0
    }
}

/// A pipeline of hooks applied in ascending priority order.
///
/// Equal priorities keep their insertion order. Every hook sees every
/// sample that reaches it exactly once, in arrival order.
pub struct HookList {
    context: HookContext,
    entries: Vec<HookEntry>,
    signals: Option<Arc<SignalList>>,
}

impl HookList {
    /// Create an empty list for `context`.
    #[must_use]
    pub fn new(context: HookContext) -> Self {
        Self {
            context,
            entries: Vec::new(),
            signals: None,
        }
    }

    /// Instantiate hooks from configuration.
    ///
    /// With `builtin` set, the registry's builtin hooks for this context are
    /// added first unless the configuration names the same type explicitly.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unknown hook types, hooks that do not
    /// support this context and hooks rejecting their parameters.
    pub fn parse(
        &mut self,
        registry: &HookRegistry,
        configs: &[HookConfig],
        builtin: bool,
    ) -> Result<(), ConfigError> {
        if builtin {
            let builtins: Vec<HookConfig> = registry
                .builtin_for(self.context)
                .filter(|d| !configs.iter().any(|c| c.kind == d.name))
                .map(|d| HookConfig::new(d.name))
                .collect();
            for config in &builtins {
                self.parse_one(registry, config)?;
            }
        }

        for config in configs.iter().filter(|c| c.enabled) {
            self.parse_one(registry, config)?;
        }

        Ok(())
    }

    fn parse_one(&mut self, registry: &HookRegistry, config: &HookConfig) -> Result<(), ConfigError> {
        let descriptor = registry
            .lookup(&config.kind)
            .ok_or_else(|| ConfigError::UnknownHook(config.kind.clone()))?;

        if !descriptor.flags.contains(self.context.flag()) {
            return Err(ConfigError::HookContext {
                hook: config.kind.clone(),
                context: self.context.as_str(),
            });
        }

        let mut hook = (descriptor.factory)();
        let wrap = |source| ConfigError::Hook {
            hook: config.kind.clone(),
            source,
        };
        hook.parse(&config.params).map_err(wrap)?;
        hook.check().map_err(wrap)?;

        self.entries.push(HookEntry {
            name: config.kind.clone(),
            priority: config.priority.unwrap_or(descriptor.priority),
            state: State::Checked,
            hook,
        });
        Ok(())
    }

    /// Append an already configured hook.
    pub fn push(&mut self, name: impl Into<String>, priority: i32, hook: Box<dyn Hook>) {
        self.entries.push(HookEntry {
            name: name.into(),
            priority,
            state: State::Checked,
            hook,
        });
    }

    /// Sort by priority and let every hook resolve its input schema.
    ///
    /// Returns the schema of the samples leaving the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Hook`] if a hook rejects its input signals.
    pub fn prepare(&mut self, signals: Arc<SignalList>) -> Result<Arc<SignalList>, ConfigError> {
        self.entries.sort_by_key(|e| e.priority);

        let mut signals = signals;
        for entry in &mut self.entries {
            signals = entry
                .hook
                .prepare(signals)
                .map_err(|source| ConfigError::Hook {
                    hook: entry.name.clone(),
                    source,
                })?;
            entry.state = State::Prepared;
        }

        debug!(
            context = %self.context,
            hooks = ?self.names(),
            signals = signals.len(),
            "Prepared hook list"
        );
        self.signals = Some(Arc::clone(&signals));
        Ok(signals)
    }

    /// Start every prepared hook.
    pub fn start(&mut self) {
        for entry in &mut self.entries {
            if matches!(entry.state, State::Prepared | State::Stopped) {
                entry.hook.start();
                entry.state = State::Started;
            }
        }
    }

    /// Stop every started hook.
    pub fn stop(&mut self) {
        for entry in &mut self.entries {
            if entry.state == State::Started {
                entry.hook.stop();
                entry.state = State::Stopped;
            }
        }
    }

    /// Forward the statistics interval to every started hook.
    pub fn periodic(&mut self) {
        for entry in &mut self.entries {
            if entry.state == State::Started {
                entry.hook.periodic();
            }
        }
    }

    /// Run the pipeline over a batch.
    ///
    /// Surviving samples are compacted to the front of `smps` in their
    /// original order and the rest is released back to its pool.
    pub fn process(&mut self, smps: &mut Vec<SampleMut>) -> ProcessSummary {
        let total = smps.len();
        let mut summary = ProcessSummary::default();

        if self.entries.is_empty() {
            summary.kept = total;
            return summary;
        }

        for current in 0..total {
            match self.process_one(&mut smps[current]) {
                Reason::Ok => {
                    smps.swap(summary.kept, current);
                    summary.kept += 1;
                }
                Reason::SkipSample => summary.skipped += 1,
                Reason::Error => summary.errors += 1,
                Reason::StopProcessing => {
                    summary.discarded = total - current;
                    break;
                }
            }
        }

        smps.truncate(summary.kept);
        summary
    }

    fn process_one(&mut self, smp: &mut SampleMut) -> Reason {
        for entry in &mut self.entries {
            if entry.state != State::Started {
                continue;
            }
            match entry.hook.process(smp) {
                Reason::Ok => {}
                reason => {
                    trace!(
                        context = %self.context,
                        hook = %entry.name,
                        sequence = smp.sequence,
                        ?reason,
                        "Sample rejected"
                    );
                    return reason;
                }
            }
        }
        Reason::Ok
    }

    /// Output schema, once prepared.
    #[must_use]
    pub fn signals(&self) -> Option<&Arc<SignalList>> {
        self.signals.as_ref()
    }

    /// Hook names in execution order (after prepare).
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no hooks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attached context.
    #[must_use]
    pub fn context(&self) -> HookContext {
        self.context
    }
}

impl std::fmt::Debug for HookList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookList")
            .field("context", &self.context)
            .field("hooks", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SamplePool;
    use crate::sample::{SampleData, SampleFlags};

    fn batch(pool: &SamplePool, count: u64) -> Vec<SampleMut> {
        (0..count)
            .map(|seq| {
                let mut smp = pool.allocate().unwrap();
                smp.sequence = seq;
                smp.flags = SampleFlags::HAS_SEQUENCE;
                smp
            })
            .collect()
    }

    fn started(configs: &[HookConfig], context: HookContext) -> HookList {
        let registry = HookRegistry::with_builtin_hooks();
        let mut list = HookList::new(context);
        list.parse(&registry, configs, false).unwrap();
        list.prepare(Arc::new(SignalList::generic(1))).unwrap();
        list.start();
        list
    }

    /// Records sequence numbers and answers with a fixed verdict for one of them.
    struct Recorder {
        seen: Arc<parking_lot::Mutex<Vec<u64>>>,
        reject: Option<(u64, Reason)>,
    }

    impl Hook for Recorder {
        fn process(&mut self, smp: &mut SampleData) -> Reason {
            self.seen.lock().push(smp.sequence);
            match self.reject {
                Some((seq, reason)) if seq == smp.sequence => reason,
                _ => Reason::Ok,
            }
        }
    }

    #[test]
    fn test_fix_decimate_ts_pipeline() {
        let pool = SamplePool::new(16, 1);
        let mut list = started(
            &[
                HookConfig::new("fix"),
                HookConfig::new("decimate").with_param("ratio", 3),
                HookConfig::new("ts"),
            ],
            HookContext::Path,
        );

        let mut smps = batch(&pool, 10);
        let summary = list.process(&mut smps);

        assert_eq!(summary.kept, 4);
        assert_eq!(summary.skipped, 6);
        let seqs: Vec<u64> = smps.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![0, 3, 6, 9]);
        assert!(smps.iter().all(|s| s.flags.contains(SampleFlags::HAS_TS_ORIGIN)));

        // Rejected samples went back to the pool
        assert_eq!(pool.available(), 12);
    }

    #[test]
    fn test_priority_order_is_stable() {
        let registry = HookRegistry::with_builtin_hooks();
        let mut list = HookList::new(HookContext::Path);
        list.parse(
            &registry,
            &[
                HookConfig::new("ts"),
                HookConfig::new("shift_seq").with_param("offset", 1),
                HookConfig::new("fix"),
                HookConfig::new("decimate").with_param("ratio", 2).with_priority(50),
            ],
            false,
        )
        .unwrap();
        list.prepare(Arc::new(SignalList::generic(1))).unwrap();

        assert_eq!(list.names(), vec!["fix", "decimate", "ts", "shift_seq"]);
    }

    #[test]
    fn test_skip_only_stops_later_hooks() {
        let pool = SamplePool::new(8, 1);
        let first = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let second = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut list = HookList::new(HookContext::Path);
        list.push(
            "first",
            1,
            Box::new(Recorder {
                seen: Arc::clone(&first),
                reject: Some((1, Reason::SkipSample)),
            }),
        );
        list.push(
            "second",
            2,
            Box::new(Recorder {
                seen: Arc::clone(&second),
                reject: None,
            }),
        );
        list.prepare(Arc::new(SignalList::generic(1))).unwrap();
        list.start();

        let mut smps = batch(&pool, 3);
        let summary = list.process(&mut smps);

        assert_eq!(summary.kept, 2);
        assert_eq!(*first.lock(), vec![0, 1, 2]);
        assert_eq!(*second.lock(), vec![0, 2]);
    }

    #[test]
    fn test_stop_processing_discards_rest_of_batch() {
        let pool = SamplePool::new(8, 1);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut list = HookList::new(HookContext::Path);
        list.push(
            "recorder",
            1,
            Box::new(Recorder {
                seen: Arc::clone(&seen),
                reject: Some((2, Reason::StopProcessing)),
            }),
        );
        list.prepare(Arc::new(SignalList::generic(1))).unwrap();
        list.start();

        let mut smps = batch(&pool, 5);
        let summary = list.process(&mut smps);

        assert_eq!(summary.kept, 2);
        assert_eq!(summary.discarded, 3);
        assert!(summary.stopped());
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        assert_eq!(pool.available(), 6);
    }

    #[test]
    fn test_error_drops_single_sample() {
        let pool = SamplePool::new(8, 1);
        let mut list = HookList::new(HookContext::Path);
        list.push(
            "recorder",
            1,
            Box::new(Recorder {
                seen: Arc::new(parking_lot::Mutex::new(Vec::new())),
                reject: Some((1, Reason::Error)),
            }),
        );
        list.prepare(Arc::new(SignalList::generic(1))).unwrap();
        list.start();

        let mut smps = batch(&pool, 3);
        let summary = list.process(&mut smps);
        assert_eq!(summary.errors, 1);
        let seqs: Vec<u64> = smps.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![0, 2]);
    }

    #[test]
    fn test_builtin_hooks_are_added() {
        let registry = HookRegistry::with_builtin_hooks();
        let mut list = HookList::new(HookContext::NodeRead);
        list.parse(&registry, &[HookConfig::new("drop").with_priority(0)], true)
            .unwrap();
        list.prepare(Arc::new(SignalList::generic(1))).unwrap();

        assert_eq!(list.names(), vec!["drop", "fix", "restart"]);
    }

    #[test]
    fn test_parse_errors() {
        let registry = HookRegistry::with_builtin_hooks();

        let mut list = HookList::new(HookContext::Path);
        assert!(matches!(
            list.parse(&registry, &[HookConfig::new("bogus")], false),
            Err(ConfigError::UnknownHook(_))
        ));

        let mut list = HookList::new(HookContext::NodeWrite);
        assert!(matches!(
            list.parse(&registry, &[HookConfig::new("stats")], false),
            Err(ConfigError::HookContext { .. })
        ));

        let mut list = HookList::new(HookContext::Path);
        assert!(matches!(
            list.parse(&registry, &[HookConfig::new("decimate").with_param("ratio", 0)], false),
            Err(ConfigError::Hook { .. })
        ));

        let mut list = HookList::new(HookContext::Path);
        assert!(matches!(
            list.parse(&registry, &[HookConfig::new("ts").with_param("bogus", 1)], false),
            Err(ConfigError::Hook { .. })
        ));
    }

    #[test]
    fn test_disabled_hook_is_ignored() {
        let registry = HookRegistry::with_builtin_hooks();
        let mut list = HookList::new(HookContext::Path);
        let mut config = HookConfig::new("decimate").with_param("ratio", 2);
        config.enabled = false;
        list.parse(&registry, &[config], false).unwrap();
        assert!(list.is_empty());
    }
}
