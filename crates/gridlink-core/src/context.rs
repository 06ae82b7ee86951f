//! Process wide engine context.

use crate::hooks::HookRegistry;
use std::time::Duration;

/// Default interval of periodic statistics callbacks.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound for draining destination queues on stop.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Shared settings and registries, created once at startup and passed to
/// every path explicitly.
#[derive(Debug, Clone)]
pub struct Context {
    hooks: HookRegistry,
    stats_interval: Duration,
    shutdown_grace: Duration,
}

impl Context {
    /// A context with the builtin hook registry and default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hooks: HookRegistry::with_builtin_hooks(),
            stats_interval: DEFAULT_STATS_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Replace the hook registry.
    #[must_use]
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Set the statistics interval. Zero disables periodic callbacks.
    #[must_use]
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Set the shutdown grace period used by paths that do not set their own.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    #[must_use]
    pub fn stats_interval(&self) -> Duration {
        self.stats_interval
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
