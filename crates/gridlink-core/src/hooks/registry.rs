//! Explicit registry of hook types.

use super::{
    AverageHook, CastHook, DecimateHook, DropHook, FixHook, Hook, HookContext, HookFlags,
    LimitRateHook, PrintHook, RestartHook, ScaleHook, ShiftSeqHook, ShiftTsHook, SkipFirstHook,
    StatsHook, TsHook,
};

/// Creates a fresh, unconfigured hook instance.
pub type HookFactory = fn() -> Box<dyn Hook>;

/// Registry entry describing one hook type.
#[derive(Clone)]
pub struct HookDescriptor {
    /// Type name used in configuration.
    pub name: &'static str,
    /// One line description.
    pub description: &'static str,
    /// Default priority; lower runs first.
    pub priority: i32,
    /// Allowed contexts, plus [`HookFlags::BUILTIN`].
    pub flags: HookFlags,
    /// Constructor.
    pub factory: HookFactory,
}

impl std::fmt::Debug for HookDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("flags", &self.flags)
            .finish()
    }
}

const READ_PATH: HookFlags = HookFlags::NODE_READ.union(HookFlags::PATH);
const READ_PATH_BUILTIN: HookFlags = READ_PATH.union(HookFlags::BUILTIN);
const READ_BUILTIN: HookFlags = HookFlags::NODE_READ.union(HookFlags::BUILTIN);

fn create<H: Hook + Default + 'static>() -> Box<dyn Hook> {
    Box::<H>::default()
}

fn builtin_table() -> Vec<HookDescriptor> {
    vec![
        HookDescriptor {
            name: "fix",
            description: "Fill in missing sequence numbers and timestamps",
            priority: 1,
            flags: READ_PATH_BUILTIN,
            factory: create::<FixHook>,
        },
        HookDescriptor {
            name: "restart",
            description: "Detect restarted streams by a sequence reset",
            priority: 1,
            flags: READ_BUILTIN,
            factory: create::<RestartHook>,
        },
        HookDescriptor {
            name: "drop",
            description: "Drop reordered and duplicated samples",
            priority: 3,
            flags: READ_PATH_BUILTIN,
            factory: create::<DropHook>,
        },
        HookDescriptor {
            name: "decimate",
            description: "Keep every n-th sample",
            priority: 99,
            flags: HookFlags::ALL_CONTEXTS,
            factory: create::<DecimateHook>,
        },
        HookDescriptor {
            name: "limit_rate",
            description: "Limit the sample rate",
            priority: 99,
            flags: HookFlags::ALL_CONTEXTS,
            factory: create::<LimitRateHook>,
        },
        HookDescriptor {
            name: "skip_first",
            description: "Skip the first samples after start",
            priority: 99,
            flags: HookFlags::ALL_CONTEXTS,
            factory: create::<SkipFirstHook>,
        },
        HookDescriptor {
            name: "ts",
            description: "Overwrite the origin timestamp with the receive timestamp",
            priority: 99,
            flags: READ_PATH,
            factory: create::<TsHook>,
        },
        HookDescriptor {
            name: "shift_seq",
            description: "Shift sequence numbers by an offset",
            priority: 99,
            flags: HookFlags::ALL_CONTEXTS,
            factory: create::<ShiftSeqHook>,
        },
        HookDescriptor {
            name: "shift_ts",
            description: "Shift timestamps by an offset",
            priority: 99,
            flags: HookFlags::ALL_CONTEXTS,
            factory: create::<ShiftTsHook>,
        },
        HookDescriptor {
            name: "scale",
            description: "Scale and offset one signal",
            priority: 99,
            flags: HookFlags::ALL_CONTEXTS,
            factory: create::<ScaleHook>,
        },
        HookDescriptor {
            name: "average",
            description: "Insert the average of several signals",
            priority: 99,
            flags: HookFlags::ALL_CONTEXTS,
            factory: create::<AverageHook>,
        },
        HookDescriptor {
            name: "cast",
            description: "Change type, name or unit of a signal",
            priority: 99,
            flags: HookFlags::ALL_CONTEXTS,
            factory: create::<CastHook>,
        },
        HookDescriptor {
            name: "print",
            description: "Log every sample",
            priority: 99,
            flags: HookFlags::ALL_CONTEXTS,
            factory: create::<PrintHook>,
        },
        HookDescriptor {
            name: "stats",
            description: "Collect delay, gap and loss statistics",
            priority: 99,
            flags: READ_PATH,
            factory: create::<StatsHook>,
        },
    ]
}

/// Registry of the hook types a process knows about.
///
/// Built once at startup and passed around explicitly; the contents are
/// fixed after construction unless [`register`](Self::register) is called
/// while configuring.
#[derive(Debug, Clone)]
pub struct HookRegistry {
    descriptors: Vec<HookDescriptor>,
}

impl HookRegistry {
    /// A registry without any hook type.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    /// A registry holding every hook type shipped with the engine.
    #[must_use]
    pub fn with_builtin_hooks() -> Self {
        Self {
            descriptors: builtin_table(),
        }
    }

    /// Add a hook type, replacing one of the same name.
    pub fn register(&mut self, descriptor: HookDescriptor) {
        match self
            .descriptors
            .iter_mut()
            .find(|d| d.name == descriptor.name)
        {
            Some(existing) => *existing = descriptor,
            None => self.descriptors.push(descriptor),
        }
    }

    /// Find a hook type by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&HookDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// All registered hook types, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &HookDescriptor> {
        self.descriptors.iter()
    }

    /// Hook types added automatically to `context`.
    pub fn builtin_for(&self, context: HookContext) -> impl Iterator<Item = &HookDescriptor> {
        self.descriptors.iter().filter(move |d| {
            d.flags.contains(HookFlags::BUILTIN) && d.flags.contains(context.flag())
        })
    }

    /// Number of registered hook types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether no hook type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::with_builtin_hooks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contents() {
        let registry = HookRegistry::with_builtin_hooks();
        let names: Vec<&str> = registry.iter().map(|d| d.name).collect();

        for name in ["fix", "restart", "drop", "decimate", "limit_rate", "ts", "shift_seq", "stats"] {
            assert!(names.contains(&name), "missing {name}");
        }
        assert!(registry.lookup("nope").is_none());
    }

    #[test]
    fn test_builtin_hooks_per_context() {
        let registry = HookRegistry::with_builtin_hooks();

        let read: Vec<&str> = registry.builtin_for(HookContext::NodeRead).map(|d| d.name).collect();
        assert_eq!(read, vec!["fix", "restart", "drop"]);

        let write: Vec<&str> = registry.builtin_for(HookContext::NodeWrite).map(|d| d.name).collect();
        assert!(write.is_empty());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = HookRegistry::empty();
        registry.register(HookDescriptor {
            name: "ts",
            description: "",
            priority: 10,
            flags: HookFlags::PATH,
            factory: create::<TsHook>,
        });
        registry.register(HookDescriptor {
            name: "ts",
            description: "",
            priority: 20,
            flags: HookFlags::PATH,
            factory: create::<TsHook>,
        });

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("ts").unwrap().priority, 20);
    }
}
