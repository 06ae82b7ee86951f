//! Fill in missing header fields.

use super::{Hook, Reason};
use crate::sample::{SampleData, SampleFlags};
use std::time::SystemTime;

/// Completes sample headers so later stages can rely on them.
///
/// Missing sequence numbers are taken from a running counter, a missing
/// receive timestamp becomes the current time and a missing origin
/// timestamp is copied from the receive timestamp.
#[derive(Debug, Default)]
pub struct FixHook {
    counter: u64,
}

impl Hook for FixHook {
    fn start(&mut self) {
        self.counter = 0;
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        if !smp.flags.contains(SampleFlags::HAS_SEQUENCE) {
            smp.sequence = self.counter;
            smp.flags.insert(SampleFlags::HAS_SEQUENCE);
        }
        self.counter = smp.sequence.wrapping_add(1);

        if !smp.flags.contains(SampleFlags::HAS_TS_RECEIVED) {
            smp.ts_received = SystemTime::now();
            smp.flags.insert(SampleFlags::HAS_TS_RECEIVED);
        }

        if !smp.flags.contains(SampleFlags::HAS_TS_ORIGIN) {
            smp.ts_origin = smp.ts_received;
            smp.flags.insert(SampleFlags::HAS_TS_ORIGIN);
        }

        Reason::Ok
    }
}
