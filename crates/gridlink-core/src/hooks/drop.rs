//! Drop reordered samples.

use super::{Hook, Reason};
use crate::sample::{SampleData, SampleFlags};
use tracing::debug;

/// Skips samples whose sequence number is not larger than the previous one.
///
/// A sample flagged [`SampleFlags::IS_FIRST`] resets the reference, so a
/// restarted stream is accepted again.
#[derive(Debug, Default)]
pub struct DropHook {
    prev: Option<u64>,
    dropped: u64,
}

impl Hook for DropHook {
    fn start(&mut self) {
        self.prev = None;
        self.dropped = 0;
    }

    fn stop(&mut self) {
        if self.dropped > 0 {
            debug!(dropped = self.dropped, "Dropped reordered samples");
        }
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        if !smp.flags.contains(SampleFlags::HAS_SEQUENCE) {
            return Reason::Ok;
        }

        if smp.flags.contains(SampleFlags::IS_FIRST) {
            self.prev = None;
        }

        if let Some(prev) = self.prev {
            if smp.sequence <= prev {
                smp.flags.insert(SampleFlags::IS_REORDERED);
                self.dropped += 1;
                return Reason::SkipSample;
            }
        }

        self.prev = Some(smp.sequence);
        Reason::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::sample;
    use super::*;

    fn run(hook: &mut DropHook, seqs: &[u64]) -> Vec<u64> {
        seqs.iter()
            .filter_map(|&seq| {
                let mut smp = sample(seq);
                (hook.process(&mut smp) == Reason::Ok).then_some(seq)
            })
            .collect()
    }

    #[test]
    fn test_drops_duplicates_and_reordered() {
        let mut hook = DropHook::default();
        hook.start();
        assert_eq!(run(&mut hook, &[1, 2, 2, 5, 3, 6]), vec![1, 2, 5, 6]);
    }

    #[test]
    fn test_first_flag_resets() {
        let mut hook = DropHook::default();
        hook.start();
        run(&mut hook, &[10, 11]);

        let mut smp = sample(0);
        smp.flags.insert(SampleFlags::IS_FIRST);
        assert_eq!(hook.process(&mut smp), Reason::Ok);
    }
}
