//! Detect restarted streams.

use super::{Hook, Reason};
use crate::sample::{SampleData, SampleFlags};
use tracing::info;

/// Flags the first sample of a stream and every sample whose sequence
/// number falls back to zero after a non-zero one.
#[derive(Debug, Default)]
pub struct RestartHook {
    prev: Option<u64>,
}

impl Hook for RestartHook {
    fn start(&mut self) {
        self.prev = None;
    }

    fn process(&mut self, smp: &mut SampleData) -> Reason {
        if !smp.flags.contains(SampleFlags::HAS_SEQUENCE) {
            return Reason::Ok;
        }

        match self.prev {
            None => smp.flags.insert(SampleFlags::IS_FIRST),
            Some(prev) if prev > 0 && smp.sequence == 0 => {
                info!(prev, "Stream restarted");
                smp.flags.insert(SampleFlags::IS_FIRST);
            }
            Some(_) => {}
        }

        self.prev = Some(smp.sequence);
        Reason::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::sample;
    use super::*;

    #[test]
    fn test_flags_first_and_restart() {
        let mut hook = RestartHook::default();
        hook.start();

        let flagged: Vec<bool> = [5, 6, 7, 0, 1, 0]
            .into_iter()
            .map(|seq| {
                let mut smp = sample(seq);
                hook.process(&mut smp);
                smp.flags.contains(SampleFlags::IS_FIRST)
            })
            .collect();

        assert_eq!(flagged, vec![true, false, false, true, false, true]);
    }

    #[test]
    fn test_repeated_zero_is_not_a_restart() {
        let mut hook = RestartHook::default();
        let mut first = sample(0);
        hook.process(&mut first);
        let mut second = sample(0);
        hook.process(&mut second);
        assert!(!second.flags.contains(SampleFlags::IS_FIRST));
    }
}
