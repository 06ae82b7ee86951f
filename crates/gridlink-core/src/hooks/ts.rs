//! Origin timestamp from receive timestamp.

use super::{Hook, Reason};
use crate::sample::{SampleData, SampleFlags};
use std::time::SystemTime;

/// Overwrites the origin timestamp with the receive timestamp, or with the
/// current time if the sample has none.
#[derive(Debug, Default)]
pub struct TsHook;

impl Hook for TsHook {
    fn process(&mut self, smp: &mut SampleData) -> Reason {
        smp.ts_origin = if smp.flags.contains(SampleFlags::HAS_TS_RECEIVED) {
            smp.ts_received
        } else {
            SystemTime::now()
        };
        smp.flags.insert(SampleFlags::HAS_TS_ORIGIN);
        Reason::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::sample;
    use super::*;
    use crate::sample::from_timespec;

    #[test]
    fn test_copies_received() {
        let mut smp = sample(0);
        smp.ts_received = from_timespec(5, 6).unwrap();
        smp.flags.insert(SampleFlags::HAS_TS_RECEIVED);

        assert_eq!(TsHook.process(&mut smp), Reason::Ok);
        assert_eq!(smp.ts_origin, from_timespec(5, 6).unwrap());
        assert!(smp.flags.contains(SampleFlags::HAS_TS_ORIGIN));
    }
}
