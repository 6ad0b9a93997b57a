//! Heap-backed stand-in for RTC retained RAM. Dropping it is a power loss.

use std::collections::HashMap;

use bottle_traits::RetainedMemory;

/// Pattern fresh regions are filled with; real retained RAM holds garbage
/// after power-up, never guaranteed zeroes.
pub const POWER_ON_FILL: u8 = 0xA5;

#[derive(Debug, Default)]
pub struct RetainedRam {
    regions: HashMap<&'static str, Vec<u8>>,
}

impl RetainedRam {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RetainedMemory for RetainedRam {
    fn region(&mut self, name: &'static str, len: usize) -> &mut [u8] {
        let r = self.regions.entry(name).or_default();
        if r.len() != len {
            r.resize(len, POWER_ON_FILL);
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_start_as_garbage_and_keep_writes() {
        let mut ram = RetainedRam::new();
        assert!(ram.region("a", 4).iter().all(|b| *b == POWER_ON_FILL));
        ram.region("a", 4).copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(ram.region("a", 4), &[1, 2, 3, 4]);
        assert_eq!(ram.region("b", 2), &[POWER_ON_FILL; 2]);
    }
}
