//! Drinking-day boundaries in local time.
//!
//! Timestamps are UTC seconds. The local day starts at `reset_hour` (4am by
//! default), so a drink at 03:59 local still belongs to the previous day.

use crate::util::{SECS_PER_DAY, SECS_PER_HOUR};

/// Local-day calendar parameters.
#[derive(Debug, Clone, Copy)]
pub struct DayClock {
    pub tz_offset_hours: i8,
    pub reset_hour: u8,
}

impl Default for DayClock {
    fn default() -> Self {
        Self {
            tz_offset_hours: 0,
            reset_hour: 4,
        }
    }
}

impl DayClock {
    pub fn new(tz_offset_hours: i8, reset_hour: u8) -> Self {
        Self {
            tz_offset_hours,
            reset_hour: reset_hour.min(23),
        }
    }

    #[inline]
    fn shift(&self) -> i64 {
        (i64::from(self.reset_hour) - i64::from(self.tz_offset_hours)) * SECS_PER_HOUR
    }

    /// UTC timestamp of the most recent day start at or before `ts`.
    pub fn day_start(&self, ts: u32) -> u32 {
        let shifted = i64::from(ts) - self.shift();
        let start = shifted.div_euclid(SECS_PER_DAY) * SECS_PER_DAY + self.shift();
        clamp_u32(start)
    }

    /// UTC timestamp of the next day start strictly after `ts`.
    pub fn next_day_start(&self, ts: u32) -> u32 {
        clamp_u32(i64::from(self.day_start(ts)) + SECS_PER_DAY)
    }

    /// True when `a` and `b` fall in the same drinking day.
    pub fn same_day(&self, a: u32, b: u32) -> bool {
        self.day_start(a) == self.day_start(b)
    }

    /// Local time of day in seconds, for display consumers.
    pub fn local_seconds_of_day(&self, ts: u32) -> u32 {
        let local = i64::from(ts) + i64::from(self.tz_offset_hours) * SECS_PER_HOUR;
        local.rem_euclid(SECS_PER_DAY) as u32
    }
}

#[inline]
fn clamp_u32(v: i64) -> u32 {
    v.clamp(0, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // 2024-03-10 00:00:00 UTC
    const MIDNIGHT: u32 = 1_710_028_800;

    #[rstest]
    #[case(0, 3 * 3600 + 59 * 60, MIDNIGHT - 20 * 3600)]
    #[case(0, 4 * 3600, MIDNIGHT + 4 * 3600)]
    #[case(0, 23 * 3600, MIDNIGHT + 4 * 3600)]
    #[case(2, 2 * 3600, MIDNIGHT + 2 * 3600)]
    #[case(2, 3600, MIDNIGHT - 22 * 3600)]
    #[case(-5, 9 * 3600, MIDNIGHT + 9 * 3600)]
    fn day_start_respects_reset_hour_and_offset(
        #[case] tz: i8,
        #[case] secs_after_midnight_utc: u32,
        #[case] expected: u32,
    ) {
        let dc = DayClock::new(tz, 4);
        assert_eq!(dc.day_start(MIDNIGHT + secs_after_midnight_utc), expected);
    }

    #[test]
    fn three_fifty_nine_is_previous_day() {
        let dc = DayClock::new(0, 4);
        let before = MIDNIGHT + 3 * 3600 + 59 * 60;
        let at = MIDNIGHT + 4 * 3600;
        assert!(!dc.same_day(before, at));
        assert!(dc.same_day(at, at + 3600));
        assert_eq!(dc.next_day_start(before), at);
    }

    #[test]
    fn local_seconds_wrap() {
        let dc = DayClock::new(-1, 4);
        assert_eq!(dc.local_seconds_of_day(MIDNIGHT), 23 * 3600);
    }
}
