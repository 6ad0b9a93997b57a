//! Common time/period helpers for bottle_core.

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;
/// Seconds in one hour.
pub const SECS_PER_HOUR: i64 = 3_600;
/// Seconds in one day.
pub const SECS_PER_DAY: i64 = 86_400;

/// Compute the period in milliseconds for a given sampling rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 millisecond.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    debug_assert!(hz > 0, "sample_rate_hz must be > 0");
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Samples a measurement of `duration_s` at `hz` is expected to collect.
#[inline]
pub fn samples_per_measurement(duration_s: u32, hz: u32) -> usize {
    let period = period_ms(hz);
    ((u64::from(duration_s) * MILLIS_PER_SEC) / period) as usize
}

/// Whole seconds between two wall timestamps, saturating at 0.
#[inline]
pub fn secs_between(start: u32, end: u32) -> u32 {
    end.saturating_sub(start)
}
