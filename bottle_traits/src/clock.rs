use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic clock abstraction for durations and timeouts across the stack.
///
/// - now(): returns a monotonic Instant
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - ms_since(): helper to compute elapsed milliseconds from an epoch Instant
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_millis() as u64
    }
}

/// Externally synchronized wall clock.
///
/// Returns `None` until the time has been set (e.g. by the companion app).
/// Values are UTC seconds since the Unix epoch; the timezone offset is applied
/// by the caller.
pub trait WallClock {
    fn unix_time(&self) -> Option<u32>;
}

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Host system time as a wall clock. Always synchronized.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn unix_time(&self) -> Option<u32> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|d| u32::try_from(d.as_secs()).ok())
    }
}

/// Deterministic clock whose time is advanced manually.
///
/// now() = origin + offset
/// sleep(d) advances internal time by d without actually sleeping, so blocking
/// measurements complete instantly in tests and in the simulator.
///
/// The wall clock reads `wall_start + offset` in whole seconds once a wall
/// start has been set; clones share the same timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: std::sync::Arc<std::sync::Mutex<Duration>>,
    wall_start: std::sync::Arc<std::sync::Mutex<Option<u32>>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: std::sync::Arc::new(std::sync::Mutex::new(Duration::ZERO)),
            wall_start: std::sync::Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Clock whose wall time starts at `unix` seconds.
    pub fn with_wall_time(unix: u32) -> Self {
        let c = Self::new();
        c.set_wall_time(unix);
        c
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }

    /// Set the absolute offset relative to origin.
    pub fn set_offset(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = d;
        }
    }

    /// Synchronize the wall clock so that it reads `unix` right now.
    pub fn set_wall_time(&self, unix: u32) {
        let elapsed = self.elapsed().as_secs();
        let start = u64::from(unix).saturating_sub(elapsed);
        if let Ok(mut w) = self.wall_start.lock() {
            *w = Some(u32::try_from(start).unwrap_or(u32::MAX));
        }
    }

    /// Forget the wall time, as after a power loss without a time source.
    pub fn clear_wall_time(&self) {
        if let Ok(mut w) = self.wall_start.lock() {
            *w = None;
        }
    }

    fn elapsed(&self) -> Duration {
        self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

impl WallClock for ManualClock {
    fn unix_time(&self) -> Option<u32> {
        let start = self.wall_start.lock().ok().and_then(|g| *g)?;
        let secs = u64::from(start).saturating_add(self.elapsed().as_secs());
        u32::try_from(secs).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_sleep_advances_both_timelines() {
        let c = ManualClock::with_wall_time(1_000);
        let epoch = c.now();
        c.sleep(Duration::from_millis(2_500));
        assert_eq!(c.ms_since(epoch), 2_500);
        assert_eq!(c.unix_time(), Some(1_002));
    }

    #[test]
    fn wall_time_absent_until_set() {
        let c = ManualClock::new();
        assert_eq!(c.unix_time(), None);
        c.advance(Duration::from_secs(10));
        c.set_wall_time(500);
        assert_eq!(c.unix_time(), Some(500));
        c.clear_wall_time();
        assert_eq!(c.unix_time(), None);
    }
}
