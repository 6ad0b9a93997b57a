//! Wake/sleep activity recorder.
//!
//! Records one `MotionWakeEvent` per wake and groups long runs of
//! timer-only wakes (the bottle lying in a bag) into `BackpackSession`s.
//! All state lives in retained memory and survives deep sleep, but not a
//! power cycle.

use crate::config::ActivityCfg;
use crate::retained::RetainedActivity;
use crate::ring::RingLog;
use crate::util::secs_between;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WakeReason {
    Motion,
    Timer,
    #[default]
    PowerOn,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SleepType {
    #[default]
    Normal,
    Extended,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionWakeEvent {
    pub timestamp: u32,
    pub awake_duration_sec: u16,
    pub wake_reason: WakeReason,
    pub sleep_type: SleepType,
    pub drink_taken: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionExit {
    #[default]
    MotionDetected,
    PowerCycle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackpackSession {
    pub start_timestamp: u32,
    pub duration_sec: u32,
    pub timer_wake_count: u16,
    pub exit_reason: SessionExit,
}

/// Mutable head of the session in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurrentSession {
    pub start_timestamp: u32,
    pub timer_wake_count: u16,
}

/// Bookkeeping for the wake currently in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WakeState {
    pub reason: WakeReason,
    pub started_at: u32,
    pub drink_count_at_wake: u16,
    pub recorded: bool,
}

#[derive(Debug)]
pub struct ActivityRecorder {
    state: RetainedActivity,
}

impl ActivityRecorder {
    pub fn new(cfg: ActivityCfg) -> Self {
        Self {
            state: RetainedActivity::new(cfg),
        }
    }

    /// Restore from retained memory; a failed marker check means power was
    /// lost and the recorder starts empty.
    pub fn restore(region: &[u8], cfg: ActivityCfg) -> Self {
        match RetainedActivity::decode(region, cfg) {
            Some(state) => {
                tracing::debug!(
                    events = state.motion.len(),
                    sessions = state.sessions.len(),
                    in_session = state.current.is_some(),
                    "activity state restored"
                );
                Self { state }
            }
            None => {
                tracing::warn!("retained activity invalid; power loss assumed");
                Self::new(cfg)
            }
        }
    }

    /// Write the retained image. Call right before sleeping.
    pub fn persist(&self, region: &mut [u8]) {
        self.state.encode(region);
    }

    pub fn encoded_len(cfg: ActivityCfg) -> usize {
        RetainedActivity::encoded_len(cfg)
    }

    pub fn motion_events(&self) -> &RingLog<MotionWakeEvent> {
        &self.state.motion
    }

    pub fn sessions(&self) -> &RingLog<BackpackSession> {
        &self.state.sessions
    }

    pub fn current_session(&self) -> Option<CurrentSession> {
        self.state.current
    }

    pub fn wake(&self) -> WakeState {
        self.state.wake
    }

    pub fn motion_page(&self, offset: usize, limit: usize) -> Vec<MotionWakeEvent> {
        self.state.motion.page(offset, limit)
    }

    pub fn session_page(&self, offset: usize, limit: usize) -> Vec<BackpackSession> {
        self.state.sessions.page(offset, limit)
    }

    /// Start of a wake cycle.
    pub fn on_wake(&mut self, reason: WakeReason, now_ts: u32, drink_count: u16) {
        self.state.wake = WakeState {
            reason,
            started_at: now_ts,
            drink_count_at_wake: drink_count,
            recorded: false,
        };
        let Some(mut session) = self.state.current else {
            return;
        };
        match reason {
            WakeReason::Motion => self.finalize_session(SessionExit::MotionDetected, now_ts),
            WakeReason::Timer => {
                session.timer_wake_count = session.timer_wake_count.saturating_add(1);
                self.state.current = Some(session);
                // timer wakes inside a session are summarized, not logged
                self.state.wake.recorded = true;
                tracing::debug!(timer_wakes = session.timer_wake_count, "session timer wake");
            }
            WakeReason::PowerOn | WakeReason::Other => {
                self.finalize_session(SessionExit::PowerCycle, now_ts)
            }
        }
    }

    /// Close the running session, if any.
    pub fn finalize_session(&mut self, exit_reason: SessionExit, now_ts: u32) {
        let Some(cur) = self.state.current.take() else {
            return;
        };
        let s = BackpackSession {
            start_timestamp: cur.start_timestamp,
            duration_sec: secs_between(cur.start_timestamp, now_ts),
            timer_wake_count: cur.timer_wake_count,
            exit_reason,
        };
        tracing::info!(
            duration_sec = s.duration_sec,
            timer_wakes = s.timer_wake_count,
            exit = ?exit_reason,
            "backpack session finished"
        );
        self.state.sessions.push(s);
    }

    fn record_wake(&mut self, sleep_type: SleepType, now_ts: u32, drink_count: u16) {
        if self.state.wake.recorded {
            return;
        }
        let w = self.state.wake;
        let ev = MotionWakeEvent {
            timestamp: w.started_at,
            awake_duration_sec: secs_between(w.started_at, now_ts).min(u32::from(u16::MAX)) as u16,
            wake_reason: w.reason,
            sleep_type,
            drink_taken: drink_count != w.drink_count_at_wake,
        };
        tracing::debug!(?ev, "wake recorded");
        self.state.motion.push(ev);
        self.state.wake.recorded = true;
    }

    /// Going to normal (motion-wakeable) sleep.
    pub fn on_shallow_sleep(&mut self, now_ts: u32, drink_count: u16) {
        self.record_wake(SleepType::Normal, now_ts, drink_count);
    }

    /// Going to extended (timer-only) sleep: record the wake once, then
    /// start a session unless one is already running.
    pub fn on_extended_sleep(&mut self, now_ts: u32, drink_count: u16) {
        self.record_wake(SleepType::Extended, now_ts, drink_count);
        if self.state.current.is_none() {
            tracing::info!(start = now_ts, "backpack session started");
            self.state.current = Some(CurrentSession {
                start_timestamp: now_ts,
                timer_wake_count: 0,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec() -> ActivityRecorder {
        ActivityRecorder::new(ActivityCfg::default())
    }

    #[test]
    fn shallow_sleep_records_once_with_drink_flag() {
        let mut a = rec();
        a.on_wake(WakeReason::Motion, 1_000, 3);
        a.on_shallow_sleep(1_030, 4);
        a.on_shallow_sleep(1_040, 4);
        assert_eq!(a.motion_events().len(), 1);
        let ev = *a.motion_events().latest().unwrap();
        assert_eq!(ev.timestamp, 1_000);
        assert_eq!(ev.awake_duration_sec, 30);
        assert!(ev.drink_taken);
        assert_eq!(ev.sleep_type, SleepType::Normal);
    }

    #[test]
    fn extended_sleep_starts_session_and_timer_wakes_count() {
        let mut a = rec();
        a.on_wake(WakeReason::Motion, 100, 0);
        a.on_extended_sleep(160, 0);
        a.on_extended_sleep(170, 0);
        assert_eq!(a.motion_events().len(), 1);
        assert_eq!(a.current_session().unwrap().start_timestamp, 160);

        for t in [1_000, 2_000, 3_000] {
            a.on_wake(WakeReason::Timer, t, 0);
            a.on_extended_sleep(t + 5, 0);
        }
        assert_eq!(a.motion_events().len(), 1, "timer wakes in a session are not logged");
        assert_eq!(a.current_session().unwrap().timer_wake_count, 3);

        a.on_wake(WakeReason::Motion, 5_160, 0);
        assert_eq!(a.current_session(), None);
        let s = *a.sessions().latest().unwrap();
        assert_eq!(s.duration_sec, 5_000);
        assert_eq!(s.timer_wake_count, 3);
        assert_eq!(s.exit_reason, SessionExit::MotionDetected);
        a.on_shallow_sleep(5_200, 0);
        assert_eq!(a.motion_events().len(), 2);
    }

    #[test]
    fn other_wake_closes_session_as_power_cycle() {
        let mut a = rec();
        a.on_wake(WakeReason::Motion, 0, 0);
        a.on_extended_sleep(10, 0);
        a.on_wake(WakeReason::Other, 70, 0);
        assert_eq!(
            a.sessions().latest().unwrap().exit_reason,
            SessionExit::PowerCycle
        );
    }

    #[test]
    fn timer_wake_outside_session_is_logged() {
        let mut a = rec();
        a.on_wake(WakeReason::Timer, 50, 0);
        a.on_shallow_sleep(52, 0);
        assert_eq!(
            a.motion_events().latest().unwrap().wake_reason,
            WakeReason::Timer
        );
    }

    #[test]
    fn survives_retained_round_trip_and_detects_power_loss() {
        let cfg = ActivityCfg::default();
        let mut a = ActivityRecorder::new(cfg);
        a.on_wake(WakeReason::Motion, 10, 0);
        a.on_extended_sleep(20, 1);
        let mut region = vec![0u8; ActivityRecorder::encoded_len(cfg)];
        a.persist(&mut region);

        let b = ActivityRecorder::restore(&region, cfg);
        assert_eq!(b.motion_page(0, 10), a.motion_page(0, 10));
        assert_eq!(b.current_session(), a.current_session());

        region[0] ^= 0xff;
        let c = ActivityRecorder::restore(&region, cfg);
        assert!(c.motion_events().is_empty());
        assert_eq!(c.current_session(), None);
    }
}
