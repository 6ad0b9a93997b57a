//! Retained-memory image of the activity recorder.
//!
//! Fixed little-endian layout:
//!
//! ```text
//! magic u32 | version u8 | motion_cap u16 | session_cap u16
//! motion:   write_index u16 | count u16 | motion_cap * 7 bytes
//! sessions: write_index u16 | count u16 | session_cap * 11 bytes
//! current:  present u8 | start u32 | timer_wakes u16
//! wake:     reason u8 | started_at u32 | drinks_at_wake u16 | recorded u8
//! ```
//!
//! A wake event is `timestamp u32 | awake u16 | status u8`; the status byte
//! packs reason (bits 0-1), sleep type (bit 2) and the drink flag (bit 7).
//! Retained RAM is never assumed zeroed: anything that fails to decode is
//! treated as a power loss.

use crate::activity::{
    BackpackSession, CurrentSession, MotionWakeEvent, SessionExit, SleepType, WakeReason, WakeState,
};
use crate::config::ActivityCfg;
use crate::ring::RingLog;

pub const MAGIC: u32 = 0xB071_7E5A;
pub const VERSION: u8 = 1;
/// Largest log capacity the `u16` header fields can describe.
pub const MAX_CAPACITY: usize = 65_535;

const HEADER_LEN: usize = 4 + 1 + 2 + 2;
const RING_HEAD_LEN: usize = 4;
const EVENT_LEN: usize = 7;
const SESSION_LEN: usize = 11;
const CURRENT_LEN: usize = 7;
const WAKE_LEN: usize = 8;

const DRINK_FLAG: u8 = 0x80;
const EXTENDED_FLAG: u8 = 0x04;
const REASON_MASK: u8 = 0x03;

#[derive(Debug, Clone, PartialEq)]
pub struct RetainedActivity {
    pub motion: RingLog<MotionWakeEvent>,
    pub sessions: RingLog<BackpackSession>,
    pub current: Option<CurrentSession>,
    pub wake: WakeState,
}

fn reason_code(r: WakeReason) -> u8 {
    match r {
        WakeReason::Motion => 0,
        WakeReason::Timer => 1,
        WakeReason::PowerOn => 2,
        WakeReason::Other => 3,
    }
}

fn reason_from(code: u8) -> WakeReason {
    match code & REASON_MASK {
        0 => WakeReason::Motion,
        1 => WakeReason::Timer,
        2 => WakeReason::PowerOn,
        _ => WakeReason::Other,
    }
}

/// Pack the logical event fields into the one-byte status.
pub fn pack_status(ev: &MotionWakeEvent) -> u8 {
    let mut b = reason_code(ev.wake_reason);
    if ev.sleep_type == SleepType::Extended {
        b |= EXTENDED_FLAG;
    }
    if ev.drink_taken {
        b |= DRINK_FLAG;
    }
    b
}

/// `(reason, sleep_type, drink_taken)` from a status byte; `None` if reserved
/// bits are set.
pub fn unpack_status(b: u8) -> Option<(WakeReason, SleepType, bool)> {
    if b & !(DRINK_FLAG | EXTENDED_FLAG | REASON_MASK) != 0 {
        return None;
    }
    let sleep = if b & EXTENDED_FLAG != 0 {
        SleepType::Extended
    } else {
        SleepType::Normal
    };
    Some((reason_from(b), sleep, b & DRINK_FLAG != 0))
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn bytes(&mut self, b: &[u8]) {
        self.buf[self.pos..self.pos + b.len()].copy_from_slice(b);
        self.pos += b.len();
    }
    fn u8(&mut self, v: u8) {
        self.bytes(&[v]);
    }
    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let s = self.buf.get(self.pos..self.pos + N)?;
        self.pos += N;
        s.try_into().ok()
    }
    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|b| b[0])
    }
    fn u16(&mut self) -> Option<u16> {
        self.take::<2>().map(u16::from_le_bytes)
    }
    fn u32(&mut self) -> Option<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }
}

impl RetainedActivity {
    pub fn new(cfg: ActivityCfg) -> Self {
        Self {
            motion: RingLog::new(cfg.motion_log_capacity),
            sessions: RingLog::new(cfg.session_log_capacity),
            current: None,
            wake: WakeState::default(),
        }
    }

    pub fn encoded_len(cfg: ActivityCfg) -> usize {
        HEADER_LEN
            + RING_HEAD_LEN
            + cfg.motion_log_capacity.max(1) * EVENT_LEN
            + RING_HEAD_LEN
            + cfg.session_log_capacity.max(1) * SESSION_LEN
            + CURRENT_LEN
            + WAKE_LEN
    }

    /// Serialize into `buf`. The marker is written last so an interrupted
    /// write never validates. Does nothing if `buf` is too short or a
    /// capacity exceeds `MAX_CAPACITY`.
    pub fn encode(&self, buf: &mut [u8]) {
        let cfg = ActivityCfg {
            motion_log_capacity: self.motion.capacity(),
            session_log_capacity: self.sessions.capacity(),
        };
        let len = Self::encoded_len(cfg);
        if buf.len() < len {
            tracing::warn!(have = buf.len(), need = len, "retained region too small");
            return;
        }
        // indices and counts never exceed the capacity
        let (Ok(motion_cap), Ok(session_cap)) = (
            u16::try_from(self.motion.capacity()),
            u16::try_from(self.sessions.capacity()),
        ) else {
            tracing::warn!(
                motion = self.motion.capacity(),
                sessions = self.sessions.capacity(),
                "activity log capacity exceeds retained header"
            );
            return;
        };
        let mut w = Writer { buf, pos: 0 };
        w.u32(0);
        w.u8(VERSION);
        w.u16(motion_cap);
        w.u16(session_cap);

        w.u16(self.motion.write_index() as u16);
        w.u16(self.motion.len() as u16);
        for ev in self.motion.slots() {
            w.u32(ev.timestamp);
            w.u16(ev.awake_duration_sec);
            w.u8(pack_status(ev));
        }

        w.u16(self.sessions.write_index() as u16);
        w.u16(self.sessions.len() as u16);
        for s in self.sessions.slots() {
            w.u32(s.start_timestamp);
            w.u32(s.duration_sec);
            w.u16(s.timer_wake_count);
            w.u8(match s.exit_reason {
                SessionExit::MotionDetected => 0,
                SessionExit::PowerCycle => 1,
            });
        }

        let cur = self.current.unwrap_or_default();
        w.u8(u8::from(self.current.is_some()));
        w.u32(cur.start_timestamp);
        w.u16(cur.timer_wake_count);

        w.u8(reason_code(self.wake.reason));
        w.u32(self.wake.started_at);
        w.u16(self.wake.drink_count_at_wake);
        w.u8(u8::from(self.wake.recorded));

        w.buf[..4].copy_from_slice(&MAGIC.to_le_bytes());
    }

    /// Decode an image written for the same capacities.
    pub fn decode(buf: &[u8], cfg: ActivityCfg) -> Option<Self> {
        let mut r = Reader { buf, pos: 0 };
        if r.u32()? != MAGIC || r.u8()? != VERSION {
            return None;
        }
        let motion_cap = usize::from(r.u16()?);
        let session_cap = usize::from(r.u16()?);
        if motion_cap != cfg.motion_log_capacity.max(1)
            || session_cap != cfg.session_log_capacity.max(1)
        {
            return None;
        }

        let (wi, count) = (usize::from(r.u16()?), usize::from(r.u16()?));
        let mut events = Vec::with_capacity(motion_cap);
        for _ in 0..motion_cap {
            let timestamp = r.u32()?;
            let awake_duration_sec = r.u16()?;
            let (wake_reason, sleep_type, drink_taken) = unpack_status(r.u8()?)?;
            events.push(MotionWakeEvent {
                timestamp,
                awake_duration_sec,
                wake_reason,
                sleep_type,
                drink_taken,
            });
        }
        let motion = RingLog::from_parts(events, wi, count)?;

        let (wi, count) = (usize::from(r.u16()?), usize::from(r.u16()?));
        let mut sessions = Vec::with_capacity(session_cap);
        for _ in 0..session_cap {
            let start_timestamp = r.u32()?;
            let duration_sec = r.u32()?;
            let timer_wake_count = r.u16()?;
            let exit_reason = match r.u8()? {
                0 => SessionExit::MotionDetected,
                1 => SessionExit::PowerCycle,
                _ => return None,
            };
            sessions.push(BackpackSession {
                start_timestamp,
                duration_sec,
                timer_wake_count,
                exit_reason,
            });
        }
        let sessions = RingLog::from_parts(sessions, wi, count)?;

        let present = r.u8()?;
        let current = CurrentSession {
            start_timestamp: r.u32()?,
            timer_wake_count: r.u16()?,
        };
        let current = match present {
            0 => None,
            1 => Some(current),
            _ => return None,
        };

        let reason = r.u8()?;
        if reason > REASON_MASK {
            return None;
        }
        let wake = WakeState {
            reason: reason_from(reason),
            started_at: r.u32()?,
            drink_count_at_wake: r.u16()?,
            recorded: r.u8()? != 0,
        };

        Some(Self {
            motion,
            sessions,
            current,
            wake,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ActivityCfg {
        ActivityCfg {
            motion_log_capacity: 3,
            session_log_capacity: 2,
        }
    }

    #[test]
    fn status_byte_packing() {
        let ev = MotionWakeEvent {
            timestamp: 0,
            awake_duration_sec: 0,
            wake_reason: WakeReason::Timer,
            sleep_type: SleepType::Extended,
            drink_taken: true,
        };
        let b = pack_status(&ev);
        assert_eq!(b, 0x80 | 0x04 | 0x01);
        assert_eq!(
            unpack_status(b),
            Some((WakeReason::Timer, SleepType::Extended, true))
        );
        assert_eq!(unpack_status(0x10), None);
    }

    #[test]
    fn oversized_capacity_is_not_truncated_into_header() {
        let cfg = ActivityCfg {
            motion_log_capacity: MAX_CAPACITY + 1,
            session_log_capacity: 2,
        };
        let st = RetainedActivity::new(cfg);
        let mut buf = vec![0xA5; RetainedActivity::encoded_len(cfg)];
        st.encode(&mut buf);
        assert!(buf.iter().all(|&b| b == 0xA5));

        let cfg = ActivityCfg {
            motion_log_capacity: MAX_CAPACITY,
            session_log_capacity: 2,
        };
        let st = RetainedActivity::new(cfg);
        let mut buf = vec![0xA5; RetainedActivity::encoded_len(cfg)];
        st.encode(&mut buf);
        assert_eq!(RetainedActivity::decode(&buf, cfg), Some(st));
    }

    #[test]
    fn image_round_trips_after_wraparound() {
        let mut st = RetainedActivity::new(small());
        for t in 0..5u32 {
            st.motion.push(MotionWakeEvent {
                timestamp: t,
                awake_duration_sec: 3,
                wake_reason: WakeReason::Motion,
                sleep_type: SleepType::Normal,
                drink_taken: t % 2 == 0,
            });
        }
        st.current = Some(CurrentSession {
            start_timestamp: 42,
            timer_wake_count: 7,
        });
        let mut buf = vec![0xAAu8; RetainedActivity::encoded_len(small())];
        st.encode(&mut buf);
        assert_eq!(RetainedActivity::decode(&buf, small()), Some(st));
    }

    #[test]
    fn garbage_and_mismatched_layouts_are_rejected() {
        let buf = vec![0x5Au8; RetainedActivity::encoded_len(small())];
        assert_eq!(RetainedActivity::decode(&buf, small()), None);

        let mut img = vec![0u8; RetainedActivity::encoded_len(small())];
        RetainedActivity::new(small()).encode(&mut img);
        let bigger = ActivityCfg {
            motion_log_capacity: 4,
            ..small()
        };
        assert_eq!(RetainedActivity::decode(&img, bigger), None);
        assert_eq!(RetainedActivity::decode(&img[..10], small()), None);
    }

    #[test]
    fn short_region_is_left_untouched() {
        let mut buf = vec![0u8; 8];
        RetainedActivity::new(small()).encode(&mut buf);
        assert_eq!(buf, vec![0u8; 8]);
    }
}
