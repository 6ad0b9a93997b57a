//! Rolling-window accelerometer gesture classifier.
//!
//! Classification priority per tick: inverted-hold, sideways-tilt,
//! upright-stable, none. Inverted-hold is edge-triggered: it fires once after
//! the hold time and stays latched until the bottle has been out of the
//! inverted orientation for the cooldown window.

use std::collections::VecDeque;

use crate::config::GestureCfg;

/// One accelerometer reading in g.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accel {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Accel {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Convert raw counts using a fixed counts-per-g factor.
    pub fn from_raw(raw: [i16; 3], lsb_per_g: f32) -> Self {
        Self {
            x: f32::from(raw[0]) / lsb_per_g,
            y: f32::from(raw[1]) / lsb_per_g,
            z: f32::from(raw[2]) / lsb_per_g,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    None,
    InvertedHold,
    SidewaysTilt,
    UprightStable,
}

/// Inverted-hold latch phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvertLatch {
    /// Not inverted, or inverted but not yet held long enough.
    Armed { inverted_since: Option<u64> },
    /// Fired; waiting for the bottle to leave the inverted orientation.
    Fired,
    /// Left inverted after firing; re-arms once `since + cooldown` passes.
    Cooldown { since: u64 },
}

pub struct GestureClassifier {
    cfg: GestureCfg,
    window: VecDeque<Accel>,
    latest: Option<Accel>,
    latch: InvertLatch,
    calibration_mode: bool,
    weight_ref: Option<f32>,
    weight_since_ms: u64,
    last: Gesture,
}

impl core::fmt::Debug for GestureClassifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GestureClassifier")
            .field("latest", &self.latest)
            .field("latch", &self.latch)
            .field("calibration_mode", &self.calibration_mode)
            .field("last", &self.last)
            .finish()
    }
}

impl GestureClassifier {
    pub fn new(cfg: GestureCfg) -> Self {
        Self {
            window: VecDeque::with_capacity(cfg.window.max(1)),
            cfg,
            latest: None,
            latch: InvertLatch::Armed {
                inverted_since: None,
            },
            calibration_mode: false,
            weight_ref: None,
            weight_since_ms: 0,
            last: Gesture::None,
        }
    }

    pub fn cfg(&self) -> &GestureCfg {
        &self.cfg
    }

    /// Accelerometer-only upright detection, used while calibrating.
    pub fn set_calibration_mode(&mut self, on: bool) {
        if self.calibration_mode != on {
            tracing::debug!(on, "gesture calibration mode");
        }
        self.calibration_mode = on;
    }

    pub fn calibration_mode(&self) -> bool {
        self.calibration_mode
    }

    pub fn latest(&self) -> Option<Accel> {
        self.latest
    }

    pub fn last_gesture(&self) -> Gesture {
        self.last
    }

    /// Forget the window, timers and latch (e.g. after a long sleep).
    pub fn reset(&mut self) {
        self.window.clear();
        self.latest = None;
        self.latch = InvertLatch::Armed {
            inverted_since: None,
        };
        self.weight_ref = None;
        self.weight_since_ms = 0;
        self.last = Gesture::None;
    }

    /// Summed per-axis population variance of a full window (g²).
    pub fn window_variance(&self) -> Option<f32> {
        if self.window.len() < self.cfg.window.max(1) {
            return None;
        }
        let n = self.window.len() as f32;
        let (mut sx, mut sy, mut sz) = (0.0f32, 0.0f32, 0.0f32);
        for a in &self.window {
            sx += a.x;
            sy += a.y;
            sz += a.z;
        }
        let (mx, my, mz) = (sx / n, sy / n, sz / n);
        let mut var = 0.0f32;
        for a in &self.window {
            var += (a.x - mx).powi(2) + (a.y - my).powi(2) + (a.z - mz).powi(2);
        }
        Some(var / n)
    }

    pub fn is_accel_stable(&self) -> bool {
        self.window_variance()
            .is_some_and(|v| v < self.cfg.stability_variance)
    }

    /// True once the supplied weight has stayed in band for the dwell time.
    pub fn is_weight_stable(&self, now_ms: u64) -> bool {
        self.weight_ref.is_some()
            && now_ms.saturating_sub(self.weight_since_ms) >= self.cfg.weight_dwell_ms
    }

    fn track_weight(&mut self, weight_g: Option<f32>, now_ms: u64) {
        match (weight_g, self.weight_ref) {
            (None, _) => self.weight_ref = None,
            (Some(w), Some(r)) if (w - r).abs() <= self.cfg.weight_tolerance_g => {}
            (Some(w), _) => {
                self.weight_ref = Some(w);
                self.weight_since_ms = now_ms;
            }
        }
    }

    /// Returns true exactly on the tick the inverted hold fires.
    fn track_inverted(&mut self, inverted: bool, now_ms: u64) -> bool {
        self.latch = match (self.latch, inverted) {
            (InvertLatch::Armed { .. }, false) => InvertLatch::Armed {
                inverted_since: None,
            },
            (InvertLatch::Armed { inverted_since }, true) => {
                let since = inverted_since.unwrap_or(now_ms);
                if now_ms.saturating_sub(since) >= self.cfg.inverted_hold_ms {
                    self.latch = InvertLatch::Fired;
                    return true;
                }
                InvertLatch::Armed {
                    inverted_since: Some(since),
                }
            }
            (InvertLatch::Fired, true) => InvertLatch::Fired,
            (InvertLatch::Fired, false) => InvertLatch::Cooldown { since: now_ms },
            (InvertLatch::Cooldown { .. }, true) => InvertLatch::Fired,
            (InvertLatch::Cooldown { since }, false) => {
                if now_ms.saturating_sub(since) >= self.cfg.inverted_cooldown_ms {
                    InvertLatch::Armed {
                        inverted_since: None,
                    }
                } else {
                    InvertLatch::Cooldown { since }
                }
            }
        };
        false
    }

    /// Feed one reading and classify.
    ///
    /// `weight_g` is the caller's current weight estimate (calibrated grams)
    /// or `None` when no calibrated weight is available.
    pub fn update(&mut self, reading: Accel, weight_g: Option<f32>, now_ms: u64) -> Gesture {
        self.latest = Some(reading);
        if self.window.len() >= self.cfg.window.max(1) {
            self.window.pop_front();
        }
        self.window.push_back(reading);
        self.track_weight(weight_g, now_ms);

        let inverted = reading.z < self.cfg.inverted_z_g;
        let fired = self.track_inverted(inverted, now_ms);

        let gesture = if fired {
            Gesture::InvertedHold
        } else if inverted {
            Gesture::None
        } else if reading.x.abs() > self.cfg.sideways_g || reading.y.abs() > self.cfg.sideways_g {
            Gesture::SidewaysTilt
        } else if reading.z > self.cfg.upright_z_g
            && reading.x.abs() < self.cfg.upright_xy_g
            && reading.y.abs() < self.cfg.upright_xy_g
            && self.is_accel_stable()
            && (self.calibration_mode || self.is_weight_stable(now_ms))
        {
            Gesture::UprightStable
        } else {
            Gesture::None
        };

        if gesture != self.last {
            tracing::debug!(?gesture, previous = ?self.last, now_ms, "gesture change");
        }
        self.last = gesture;
        gesture
    }
}
