//! Gesture-driven two-point calibration state machine.
//!
//! Idle -> Triggered -> Started -> WaitEmpty -> MeasureEmpty -> WaitFull
//! -> MeasureFull -> Complete, with `Error(reason)` as the failure terminal.
//! The caller drives it with one `tick` per loop iteration; every timeout is
//! evaluated from the `now_ms` it supplies.

use bottle_traits::Store;

use crate::calibration::CalibrationData;
use crate::config::CalibrationCfg;
use crate::error::BottleError;
use crate::gesture::{Gesture, GestureClassifier};
use crate::measurement::Measure;
use crate::storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalFailure {
    Timeout,
    Rejected,
    Persistence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalState {
    Idle,
    Triggered,
    Started,
    WaitEmpty,
    MeasureEmpty,
    WaitFull,
    MeasureFull,
    Complete,
    Error(CalFailure),
}

impl CalState {
    /// States in which the workflow owns the sensors.
    pub fn is_active(self) -> bool {
        !matches!(self, CalState::Idle | CalState::Complete | CalState::Error(_))
    }
}

/// Per-tick inputs.
#[derive(Debug, Clone, Copy)]
pub struct CalTick {
    pub now_ms: u64,
    pub gesture: Gesture,
    /// Wall time stamped onto a successful calibration (0 when unknown).
    pub timestamp: u32,
}

#[derive(Debug)]
pub struct CalibrationWorkflow {
    cfg: CalibrationCfg,
    min_samples: usize,
    state: CalState,
    state_since_ms: u64,
    empty_adc: Option<i32>,
    full_adc: Option<i32>,
    /// Reference reading and start time of the current full-bottle hold.
    hold: Option<(i32, u64)>,
    result: Option<CalibrationData>,
    last_error: Option<BottleError>,
}

impl CalibrationWorkflow {
    pub fn new(cfg: CalibrationCfg, min_samples: usize) -> Self {
        Self {
            cfg,
            min_samples,
            state: CalState::Idle,
            state_since_ms: 0,
            empty_adc: None,
            full_adc: None,
            hold: None,
            result: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> CalState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn empty_adc(&self) -> Option<i32> {
        self.empty_adc
    }

    pub fn full_adc(&self) -> Option<i32> {
        self.full_adc
    }

    /// Calibration produced by the last successful run.
    pub fn result(&self) -> Option<CalibrationData> {
        self.result
    }

    /// Error that moved the workflow into `Error`, if any.
    pub fn last_error(&self) -> Option<&BottleError> {
        self.last_error.as_ref()
    }

    fn enter(&mut self, next: CalState, now_ms: u64) {
        if next != self.state {
            tracing::info!(from = ?self.state, to = ?next, now_ms, "calibration state");
        }
        self.state = next;
        self.state_since_ms = now_ms;
    }

    fn elapsed(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.state_since_ms)
    }

    /// Begin a run. Allowed from Idle, Complete and Error.
    pub fn start(&mut self, classifier: &mut GestureClassifier, now_ms: u64) -> Result<(), BottleError> {
        if self.is_active() {
            return Err(BottleError::Busy("calibration already running"));
        }
        self.empty_adc = None;
        self.full_adc = None;
        self.hold = None;
        self.result = None;
        self.last_error = None;
        classifier.set_calibration_mode(true);
        self.enter(CalState::Triggered, now_ms);
        Ok(())
    }

    /// Abort any active run and return to Idle.
    pub fn cancel(&mut self, classifier: &mut GestureClassifier, now_ms: u64) {
        if self.is_active() {
            tracing::info!(state = ?self.state, "calibration cancelled");
        }
        self.hold = None;
        classifier.set_calibration_mode(false);
        self.enter(CalState::Idle, now_ms);
    }

    fn fail(&mut self, classifier: &mut GestureClassifier, err: BottleError, now_ms: u64) {
        let reason = match err {
            BottleError::CalibrationTimeout => CalFailure::Timeout,
            BottleError::PersistenceFailure(_) => CalFailure::Persistence,
            _ => CalFailure::Rejected,
        };
        tracing::warn!(error = %err, state = ?self.state, "calibration failed");
        self.last_error = Some(err);
        self.hold = None;
        classifier.set_calibration_mode(false);
        self.enter(CalState::Error(reason), now_ms);
    }

    /// Advance one step.
    pub fn tick<M, S>(
        &mut self,
        t: CalTick,
        classifier: &mut GestureClassifier,
        measurer: &mut M,
        store: &mut S,
    ) -> CalState
    where
        M: Measure + ?Sized,
        S: Store + ?Sized,
    {
        if !self.is_active() {
            return self.state;
        }
        if t.gesture == Gesture::InvertedHold {
            self.cancel(classifier, t.now_ms);
            return self.state;
        }

        match self.state {
            CalState::Triggered => self.enter(CalState::Started, t.now_ms),
            CalState::Started => {
                if self.elapsed(t.now_ms) >= self.cfg.started_dwell_ms {
                    self.enter(CalState::WaitEmpty, t.now_ms);
                }
            }
            CalState::WaitEmpty => {
                if self.elapsed(t.now_ms) >= self.cfg.empty_timeout_ms {
                    self.fail(classifier, BottleError::CalibrationTimeout, t.now_ms);
                } else if t.gesture == Gesture::UprightStable {
                    self.enter(CalState::MeasureEmpty, t.now_ms);
                }
            }
            CalState::MeasureEmpty => match measurer.measure().check(self.min_samples) {
                Ok(adc) => {
                    tracing::info!(empty_adc = adc, "empty point captured");
                    self.empty_adc = Some(adc);
                    self.hold = None;
                    self.enter(CalState::WaitFull, t.now_ms);
                }
                Err(e) => {
                    tracing::info!(error = %e, "empty measurement not usable; waiting again");
                    self.enter(CalState::WaitEmpty, t.now_ms);
                }
            },
            CalState::WaitFull => {
                if self.elapsed(t.now_ms) >= self.cfg.full_timeout_ms {
                    self.fail(classifier, BottleError::CalibrationTimeout, t.now_ms);
                } else if let Some(raw) = measurer.read_raw() {
                    self.track_full_hold(raw, t.now_ms);
                }
            }
            CalState::MeasureFull => match measurer.measure().check(self.min_samples) {
                Ok(adc) => {
                    tracing::info!(full_adc = adc, "full point captured");
                    self.full_adc = Some(adc);
                    self.finish(classifier, store, t);
                }
                Err(e) => {
                    tracing::info!(error = %e, "full measurement not usable; waiting again");
                    self.hold = None;
                    self.enter(CalState::WaitFull, t.now_ms);
                }
            },
            CalState::Idle | CalState::Complete | CalState::Error(_) => {}
        }
        self.state
    }

    fn track_full_hold(&mut self, raw: i32, now_ms: u64) {
        let Some(empty) = self.empty_adc else {
            return;
        };
        let delta = i64::from(raw) - i64::from(empty);
        if delta < i64::from(self.cfg.full_delta_threshold_adc()) {
            self.hold = None;
            return;
        }
        let tol = i64::from(self.cfg.hold_tolerance_adc());
        match self.hold {
            Some((reference, since)) if (i64::from(raw) - i64::from(reference)).abs() <= tol => {
                if now_ms.saturating_sub(since) >= self.cfg.full_hold_ms {
                    self.hold = None;
                    self.enter(CalState::MeasureFull, now_ms);
                }
            }
            _ => {
                tracing::debug!(raw, "full-bottle hold (re)started");
                self.hold = Some((raw, now_ms));
            }
        }
    }

    fn finish<S: Store + ?Sized>(&mut self, classifier: &mut GestureClassifier, store: &mut S, t: CalTick) {
        let (Some(empty), Some(full)) = (self.empty_adc, self.full_adc) else {
            self.fail(
                classifier,
                BottleError::CalibrationInvalid("missing calibration point"),
                t.now_ms,
            );
            return;
        };
        let data = match CalibrationData::from_points(
            empty,
            full,
            self.cfg.water_volume_ml,
            self.cfg.water_density,
            self.cfg.max_scale_factor,
            t.timestamp,
        ) {
            Ok(d) => d,
            Err(e) => {
                self.fail(classifier, e, t.now_ms);
                return;
            }
        };
        if let Err(e) = storage::save_calibration(store, &data) {
            self.fail(classifier, e, t.now_ms);
            return;
        }
        tracing::info!(
            scale_factor = data.scale_factor,
            empty_adc = data.empty_adc,
            full_adc = data.full_adc,
            "calibration complete"
        );
        self.result = Some(data);
        classifier.set_calibration_mode(false);
        self.enter(CalState::Complete, t.now_ms);
    }
}
