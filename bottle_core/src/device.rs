//! Per-wake orchestration of all subsystems.
//!
//! `wake` rebuilds per-wake state, restores the activity recorder from
//! retained memory and activates the drink tracker; `tick` runs one pass of
//! the pipeline; `prepare_sleep` records the wake and writes retained state
//! back. The same `Bottle` may be reused across wake cycles.

use std::sync::Arc;

use bottle_traits::{Accelerometer, Clock, LoadCell, RetainedMemory, Store, WallClock};

use crate::activity::{ActivityRecorder, BackpackSession, MotionWakeEvent, SleepType, WakeReason};
use crate::calibration::{CalibrationData, water_weight_g};
use crate::config::BottleCfg;
use crate::drinks::{DailyTotals, DrinkEvent, DrinkRecord, DrinkTracker};
use crate::error::{BottleError, Result};
use crate::gesture::{Accel, Gesture, GestureClassifier};
use crate::hw_error::map_sensor_error;
use crate::measurement::{Measure, WeightSensor};
use crate::remote::{CalPoint, RemoteCalibration, RemoteStatus};
use crate::storage;
use crate::workflow::{CalState, CalTick, CalibrationWorkflow};

/// Retained region holding the activity recorder image.
pub const ACTIVITY_REGION: &str = "activity";

/// What happened during one `tick`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub now_ms: u64,
    pub gesture: Gesture,
    pub calibration: CalState,
    pub drink: Option<DrinkEvent>,
    /// Set when a calibration finished on this tick (either flow).
    pub calibrated: Option<CalibrationData>,
}

pub struct Bottle {
    pub(crate) cfg: BottleCfg,
    pub(crate) sensor: WeightSensor<Box<dyn LoadCell>>,
    pub(crate) accel: Box<dyn Accelerometer>,
    pub(crate) store: Box<dyn Store>,
    pub(crate) retained: Box<dyn RetainedMemory>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) wall: Arc<dyn WallClock + Send + Sync>,
    pub(crate) epoch: std::time::Instant,
    pub(crate) classifier: GestureClassifier,
    pub(crate) workflow: CalibrationWorkflow,
    pub(crate) remote: RemoteCalibration,
    pub(crate) drinks: DrinkTracker,
    pub(crate) activity: ActivityRecorder,
    pub(crate) calibration: Option<CalibrationData>,
    pub(crate) factory: Option<CalibrationData>,
    pub(crate) last_drink_check_ms: Option<u64>,
}

impl core::fmt::Debug for Bottle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bottle")
            .field("calibration", &self.calibration)
            .field("workflow", &self.workflow.state())
            .field("drinks_active", &self.drinks.is_active())
            .field("totals", &self.drinks.totals())
            .finish()
    }
}

impl Bottle {
    pub fn cfg(&self) -> &BottleCfg {
        &self.cfg
    }

    pub fn calibration(&self) -> Option<CalibrationData> {
        self.calibration
    }

    pub fn classifier(&self) -> &GestureClassifier {
        &self.classifier
    }

    pub fn workflow(&self) -> &CalibrationWorkflow {
        &self.workflow
    }

    pub fn drinks(&self) -> &DrinkTracker {
        &self.drinks
    }

    pub fn activity(&self) -> &ActivityRecorder {
        &self.activity
    }

    pub fn store(&self) -> &dyn Store {
        &*self.store
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    fn wall_time(&self) -> Option<u32> {
        self.wall.unix_time()
    }

    /// Wall time for activity records; 0 when the clock was never set.
    fn stamp(&self) -> u32 {
        self.wall_time().unwrap_or(0)
    }

    fn usable_calibration(&self) -> Option<&CalibrationData> {
        self.calibration.as_ref().filter(|c| c.is_usable())
    }

    /// Start of a wake cycle. Everything but retained memory and the store
    /// starts fresh, as after a reset out of deep sleep.
    pub fn wake(&mut self, reason: WakeReason) {
        self.classifier = GestureClassifier::new(self.cfg.gesture);
        let min_samples = self.cfg.measurement.stats.min_samples;
        self.workflow = CalibrationWorkflow::new(self.cfg.calibration, min_samples);
        self.remote = RemoteCalibration::new(self.cfg.calibration, min_samples);
        self.drinks = DrinkTracker::new(self.cfg.drinks);
        self.epoch = self.clock.now();

        let len = ActivityRecorder::encoded_len(self.cfg.activity);
        self.activity =
            ActivityRecorder::restore(self.retained.region(ACTIVITY_REGION, len), self.cfg.activity);

        self.calibration = match storage::load_calibration(&*self.store) {
            Ok(Some(c)) => Some(c),
            Ok(None) => self.seed_factory_calibration(),
            Err(e) => {
                tracing::warn!(error = %e, "calibration unreadable");
                self.factory.filter(|f| f.valid)
            }
        };

        self.try_activate_drinks();
        let ts = self.stamp();
        self.activity
            .on_wake(reason, ts, self.drinks.totals().drink_count);
        self.last_drink_check_ms = None;
        tracing::info!(
            ?reason,
            calibrated = self.usable_calibration().is_some(),
            drinks_active = self.drinks.is_active(),
            "wake"
        );
    }

    fn seed_factory_calibration(&mut self) -> Option<CalibrationData> {
        let factory = self.factory.filter(|f| f.valid)?;
        match storage::save_calibration(&mut *self.store, &factory) {
            Ok(()) => tracing::info!(scale_factor = factory.scale_factor, "factory calibration seeded"),
            Err(e) => tracing::warn!(error = %e, "factory calibration not persisted"),
        }
        Some(factory)
    }

    fn try_activate_drinks(&mut self) {
        if self.drinks.is_active() {
            return;
        }
        match self.drinks.activate(self.wall.unix_time(), &mut *self.store) {
            Ok(()) => {}
            Err(BottleError::TimeUnavailable) => {
                tracing::debug!("drink tracking waits for wall time");
            }
            Err(e) => tracing::warn!(error = %e, "drink tracker activation failed"),
        }
    }

    fn read_accel(&mut self) -> Option<Accel> {
        match self.accel.read_raw() {
            Ok(raw) => Some(Accel::from_raw(raw, self.cfg.gesture.lsb_per_g)),
            Err(e) => {
                tracing::warn!(error = %map_sensor_error(&*e), "accelerometer read failed");
                None
            }
        }
    }

    /// One pass of the sensor-to-event pipeline.
    pub fn tick(&mut self) -> TickReport {
        let now_ms = self.now_ms();
        let ts = self.wall_time();
        let raw = self.sensor.read_raw();
        let weight_g = raw.and_then(|r| self.usable_calibration().and_then(|c| water_weight_g(r, c)));

        let gesture = match self.read_accel() {
            Some(a) => self.classifier.update(a, weight_g, now_ms),
            None => Gesture::None,
        };

        let mut calibrated = None;
        if gesture == Gesture::InvertedHold && !self.workflow.is_active() && !self.remote.is_active() {
            if let Err(e) = self.workflow.start(&mut self.classifier, now_ms) {
                tracing::debug!(error = %e, "calibration start refused");
            }
        } else if self.workflow.is_active() {
            let t = CalTick {
                now_ms,
                gesture,
                timestamp: ts.unwrap_or(0),
            };
            let state = self.workflow.tick(
                t,
                &mut self.classifier,
                &mut self.sensor,
                &mut *self.store,
            );
            if state == CalState::Complete {
                calibrated = self.workflow.result();
            }
        }
        if let Some(Ok(c)) = self
            .remote
            .poll(&mut self.sensor, &mut *self.store, ts.unwrap_or(0))
        {
            calibrated = Some(c);
        }
        if let Some(c) = calibrated {
            self.calibration = Some(c);
        }

        self.try_activate_drinks();
        if let Some(ts) = ts.filter(|_| self.drinks.is_active()) {
            if let Err(e) = self.drinks.check_rollover(ts, &mut *self.store) {
                tracing::warn!(error = %e, "rollover check failed");
            }
        }

        // the baseline is taken on a later tick, under the new calibration
        let drink = if calibrated.is_some() {
            None
        } else {
            self.maybe_update_drinks(gesture, raw, ts, now_ms)
        };
        TickReport {
            now_ms,
            gesture,
            calibration: self.workflow.state(),
            drink,
            calibrated,
        }
    }

    fn maybe_update_drinks(
        &mut self,
        gesture: Gesture,
        raw: Option<i32>,
        ts: Option<u32>,
        now_ms: u64,
    ) -> Option<DrinkEvent> {
        if gesture != Gesture::UprightStable
            || self.workflow.is_active()
            || self.remote.is_active()
            || !self.drinks.is_active()
        {
            return None;
        }
        if let Some(last) = self.last_drink_check_ms {
            if now_ms.saturating_sub(last) < self.cfg.drinks.check_interval_ms {
                return None;
            }
        }
        let (raw, ts, cal) = (raw?, ts?, *self.usable_calibration()?);
        self.last_drink_check_ms = Some(now_ms);
        match self.drinks.update(raw, &cal, ts, &mut *self.store) {
            Ok(ev) => Some(ev),
            Err(e) => {
                tracing::warn!(error = %e, "drink update failed");
                None
            }
        }
    }

    /// Record the wake, flush pending state and write retained memory.
    pub fn prepare_sleep(&mut self, sleep: SleepType) {
        let ts = self.stamp();
        let drinks = self.drinks.totals().drink_count;
        match sleep {
            SleepType::Normal => self.activity.on_shallow_sleep(ts, drinks),
            SleepType::Extended => self.activity.on_extended_sleep(ts, drinks),
        }
        self.drinks.flush(&mut *self.store);
        let len = ActivityRecorder::encoded_len(self.cfg.activity);
        self.activity
            .persist(self.retained.region(ACTIVITY_REGION, len));
        tracing::info!(?sleep, awake_ms = self.now_ms(), "sleeping");
    }

    // ── Transport-facing operations ─────────────────────────────────────────

    pub fn totals(&self) -> DailyTotals {
        self.drinks.totals()
    }

    pub fn current_session_ml(&self) -> u32 {
        self.drinks.current_session_ml(self.stamp())
    }

    pub fn recompute_totals(&mut self) -> Result<DailyTotals> {
        self.drinks.recompute_totals(&mut *self.store)
    }

    pub fn delete_drink(&mut self, record_id: u32) -> Result<DrinkRecord> {
        self.drinks.delete_by_id(record_id, &mut *self.store)
    }

    pub fn cancel_last_drink(&mut self) -> Result<Option<DrinkRecord>> {
        self.drinks.cancel_last_drink(&mut *self.store)
    }

    pub fn reset_daily(&mut self) -> Result<usize> {
        self.drinks.reset_daily(&mut *self.store)
    }

    pub fn drink_records(&self) -> Result<Vec<DrinkRecord>> {
        self.drinks.records(&*self.store)
    }

    pub fn unsynced_records(&self) -> Result<Vec<DrinkRecord>> {
        self.drinks.unsynced(&*self.store)
    }

    pub fn mark_synced(&mut self, up_to_id: u32) -> Result<usize> {
        self.drinks.mark_synced(up_to_id, &mut *self.store)
    }

    pub fn motion_page(&self, offset: usize, limit: usize) -> Vec<MotionWakeEvent> {
        self.activity.motion_page(offset, limit)
    }

    pub fn session_page(&self, offset: usize, limit: usize) -> Vec<BackpackSession> {
        self.activity.session_page(offset, limit)
    }

    pub fn calibration_start(&mut self) -> Result<()> {
        if self.workflow.is_active() {
            return Err(BottleError::Busy("gesture calibration running"));
        }
        self.remote.start();
        Ok(())
    }

    pub fn calibration_cancel(&mut self) {
        self.remote.cancel();
        if self.workflow.is_active() {
            let now = self.now_ms();
            self.workflow.cancel(&mut self.classifier, now);
        }
    }

    pub fn calibration_measure(&mut self, point: CalPoint) -> Result<()> {
        self.remote.request_point(point)
    }

    pub fn calibration_status(&self) -> RemoteStatus {
        self.remote.status()
    }

    /// Overwrite the calibration from the transport after validating it.
    pub fn write_calibration(&mut self, data: CalibrationData) -> Result<()> {
        data.check(self.cfg.calibration.max_scale_factor)?;
        let data = CalibrationData { valid: true, ..data };
        storage::save_calibration(&mut *self.store, &data)?;
        tracing::info!(scale_factor = data.scale_factor, "calibration written");
        self.calibration = Some(data);
        Ok(())
    }

    /// Sensor snapshot for diagnostics.
    pub fn read_raw_weight(&mut self) -> Option<i32> {
        self.sensor.read_raw()
    }
}
