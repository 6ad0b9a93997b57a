//! Drift-compensated drink detection and the daily totals built from the log.
//!
//! The persisted drink log is the single source of truth for the daily total:
//! every mutation is followed by a full recompute over today's records. The
//! in-memory increment used when an append fails is only a stopgap and is
//! replaced by the next successful recompute.

use bottle_traits::Store;
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationData, water_volume_ml};
use crate::config::DrinkCfg;
use crate::error::{BottleError, Result};
use crate::storage::{self, DrinkLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrinkKind {
    Gulp,
    Pour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrinkRecord {
    pub record_id: u32,
    /// UTC seconds.
    pub timestamp: u32,
    /// Positive for water consumed, negative for a logged refill.
    pub amount_ml: i16,
    pub bottle_level_ml: u16,
    pub kind: DrinkKind,
    pub synced: bool,
    pub deleted: bool,
}

impl DrinkRecord {
    /// Counts toward the daily total starting at `day_start`.
    pub fn counts_toward(&self, day_start: u32) -> bool {
        !self.deleted && self.amount_ml > 0 && self.timestamp >= day_start
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyState {
    /// Start of the current day (reset-hour boundary, UTC seconds).
    pub last_reset_timestamp: u32,
    pub last_drink_timestamp: u32,
    pub baseline_adc: Option<i32>,
    pub total_ml: u32,
    pub drink_count: u16,
    /// First drink of the current aggregation window.
    pub window_start: u32,
    pub window_ml: u32,
}

/// Outcome of one `DrinkTracker::update`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrinkEvent {
    /// Baseline (re)established; no detection this tick.
    BaselineSet { level_ml: f32 },
    Drink {
        /// `None` when the append failed and the total runs from memory.
        record_id: Option<u32>,
        amount_ml: i16,
        kind: DrinkKind,
        level_ml: f32,
    },
    Refill { amount_ml: f32, level_ml: f32 },
    /// Small change absorbed into the baseline.
    DriftAdjusted { delta_ml: f32 },
    /// Change between drift and drink thresholds; baseline kept.
    Holding { delta_ml: f32 },
    /// Current reading implies an impossible level; ignored.
    OutOfRange { level_ml: f32 },
}

/// Snapshot for display and transport consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyTotals {
    pub total_ml: u32,
    pub drink_count: u16,
    pub last_drink_timestamp: u32,
    pub storage_warning: bool,
}

#[derive(Debug)]
pub struct DrinkTracker {
    cfg: DrinkCfg,
    log: Option<DrinkLog>,
    state: DailyState,
    storage_warning: bool,
    state_dirty: bool,
}

impl DrinkTracker {
    pub fn new(cfg: DrinkCfg) -> Self {
        Self {
            cfg,
            log: None,
            state: DailyState::default(),
            storage_warning: false,
            state_dirty: false,
        }
    }

    pub fn cfg(&self) -> &DrinkCfg {
        &self.cfg
    }

    pub fn is_active(&self) -> bool {
        self.log.is_some()
    }

    pub fn state(&self) -> &DailyState {
        &self.state
    }

    pub fn totals(&self) -> DailyTotals {
        DailyTotals {
            total_ml: self.state.total_ml,
            drink_count: self.state.drink_count,
            last_drink_timestamp: self.state.last_drink_timestamp,
            storage_warning: self.storage_warning,
        }
    }

    pub fn storage_warning(&self) -> bool {
        self.storage_warning
    }

    /// Amount drunk in the running aggregation window, or 0 once it lapsed.
    pub fn current_session_ml(&self, now_ts: u32) -> u32 {
        if self.state.window_ml > 0
            && now_ts.saturating_sub(self.state.last_drink_timestamp) <= self.cfg.aggregation_window_s
        {
            self.state.window_ml
        } else {
            0
        }
    }

    fn log(&self) -> Result<&DrinkLog> {
        self.log.as_ref().ok_or(BottleError::TimeUnavailable)
    }

    /// Start tracking. Requires wall time to place records in a day.
    pub fn activate<S: Store + ?Sized>(&mut self, wall_time: Option<u32>, store: &mut S) -> Result<()> {
        let now = wall_time.ok_or(BottleError::TimeUnavailable)?;
        let log = DrinkLog::open(store, self.cfg.log_capacity)?;
        self.state = match storage::load_daily_state(store) {
            Ok(Some(s)) => s,
            Ok(None) => DailyState::default(),
            Err(e) => {
                tracing::warn!(error = %e, "daily state unreadable; starting fresh");
                DailyState::default()
            }
        };
        self.log = Some(log);
        let day_start = self.cfg.day.day_start(now);
        if self.state.last_reset_timestamp != day_start {
            tracing::info!(
                previous = self.state.last_reset_timestamp,
                day_start,
                "new day since last activation"
            );
            self.state.last_reset_timestamp = day_start;
            self.state.window_ml = 0;
            self.state_dirty = true;
        }
        if let Err(e) = self.recompute_totals(store) {
            tracing::warn!(error = %e, "recompute on activation failed; using cached totals");
        }
        tracing::info!(
            total_ml = self.state.total_ml,
            drinks = self.state.drink_count,
            records = self.log()?.len(),
            "drink tracker active"
        );
        Ok(())
    }

    /// Rebuild the daily totals from the persisted log. Idempotent.
    pub fn recompute_totals<S: Store + ?Sized>(&mut self, store: &mut S) -> Result<DailyTotals> {
        let day_start = self.state.last_reset_timestamp;
        let records = self.log()?.read_all(store)?;
        let mut total = 0u32;
        let mut count = 0u16;
        let mut last = 0u32;
        for (_, r) in records.iter().filter(|(_, r)| r.counts_toward(day_start)) {
            total += r.amount_ml as u32;
            count = count.saturating_add(1);
            last = last.max(r.timestamp);
        }
        if (total, count) != (self.state.total_ml, self.state.drink_count) {
            tracing::debug!(
                cached = self.state.total_ml,
                recomputed = total,
                "daily total corrected from log"
            );
        }
        self.state.total_ml = total;
        self.state.drink_count = count;
        self.state.last_drink_timestamp = last;
        self.storage_warning = false;
        self.state_dirty = true;
        self.flush(store);
        Ok(self.totals())
    }

    /// Detect a day boundary crossing; on rollover totals restart at zero.
    pub fn check_rollover<S: Store + ?Sized>(&mut self, now_ts: u32, store: &mut S) -> Result<bool> {
        self.log()?;
        let day_start = self.cfg.day.day_start(now_ts);
        if day_start <= self.state.last_reset_timestamp {
            return Ok(false);
        }
        tracing::info!(day_start, total_ml = self.state.total_ml, "daily rollover");
        self.state.last_reset_timestamp = day_start;
        self.state.window_ml = 0;
        self.state.window_start = 0;
        if let Err(e) = self.recompute_totals(store) {
            tracing::warn!(error = %e, "recompute after rollover failed");
            self.state.total_ml = 0;
            self.state.drink_count = 0;
        }
        Ok(true)
    }

    /// Persist daily state if it changed. Failure keeps it dirty for retry.
    pub fn flush<S: Store + ?Sized>(&mut self, store: &mut S) {
        if !self.state_dirty {
            return;
        }
        match storage::save_daily_state(store, &self.state) {
            Ok(()) => self.state_dirty = false,
            Err(e) => tracing::warn!(error = %e, "daily state save failed; will retry"),
        }
    }

    fn set_baseline(&mut self, adc: i32) {
        self.state.baseline_adc = Some(adc);
        self.state_dirty = true;
    }

    fn in_range(&self, level_ml: f32) -> bool {
        (self.cfg.baseline_min_ml..=self.cfg.baseline_max_ml).contains(&level_ml)
    }

    /// Process one calibrated reading taken while the bottle is upright and
    /// still.
    pub fn update<S: Store + ?Sized>(
        &mut self,
        adc: i32,
        cal: &CalibrationData,
        now_ts: u32,
        store: &mut S,
    ) -> Result<DrinkEvent> {
        self.log()?;
        let density = self.cfg.water_density;
        let level_ml = water_volume_ml(adc, cal, density)
            .ok_or(BottleError::CalibrationInvalid("no usable calibration"))?;

        let baseline_ml = self
            .state
            .baseline_adc
            .and_then(|b| water_volume_ml(b, cal, density))
            .filter(|ml| self.in_range(*ml));
        let Some(baseline_ml) = baseline_ml else {
            if !self.in_range(level_ml) {
                return Ok(DrinkEvent::OutOfRange { level_ml });
            }
            tracing::info!(adc, level_ml, "drink baseline established");
            self.set_baseline(adc);
            self.flush(store);
            return Ok(DrinkEvent::BaselineSet { level_ml });
        };
        if !self.in_range(level_ml) {
            tracing::debug!(adc, level_ml, "reading outside plausible level range");
            return Ok(DrinkEvent::OutOfRange { level_ml });
        }

        let delta = baseline_ml - level_ml;
        if delta >= self.cfg.drink_threshold_ml {
            return Ok(self.record_drink(adc, delta, level_ml, now_ts, store));
        }
        if delta <= -self.cfg.refill_threshold_ml {
            tracing::info!(amount_ml = -delta, level_ml, "refill detected");
            self.set_baseline(adc);
            self.flush(store);
            return Ok(DrinkEvent::Refill {
                amount_ml: -delta,
                level_ml,
            });
        }
        if delta.abs() < self.cfg.drift_tolerance_ml {
            if delta != 0.0 {
                self.set_baseline(adc);
            }
            return Ok(DrinkEvent::DriftAdjusted { delta_ml: delta });
        }
        Ok(DrinkEvent::Holding { delta_ml: delta })
    }

    fn record_drink<S: Store + ?Sized>(
        &mut self,
        adc: i32,
        delta: f32,
        level_ml: f32,
        now_ts: u32,
        store: &mut S,
    ) -> DrinkEvent {
        let amount_ml = delta.round().clamp(1.0, f32::from(i16::MAX)) as i16;
        let kind = if delta < self.cfg.pour_threshold_ml {
            DrinkKind::Gulp
        } else {
            DrinkKind::Pour
        };
        let record = DrinkRecord {
            record_id: 0,
            timestamp: now_ts,
            amount_ml,
            bottle_level_ml: level_ml.round().clamp(0.0, f32::from(u16::MAX)) as u16,
            kind,
            synced: false,
            deleted: false,
        };

        let appended = match self.log.as_mut() {
            Some(log) => log.append(store, record),
            None => Err(BottleError::TimeUnavailable),
        };
        let record_id = match appended {
            Ok(id) => {
                tracing::info!(record_id = id, amount_ml, ?kind, level_ml, "drink recorded");
                Some(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, amount_ml, "drink not persisted; counting in memory");
                None
            }
        };

        if self.state.window_ml > 0
            && now_ts.saturating_sub(self.state.last_drink_timestamp) <= self.cfg.aggregation_window_s
        {
            self.state.window_ml += amount_ml as u32;
        } else {
            self.state.window_start = now_ts;
            self.state.window_ml = amount_ml as u32;
        }
        self.set_baseline(adc);

        let recomputed = record_id.is_some() && self.recompute_totals(store).is_ok();
        if !recomputed {
            self.state.total_ml += amount_ml as u32;
            self.state.drink_count = self.state.drink_count.saturating_add(1);
            self.state.last_drink_timestamp = now_ts;
            self.storage_warning = true;
            self.flush(store);
        }
        DrinkEvent::Drink {
            record_id,
            amount_ml,
            kind,
            level_ml,
        }
    }

    /// All records, oldest first.
    pub fn records<S: Store + ?Sized>(&self, store: &S) -> Result<Vec<DrinkRecord>> {
        Ok(self
            .log()?
            .read_all(store)?
            .into_iter()
            .map(|(_, r)| r)
            .collect())
    }

    /// Records the transport has not acknowledged yet.
    pub fn unsynced<S: Store + ?Sized>(&self, store: &S) -> Result<Vec<DrinkRecord>> {
        Ok(self
            .records(store)?
            .into_iter()
            .filter(|r| !r.synced)
            .collect())
    }

    /// Soft-delete the most recent counted drink of today.
    pub fn cancel_last_drink<S: Store + ?Sized>(&mut self, store: &mut S) -> Result<Option<DrinkRecord>> {
        let day_start = self.state.last_reset_timestamp;
        let log = self.log()?;
        let last = log
            .read_all(store)?
            .into_iter()
            .rev()
            .find(|(_, r)| r.counts_toward(day_start));
        let Some((slot, mut rec)) = last else {
            return Ok(None);
        };
        rec.deleted = true;
        log.rewrite(store, slot, &rec)?;
        tracing::info!(record_id = rec.record_id, amount_ml = rec.amount_ml, "last drink cancelled");
        self.recompute_totals(store)?;
        Ok(Some(rec))
    }

    pub fn delete_by_id<S: Store + ?Sized>(&mut self, record_id: u32, store: &mut S) -> Result<DrinkRecord> {
        let log = self.log()?;
        let found = log
            .read_all(store)?
            .into_iter()
            .find(|(_, r)| r.record_id == record_id && !r.deleted);
        let Some((slot, mut rec)) = found else {
            return Err(BottleError::RecordNotFound(record_id));
        };
        rec.deleted = true;
        log.rewrite(store, slot, &rec)?;
        tracing::info!(record_id, "drink deleted");
        self.recompute_totals(store)?;
        Ok(rec)
    }

    /// Soft-delete every record of the current day. Returns how many.
    pub fn reset_daily<S: Store + ?Sized>(&mut self, store: &mut S) -> Result<usize> {
        let day_start = self.state.last_reset_timestamp;
        let log = self.log()?;
        let mut n = 0;
        for (slot, mut rec) in log.read_all(store)? {
            if !rec.deleted && rec.timestamp >= day_start {
                rec.deleted = true;
                log.rewrite(store, slot, &rec)?;
                n += 1;
            }
        }
        self.state.window_ml = 0;
        tracing::info!(deleted = n, "daily totals reset");
        self.recompute_totals(store)?;
        Ok(n)
    }

    /// Flag every record up to and including `up_to_id` as synced.
    pub fn mark_synced<S: Store + ?Sized>(&mut self, up_to_id: u32, store: &mut S) -> Result<usize> {
        let log = self.log()?;
        let mut n = 0;
        for (slot, mut rec) in log.read_all(store)? {
            if !rec.synced && rec.record_id <= up_to_id {
                rec.synced = true;
                log.rewrite(store, slot, &rec)?;
                n += 1;
            }
        }
        tracing::debug!(up_to_id, marked = n, "records synced");
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MemStore;
    use crate::time::DayClock;

    // 2024-03-10 04:00 UTC; with tz 0 and reset hour 4 this is a day start.
    const DAY: u32 = 1_710_043_200;

    fn cal() -> CalibrationData {
        CalibrationData {
            scale_factor: 200.0,
            empty_adc: 0,
            full_adc: 166_000,
            timestamp: 0,
            valid: true,
        }
    }

    fn adc(ml: f32) -> i32 {
        (ml * 200.0) as i32
    }

    fn active() -> (DrinkTracker, MemStore) {
        let cfg = DrinkCfg {
            day: DayClock::new(0, 4),
            ..DrinkCfg::default()
        };
        let mut t = DrinkTracker::new(cfg);
        let mut store = MemStore::default();
        t.activate(Some(DAY + 60), &mut store).unwrap();
        (t, store)
    }

    #[test]
    fn activation_needs_wall_time() {
        let mut t = DrinkTracker::new(DrinkCfg::default());
        let mut store = MemStore::default();
        assert_eq!(t.activate(None, &mut store), Err(BottleError::TimeUnavailable));
        assert!(!t.is_active());
        assert_eq!(
            t.update(0, &cal(), 0, &mut store),
            Err(BottleError::TimeUnavailable)
        );
    }

    #[test]
    fn first_reading_sets_baseline_without_detection() {
        let (mut t, mut s) = active();
        let ev = t.update(adc(500.0), &cal(), DAY + 100, &mut s).unwrap();
        assert_eq!(ev, DrinkEvent::BaselineSet { level_ml: 500.0 });
        assert_eq!(t.totals().total_ml, 0);
    }

    #[test]
    fn gulp_and_pour_are_classified() {
        let (mut t, mut s) = active();
        t.update(adc(800.0), &cal(), DAY + 100, &mut s).unwrap();
        let ev = t.update(adc(750.0), &cal(), DAY + 200, &mut s).unwrap();
        assert!(matches!(
            ev,
            DrinkEvent::Drink {
                record_id: Some(1),
                amount_ml: 50,
                kind: DrinkKind::Gulp,
                ..
            }
        ));
        let ev = t.update(adc(600.0), &cal(), DAY + 300, &mut s).unwrap();
        assert!(matches!(
            ev,
            DrinkEvent::Drink {
                amount_ml: 150,
                kind: DrinkKind::Pour,
                ..
            }
        ));
        assert_eq!(t.totals().total_ml, 200);
        assert_eq!(t.totals().drink_count, 2);
        assert_eq!(t.current_session_ml(DAY + 400), 200);
        assert_eq!(t.current_session_ml(DAY + 300 + 301), 0);
    }

    #[rstest::rstest]
    #[case::just_below_threshold(29.0, None)]
    #[case::at_threshold(30.0, Some(DrinkKind::Gulp))]
    #[case::just_below_pour(99.0, Some(DrinkKind::Gulp))]
    #[case::at_pour(100.0, Some(DrinkKind::Pour))]
    fn drink_size_boundaries(#[case] delta_ml: f32, #[case] expected: Option<DrinkKind>) {
        let (mut t, mut s) = active();
        t.update(adc(800.0), &cal(), DAY + 100, &mut s).unwrap();
        let ev = t
            .update(adc(800.0 - delta_ml), &cal(), DAY + 200, &mut s)
            .unwrap();
        match expected {
            Some(want) => {
                assert!(
                    matches!(ev, DrinkEvent::Drink { kind, .. } if kind == want),
                    "{delta_ml} ml gave {ev:?}"
                );
                assert_eq!(t.totals().drink_count, 1);
            }
            None => {
                assert!(matches!(ev, DrinkEvent::Holding { .. }), "{delta_ml} ml gave {ev:?}");
                assert_eq!(t.totals().drink_count, 0);
            }
        }
    }

    #[test]
    fn drift_refill_and_hold() {
        let (mut t, mut s) = active();
        t.update(adc(500.0), &cal(), DAY + 1, &mut s).unwrap();
        assert!(matches!(
            t.update(adc(497.0), &cal(), DAY + 2, &mut s).unwrap(),
            DrinkEvent::DriftAdjusted { .. }
        ));
        assert_eq!(t.state().baseline_adc, Some(adc(497.0)));
        assert!(matches!(
            t.update(adc(480.0), &cal(), DAY + 3, &mut s).unwrap(),
            DrinkEvent::Holding { .. }
        ));
        assert_eq!(t.state().baseline_adc, Some(adc(497.0)));
        assert!(matches!(
            t.update(adc(700.0), &cal(), DAY + 4, &mut s).unwrap(),
            DrinkEvent::Refill { .. }
        ));
        assert_eq!(t.state().baseline_adc, Some(adc(700.0)));
        assert!(t.records(&s).unwrap().is_empty());
    }

    #[test]
    fn out_of_range_baseline_is_reestablished() {
        let (mut t, mut s) = active();
        t.update(adc(500.0), &cal(), DAY + 1, &mut s).unwrap();
        // recalibrated to a different gain: old baseline implies 5000 ml
        let mut c = cal();
        c.scale_factor = 20.0;
        let ev = t.update(2_000, &c, DAY + 2, &mut s).unwrap();
        assert_eq!(ev, DrinkEvent::BaselineSet { level_ml: 100.0 });
    }

    #[test]
    fn append_failure_falls_back_then_recompute_corrects() {
        let (mut t, mut s) = active();
        t.update(adc(800.0), &cal(), DAY + 1, &mut s).unwrap();
        s.fail_writes(true);
        let ev = t.update(adc(700.0), &cal(), DAY + 2, &mut s).unwrap();
        assert!(matches!(ev, DrinkEvent::Drink { record_id: None, amount_ml: 100, .. }));
        assert_eq!(t.totals().total_ml, 100);
        assert!(t.storage_warning());

        s.fail_writes(false);
        let totals = t.recompute_totals(&mut s).unwrap();
        assert_eq!(totals.total_ml, 0);
        assert!(!totals.storage_warning);
    }

    #[test]
    fn recompute_is_idempotent_and_filters() {
        let (mut t, mut s) = active();
        t.update(adc(800.0), &cal(), DAY + 1, &mut s).unwrap();
        t.update(adc(760.0), &cal(), DAY + 2, &mut s).unwrap();
        t.update(adc(700.0), &cal(), DAY + 3, &mut s).unwrap();
        let a = t.recompute_totals(&mut s).unwrap();
        let b = t.recompute_totals(&mut s).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total_ml, 100);

        let cancelled = t.cancel_last_drink(&mut s).unwrap().unwrap();
        assert_eq!(cancelled.amount_ml, 60);
        assert_eq!(t.totals().total_ml, 40);

        assert_eq!(
            t.delete_by_id(99, &mut s),
            Err(BottleError::RecordNotFound(99))
        );
        t.delete_by_id(1, &mut s).unwrap();
        assert_eq!(t.totals().total_ml, 0);
        assert_eq!(t.records(&s).unwrap().len(), 2, "soft-deleted, not removed");
    }

    #[test]
    fn reset_daily_soft_deletes_today_only() {
        let (mut t, mut s) = active();
        t.update(adc(800.0), &cal(), DAY + 1, &mut s).unwrap();
        t.update(adc(700.0), &cal(), DAY + 2, &mut s).unwrap();
        assert_eq!(t.reset_daily(&mut s).unwrap(), 1);
        assert_eq!(t.totals().total_ml, 0);
        assert!(t.records(&s).unwrap().iter().all(|r| r.deleted));
    }

    #[test]
    fn rollover_at_reset_hour() {
        let (mut t, mut s) = active();
        t.update(adc(800.0), &cal(), DAY + 1, &mut s).unwrap();
        t.update(adc(700.0), &cal(), DAY + 2, &mut s).unwrap();
        assert!(!t.check_rollover(DAY + 86_399, &mut s).unwrap());
        assert_eq!(t.totals().total_ml, 100);
        assert!(t.check_rollover(DAY + 86_400, &mut s).unwrap());
        assert_eq!(t.totals().total_ml, 0);
        assert_eq!(t.state().last_reset_timestamp, DAY + 86_400);
    }

    #[test]
    fn mark_synced_up_to_id() {
        let (mut t, mut s) = active();
        t.update(adc(800.0), &cal(), DAY + 1, &mut s).unwrap();
        t.update(adc(760.0), &cal(), DAY + 2, &mut s).unwrap();
        t.update(adc(720.0), &cal(), DAY + 3, &mut s).unwrap();
        assert_eq!(t.mark_synced(2, &mut s).unwrap(), 2);
        let pending: Vec<u32> = t.unsynced(&s).unwrap().iter().map(|r| r.record_id).collect();
        assert_eq!(pending, vec![3]);
    }

    #[test]
    fn state_survives_reactivation() {
        let (mut t, mut s) = active();
        t.update(adc(800.0), &cal(), DAY + 1, &mut s).unwrap();
        t.update(adc(700.0), &cal(), DAY + 2, &mut s).unwrap();
        t.flush(&mut s);

        let mut again = DrinkTracker::new(*t.cfg());
        again.activate(Some(DAY + 3_600), &mut s).unwrap();
        assert_eq!(again.totals().total_ml, 100);
        assert_eq!(again.state().baseline_adc, Some(adc(700.0)));
    }
}
