//! Externally driven calibration (companion app over the transport).
//!
//! The transport asks for the empty and full points one at a time. A request
//! is accepted only when nothing is pending; the measurement itself runs on
//! the next `poll` so the transport handler never blocks. Once both points
//! exist the result is computed and persisted through the same pure
//! operations the gesture workflow uses.

use bottle_traits::Store;

use crate::calibration::CalibrationData;
use crate::config::CalibrationCfg;
use crate::error::BottleError;
use crate::measurement::Measure;
use crate::storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalPoint {
    Empty,
    Full,
}

/// What the transport sees when it polls for status.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStatus {
    Inactive,
    /// Session open, no measurement pending.
    Ready {
        empty_adc: Option<i32>,
        full_adc: Option<i32>,
    },
    /// A point measurement has been requested and not yet run.
    Busy(CalPoint),
    Complete(CalibrationData),
    Failed(BottleError),
}

#[derive(Debug)]
pub struct RemoteCalibration {
    cfg: CalibrationCfg,
    min_samples: usize,
    active: bool,
    pending: Option<CalPoint>,
    empty_adc: Option<i32>,
    full_adc: Option<i32>,
    outcome: Option<Result<CalibrationData, BottleError>>,
}

impl RemoteCalibration {
    pub fn new(cfg: CalibrationCfg, min_samples: usize) -> Self {
        Self {
            cfg,
            min_samples,
            active: false,
            pending: None,
            empty_adc: None,
            full_adc: None,
            outcome: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start(&mut self) {
        tracing::info!("remote calibration session started");
        self.active = true;
        self.pending = None;
        self.empty_adc = None;
        self.full_adc = None;
        self.outcome = None;
    }

    pub fn cancel(&mut self) {
        if self.active {
            tracing::info!(pending = ?self.pending, "remote calibration cancelled");
        }
        self.active = false;
        self.pending = None;
        self.outcome = None;
    }

    /// Queue a point measurement. `Busy` while one is pending.
    pub fn request_point(&mut self, point: CalPoint) -> Result<(), BottleError> {
        if !self.active {
            return Err(BottleError::CalibrationInvalid("no calibration session"));
        }
        if self.pending.is_some() {
            return Err(BottleError::Busy("point measurement in progress"));
        }
        self.pending = Some(point);
        Ok(())
    }

    pub fn status(&self) -> RemoteStatus {
        match (&self.outcome, self.pending) {
            (Some(Ok(data)), _) => RemoteStatus::Complete(*data),
            (Some(Err(e)), _) => RemoteStatus::Failed(e.clone()),
            _ if !self.active => RemoteStatus::Inactive,
            (None, Some(p)) => RemoteStatus::Busy(p),
            (None, None) => RemoteStatus::Ready {
                empty_adc: self.empty_adc,
                full_adc: self.full_adc,
            },
        }
    }

    /// Run a pending measurement, if any. Returns the finished calibration
    /// once both points are captured and persisted.
    pub fn poll<M, S>(
        &mut self,
        measurer: &mut M,
        store: &mut S,
        timestamp: u32,
    ) -> Option<Result<CalibrationData, BottleError>>
    where
        M: Measure + ?Sized,
        S: Store + ?Sized,
    {
        let point = self.pending?;
        let reading = measurer.measure().check(self.min_samples);
        self.pending = None;
        let adc = match reading {
            Ok(adc) => adc,
            Err(e) => {
                // the point stays missing; the app may request it again
                tracing::info!(?point, error = %e, "remote point measurement not usable");
                return Some(Err(e));
            }
        };
        tracing::info!(?point, adc, "remote point captured");
        match point {
            CalPoint::Empty => self.empty_adc = Some(adc),
            CalPoint::Full => self.full_adc = Some(adc),
        }

        let (Some(empty), Some(full)) = (self.empty_adc, self.full_adc) else {
            return None;
        };
        let result = CalibrationData::from_points(
            empty,
            full,
            self.cfg.water_volume_ml,
            self.cfg.water_density,
            self.cfg.max_scale_factor,
            timestamp,
        )
        .and_then(|data| storage::save_calibration(store, &data).map(|()| data));
        match &result {
            Ok(data) => tracing::info!(scale_factor = data.scale_factor, "remote calibration complete"),
            Err(e) => tracing::warn!(error = %e, "remote calibration failed"),
        }
        self.active = false;
        self.outcome = Some(result.clone());
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::WeightMeasurement;
    use crate::mocks::{FakeMeasure, MemStore};

    fn good(adc: i32) -> WeightMeasurement {
        WeightMeasurement {
            mean_adc: adc,
            variance: 1.0,
            stable: true,
            retained_count: 100,
            valid: true,
        }
    }

    #[test]
    fn request_while_pending_is_busy() {
        let mut rc = RemoteCalibration::new(CalibrationCfg::default(), 8);
        rc.start();
        rc.request_point(CalPoint::Empty).unwrap();
        assert_eq!(rc.status(), RemoteStatus::Busy(CalPoint::Empty));
        assert!(matches!(
            rc.request_point(CalPoint::Full),
            Err(BottleError::Busy(_))
        ));
    }

    #[test]
    fn request_without_session_is_refused() {
        let mut rc = RemoteCalibration::new(CalibrationCfg::default(), 8);
        assert!(matches!(
            rc.request_point(CalPoint::Empty),
            Err(BottleError::CalibrationInvalid(_))
        ));
        assert_eq!(rc.status(), RemoteStatus::Inactive);
    }

    #[test]
    fn both_points_complete_and_persist() {
        let mut rc = RemoteCalibration::new(CalibrationCfg::default(), 8);
        let mut m = FakeMeasure::default();
        let mut store = MemStore::default();
        rc.start();

        rc.request_point(CalPoint::Full).unwrap();
        m.push_measurement(good(176_000));
        assert_eq!(rc.poll(&mut m, &mut store, 5), None);
        assert_eq!(
            rc.status(),
            RemoteStatus::Ready {
                empty_adc: None,
                full_adc: Some(176_000)
            }
        );

        rc.request_point(CalPoint::Empty).unwrap();
        m.push_measurement(good(10_000));
        let done = rc.poll(&mut m, &mut store, 5).unwrap().unwrap();
        assert!((done.scale_factor - 200.0).abs() < 1e-3);
        assert_eq!(rc.status(), RemoteStatus::Complete(done));
        assert_eq!(storage::load_calibration(&store).unwrap(), Some(done));
    }

    #[test]
    fn unusable_measurement_clears_pending() {
        let mut rc = RemoteCalibration::new(CalibrationCfg::default(), 8);
        let mut m = FakeMeasure::default();
        let mut store = MemStore::default();
        rc.start();
        rc.request_point(CalPoint::Empty).unwrap();
        // empty queue -> invalid measurement
        assert!(matches!(
            rc.poll(&mut m, &mut store, 0),
            Some(Err(BottleError::MeasurementInvalid { .. }))
        ));
        assert!(rc.request_point(CalPoint::Empty).is_ok());
    }

    #[test]
    fn store_failure_surfaces_as_failed() {
        let mut rc = RemoteCalibration::new(CalibrationCfg::default(), 8);
        let mut m = FakeMeasure::default();
        let mut store = MemStore::default();
        store.fail_writes(true);
        rc.start();
        rc.request_point(CalPoint::Empty).unwrap();
        m.push_measurement(good(0));
        rc.poll(&mut m, &mut store, 0);
        rc.request_point(CalPoint::Full).unwrap();
        m.push_measurement(good(166_000));
        assert!(matches!(
            rc.poll(&mut m, &mut store, 0),
            Some(Err(BottleError::PersistenceFailure(_)))
        ));
        assert!(matches!(rc.status(), RemoteStatus::Failed(_)));
        assert!(!rc.is_active());

        rc.cancel();
        assert_eq!(rc.status(), RemoteStatus::Inactive);
    }

    #[test]
    fn cancel_after_completion_reports_inactive() {
        let mut rc = RemoteCalibration::new(CalibrationCfg::default(), 8);
        let mut m = FakeMeasure::default();
        let mut store = MemStore::default();
        rc.start();
        rc.request_point(CalPoint::Empty).unwrap();
        m.push_measurement(good(10_000));
        rc.poll(&mut m, &mut store, 0);
        rc.request_point(CalPoint::Full).unwrap();
        m.push_measurement(good(176_000));
        assert!(matches!(rc.poll(&mut m, &mut store, 0), Some(Ok(_))));
        assert!(matches!(rc.status(), RemoteStatus::Complete(_)));

        rc.cancel();
        assert_eq!(rc.status(), RemoteStatus::Inactive);
        // the persisted calibration is not rolled back
        assert!(storage::load_calibration(&store).unwrap().is_some());
    }
}
