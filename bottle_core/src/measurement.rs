//! Timed, filtered load-cell measurements.
//!
//! A measurement samples the load cell at a fixed rate for a fixed duration
//! and applies the outlier filter from `stats`. It blocks for the whole
//! duration; the caller owns the wake budget this costs.

use std::sync::Arc;
use std::time::Duration;

use bottle_traits::{Clock, LoadCell};

use crate::config::MeasurementCfg;
use crate::error::BottleError;
use crate::hw_error::map_sensor_error;
use crate::stats::filtered_stats;
use crate::util::period_ms;

/// Outcome of one blocking measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightMeasurement {
    pub mean_adc: i32,
    pub variance: f64,
    pub stable: bool,
    pub retained_count: usize,
    pub valid: bool,
}

impl WeightMeasurement {
    /// Measurement that collected nothing usable.
    pub fn invalid() -> Self {
        Self {
            mean_adc: 0,
            variance: 0.0,
            stable: false,
            retained_count: 0,
            valid: false,
        }
    }

    /// True when the result can be used as a calibration point.
    pub fn is_usable(&self) -> bool {
        self.valid && self.stable
    }

    /// Typed verdict: the mean when valid and stable.
    pub fn check(&self, min_samples: usize) -> Result<i32, BottleError> {
        if !self.valid {
            return Err(BottleError::MeasurementInvalid {
                retained: self.retained_count,
                required: min_samples,
            });
        }
        if !self.stable {
            return Err(BottleError::MeasurementUnstable {
                mean_adc: self.mean_adc,
                variance: self.variance,
            });
        }
        Ok(self.mean_adc)
    }
}

/// Weight source used by the state machines.
///
/// `measure` blocks for a full measurement; `read_raw` is a single
/// non-blocking read for callers that only need the instantaneous value.
pub trait Measure {
    fn measure(&mut self) -> WeightMeasurement;
    fn read_raw(&mut self) -> Option<i32>;
}

impl<T: Measure + ?Sized> Measure for Box<T> {
    fn measure(&mut self) -> WeightMeasurement {
        (**self).measure()
    }
    fn read_raw(&mut self) -> Option<i32> {
        (**self).read_raw()
    }
}

/// `Measure` implementation over a real `LoadCell`.
pub struct WeightSensor<L: LoadCell> {
    cell: L,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: MeasurementCfg,
    last_raw: Option<i32>,
}

impl<L: LoadCell> core::fmt::Debug for WeightSensor<L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WeightSensor")
            .field("cfg", &self.cfg)
            .field("last_raw", &self.last_raw)
            .finish()
    }
}

impl<L: LoadCell> WeightSensor<L> {
    pub fn new(cell: L, clock: Arc<dyn Clock + Send + Sync>, cfg: MeasurementCfg) -> Self {
        Self {
            cell,
            clock,
            cfg,
            last_raw: None,
        }
    }

    pub fn cfg(&self) -> &MeasurementCfg {
        &self.cfg
    }

    /// Last successfully read raw value, if any.
    pub fn last_raw(&self) -> Option<i32> {
        self.last_raw
    }

    /// Mutable access to the underlying load cell (simulation hooks).
    pub fn cell_mut(&mut self) -> &mut L {
        &mut self.cell
    }
}

impl<L: LoadCell> Measure for WeightSensor<L> {
    fn measure(&mut self) -> WeightMeasurement {
        let period = period_ms(self.cfg.sample_rate_hz);
        let duration_ms = u64::from(self.cfg.duration_s) * 1_000;
        let epoch = self.clock.now();
        let mut samples = Vec::with_capacity((duration_ms / period) as usize + 1);
        let mut errors = 0usize;
        let mut last_error = None;

        while self.clock.ms_since(epoch) < duration_ms {
            if self.cell.is_ready() {
                match self.cell.read() {
                    Ok(v) => samples.push(v),
                    Err(e) => {
                        errors += 1;
                        last_error = Some(map_sensor_error(&*e));
                    }
                }
            }
            self.clock.sleep(Duration::from_millis(period));
        }

        if samples.is_empty() {
            if let Some(e) = last_error {
                tracing::warn!(error = %e, errors, "no load-cell samples collected");
            } else {
                tracing::warn!("load cell never ready during measurement");
            }
            return WeightMeasurement::invalid();
        }
        self.last_raw = samples.last().copied();

        let st = filtered_stats(&samples, &self.cfg.stats);
        let m = WeightMeasurement {
            mean_adc: st.mean.round() as i32,
            variance: st.variance,
            stable: st.valid && st.variance < self.cfg.variance_threshold,
            retained_count: st.retained,
            valid: st.valid,
        };
        tracing::debug!(
            mean_adc = m.mean_adc,
            variance = m.variance,
            retained = st.retained,
            rejected = st.rejected(),
            read_errors = errors,
            stable = m.stable,
            "weight measurement"
        );
        m
    }

    fn read_raw(&mut self) -> Option<i32> {
        if !self.cell.is_ready() {
            return None;
        }
        match self.cell.read() {
            Ok(v) => {
                self.last_raw = Some(v);
                Some(v)
            }
            Err(e) => {
                tracing::debug!(error = %map_sensor_error(&*e), "raw load-cell read failed");
                None
            }
        }
    }
}
