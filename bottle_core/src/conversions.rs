//! `From` implementations bridging `bottle_config` types to `bottle_core` types.

use crate::calibration::{CalibrationData, scale_factor_from_points};
use crate::config::{
    ActivityCfg, BottleCfg, CalibrationCfg, DrinkCfg, GestureCfg, MeasurementCfg, StatsCfg,
};
use crate::time::DayClock;

// ── MeasurementCfg ───────────────────────────────────────────────────────────

impl From<&bottle_config::MeasurementCfg> for MeasurementCfg {
    fn from(c: &bottle_config::MeasurementCfg) -> Self {
        Self {
            duration_s: c.duration_s,
            sample_rate_hz: c.sample_rate_hz,
            variance_threshold: c.variance_threshold,
            stats: StatsCfg {
                outlier_std_devs: c.outlier_std_devs,
                min_samples: c.min_samples,
            },
        }
    }
}

// ── GestureCfg ───────────────────────────────────────────────────────────────

impl From<&bottle_config::GestureCfg> for GestureCfg {
    fn from(c: &bottle_config::GestureCfg) -> Self {
        Self {
            window: c.window,
            lsb_per_g: c.lsb_per_g,
            stability_variance: c.stability_variance,
            inverted_z_g: c.inverted_z_g,
            inverted_hold_ms: c.inverted_hold_ms,
            inverted_cooldown_ms: c.inverted_cooldown_ms,
            sideways_g: c.sideways_g,
            upright_z_g: c.upright_z_g,
            upright_xy_g: c.upright_xy_g,
            weight_tolerance_g: c.weight_tolerance_g,
            weight_dwell_ms: c.weight_dwell_ms,
        }
    }
}

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl From<&bottle_config::CalibrationCfg> for CalibrationCfg {
    fn from(c: &bottle_config::CalibrationCfg) -> Self {
        Self {
            water_volume_ml: c.water_volume_ml,
            water_density: c.water_density,
            max_scale_factor: c.max_scale_factor,
            started_dwell_ms: c.started_dwell_ms,
            empty_timeout_ms: c.empty_timeout_ms,
            full_timeout_ms: c.full_timeout_ms,
            full_hold_ms: c.full_hold_ms,
            nominal_scale_factor: c.nominal_scale_factor,
            min_fill_fraction: c.min_fill_fraction,
            min_full_delta_adc: c.min_full_delta_adc,
            hold_tolerance_g: c.hold_tolerance_g,
        }
    }
}

// ── BottleCfg ────────────────────────────────────────────────────────────────

impl From<&bottle_config::Config> for BottleCfg {
    fn from(c: &bottle_config::Config) -> Self {
        let drinks = DrinkCfg {
            drink_threshold_ml: c.drinks.drink_threshold_ml,
            pour_threshold_ml: c.drinks.pour_threshold_ml,
            refill_threshold_ml: c.drinks.refill_threshold_ml,
            drift_tolerance_ml: c.drinks.drift_tolerance_ml,
            baseline_min_ml: c.drinks.baseline_min_ml,
            baseline_max_ml: c.drinks.baseline_max_ml,
            check_interval_ms: c.drinks.check_interval_ms,
            aggregation_window_s: c.drinks.aggregation_window_s,
            water_density: c.calibration.water_density,
            day: DayClock::new(c.time.tz_offset_hours, c.drinks.day_reset_hour),
            log_capacity: c.storage.drink_log_capacity,
        };
        Self {
            measurement: (&c.measurement).into(),
            gesture: (&c.gesture).into(),
            calibration: (&c.calibration).into(),
            drinks,
            activity: ActivityCfg {
                motion_log_capacity: c.activity.motion_log_capacity,
                session_log_capacity: c.activity.session_log_capacity,
            },
        }
    }
}

// ── Factory calibration ──────────────────────────────────────────────────────

impl CalibrationData {
    /// Build a calibration from the factory section; the scale factor is
    /// derived from the two points when not given explicitly.
    pub fn from_factory(f: &bottle_config::FactoryCalibration, cfg: &CalibrationCfg) -> Self {
        let scale_factor = f.scale_factor.unwrap_or_else(|| {
            scale_factor_from_points(
                f.empty_adc,
                f.full_adc,
                cfg.water_volume_ml,
                cfg.water_density,
            )
            .unwrap_or(0.0)
        });
        let mut data = CalibrationData {
            scale_factor,
            empty_adc: f.empty_adc,
            full_adc: f.full_adc,
            timestamp: 0,
            valid: false,
        };
        data.valid = data.check(cfg.max_scale_factor).is_ok();
        data
    }
}
