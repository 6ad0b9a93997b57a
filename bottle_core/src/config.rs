//! Runtime configuration for the core subsystems.
//!
//! These are the structs the state machines read at runtime. They are
//! separate from the TOML-deserialized config in `bottle_config`; see
//! `conversions` for the mapping.

use crate::time::DayClock;

/// Outlier filter parameters for `stats::filtered_stats`.
#[derive(Debug, Clone, Copy)]
pub struct StatsCfg {
    /// Samples farther than this many standard deviations are dropped.
    pub outlier_std_devs: f64,
    /// Minimum retained samples for a valid result.
    pub min_samples: usize,
}

impl Default for StatsCfg {
    fn default() -> Self {
        Self {
            outlier_std_devs: 2.0,
            min_samples: 8,
        }
    }
}

/// Blocking load-cell measurement parameters.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementCfg {
    pub duration_s: u32,
    pub sample_rate_hz: u32,
    /// Variance (counts²) strictly below which a measurement is stable.
    pub variance_threshold: f64,
    pub stats: StatsCfg,
}

impl Default for MeasurementCfg {
    fn default() -> Self {
        Self {
            duration_s: 10,
            sample_rate_hz: 10,
            variance_threshold: 100.0,
            stats: StatsCfg::default(),
        }
    }
}

/// Accelerometer classifier thresholds. All accelerations in g.
#[derive(Debug, Clone, Copy)]
pub struct GestureCfg {
    pub window: usize,
    pub lsb_per_g: f32,
    pub stability_variance: f32,
    pub inverted_z_g: f32,
    pub inverted_hold_ms: u64,
    pub inverted_cooldown_ms: u64,
    pub sideways_g: f32,
    pub upright_z_g: f32,
    pub upright_xy_g: f32,
    pub weight_tolerance_g: f32,
    pub weight_dwell_ms: u64,
}

impl Default for GestureCfg {
    fn default() -> Self {
        Self {
            window: 10,
            lsb_per_g: 16_384.0,
            stability_variance: 0.01,
            inverted_z_g: -0.8,
            inverted_hold_ms: 5_000,
            inverted_cooldown_ms: 2_000,
            sideways_g: 0.7,
            upright_z_g: 0.9,
            upright_xy_g: 0.15,
            weight_tolerance_g: 6.0,
            weight_dwell_ms: 2_000,
        }
    }
}

/// Two-point calibration workflow parameters.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationCfg {
    pub water_volume_ml: f32,
    pub water_density: f32,
    pub max_scale_factor: f32,
    pub started_dwell_ms: u64,
    pub empty_timeout_ms: u64,
    pub full_timeout_ms: u64,
    pub full_hold_ms: u64,
    pub nominal_scale_factor: f32,
    pub min_fill_fraction: f32,
    pub min_full_delta_adc: Option<i32>,
    pub hold_tolerance_g: f32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            water_volume_ml: 830.0,
            water_density: 1.0,
            max_scale_factor: 1_000.0,
            started_dwell_ms: 3_000,
            empty_timeout_ms: 60_000,
            full_timeout_ms: 120_000,
            full_hold_ms: 5_000,
            nominal_scale_factor: 200.0,
            min_fill_fraction: 0.5,
            min_full_delta_adc: None,
            hold_tolerance_g: 5.0,
        }
    }
}

impl CalibrationCfg {
    /// ADC delta above the empty reading that counts as "bottle filled".
    ///
    /// Derived from the expected water mass at the nominal hardware gain
    /// unless an explicit override is configured.
    pub fn full_delta_threshold_adc(&self) -> i32 {
        if let Some(d) = self.min_full_delta_adc {
            return d;
        }
        let grams = self.water_volume_ml * self.water_density * self.min_fill_fraction;
        (grams * self.nominal_scale_factor).round().max(1.0) as i32
    }

    /// Band (ADC counts) the filled reading must stay inside during the hold.
    pub fn hold_tolerance_adc(&self) -> i32 {
        (self.hold_tolerance_g * self.nominal_scale_factor)
            .round()
            .max(1.0) as i32
    }
}

/// Drink detection thresholds. Volumes in ml.
#[derive(Debug, Clone, Copy)]
pub struct DrinkCfg {
    pub drink_threshold_ml: f32,
    pub pour_threshold_ml: f32,
    pub refill_threshold_ml: f32,
    pub drift_tolerance_ml: f32,
    pub baseline_min_ml: f32,
    pub baseline_max_ml: f32,
    pub check_interval_ms: u64,
    pub aggregation_window_s: u32,
    pub water_density: f32,
    pub day: DayClock,
    pub log_capacity: u32,
}

impl Default for DrinkCfg {
    fn default() -> Self {
        Self {
            drink_threshold_ml: 30.0,
            pour_threshold_ml: 100.0,
            refill_threshold_ml: 100.0,
            drift_tolerance_ml: 5.0,
            baseline_min_ml: -100.0,
            baseline_max_ml: 1_000.0,
            check_interval_ms: 2_000,
            aggregation_window_s: 300,
            water_density: 1.0,
            day: DayClock::default(),
            log_capacity: 200,
        }
    }
}

/// Retained activity log sizes.
#[derive(Debug, Clone, Copy)]
pub struct ActivityCfg {
    pub motion_log_capacity: usize,
    pub session_log_capacity: usize,
}

impl Default for ActivityCfg {
    fn default() -> Self {
        Self {
            motion_log_capacity: 100,
            session_log_capacity: 20,
        }
    }
}

/// Everything `Bottle` needs, bundled.
#[derive(Debug, Clone, Default)]
pub struct BottleCfg {
    pub measurement: MeasurementCfg,
    pub gesture: GestureCfg,
    pub calibration: CalibrationCfg,
    pub drinks: DrinkCfg,
    pub activity: ActivityCfg,
}
