#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the bottle firmware core.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Every section has defaults, so an empty file is a valid configuration.
//! - `[factory_calibration]` optionally seeds a calibration for devices whose
//!   store has never been calibrated.
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MeasurementCfg {
    /// Length of a blocking weight measurement in seconds
    pub duration_s: u32,
    /// Load-cell sampling rate during a measurement
    pub sample_rate_hz: u32,
    /// Population variance (ADC counts²) below which a measurement is stable
    pub variance_threshold: f64,
    /// Samples farther than this many standard deviations are discarded
    pub outlier_std_devs: f64,
    /// Minimum retained samples for a valid measurement
    pub min_samples: usize,
}

impl Default for MeasurementCfg {
    fn default() -> Self {
        Self {
            duration_s: 10,
            sample_rate_hz: 10,
            variance_threshold: 100.0,
            outlier_std_devs: 2.0,
            min_samples: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GestureCfg {
    pub window: usize,
    /// Raw accelerometer counts per 1 g
    pub lsb_per_g: f32,
    /// Summed per-axis variance (g²) below which the window is stable
    pub stability_variance: f32,
    pub inverted_z_g: f32,
    pub inverted_hold_ms: u64,
    pub inverted_cooldown_ms: u64,
    pub sideways_g: f32,
    pub upright_z_g: f32,
    pub upright_xy_g: f32,
    /// Weight band (grams) considered unchanged for upright-stable
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    pub water_volume_ml: f32,
    pub water_density: f32,
    pub max_scale_factor: f32,
    pub started_dwell_ms: u64,
    pub empty_timeout_ms: u64,
    pub full_timeout_ms: u64,
    pub full_hold_ms: u64,
    /// Expected ADC counts per gram for this hardware; used to derive
    /// full-bottle thresholds before a calibration exists.
    pub nominal_scale_factor: f32,
    /// Fraction of the nominal full-bottle delta required before the hold starts
    pub min_fill_fraction: f32,
    /// Explicit override for the full-bottle delta threshold (ADC counts)
    pub min_full_delta_adc: Option<i32>,
    /// Band (grams at nominal scale) the full reading must stay inside
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DrinkCfg {
    pub drink_threshold_ml: f32,
    /// Drinks at or above this size are pours; below are gulps
    pub pour_threshold_ml: f32,
    pub refill_threshold_ml: f32,
    pub drift_tolerance_ml: f32,
    pub baseline_min_ml: f32,
    pub baseline_max_ml: f32,
    /// How often the tracker runs while the bottle rests
    pub check_interval_ms: u64,
    /// Drinks closer together than this are summed into one session
    pub aggregation_window_s: u32,
    /// Local hour at which the drinking day starts
    pub day_reset_hour: u8,
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
            day_reset_hour: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TimeCfg {
    /// Whole-hour offset from UTC applied to wall-clock timestamps
    pub tz_offset_hours: i8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ActivityCfg {
    /// Motion wake events kept in retained memory
    pub motion_log_capacity: usize,
    /// Backpack sessions kept in retained memory
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

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Hardware {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
    /// Max time to wait for HX711 data-ready (DT low) before failing
    pub sensor_read_timeout_ms: u64,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            hx711_dt: 5,
            hx711_sck: 6,
            sensor_read_timeout_ms: 150,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageCfg {
    /// Directory holding the file-backed store
    pub dir: String,
    /// Slots in the persisted drink log
    pub drink_log_capacity: u32,
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            dir: "var/bottle".to_string(),
            drink_log_capacity: 200,
        }
    }
}

/// Calibration shipped with the device, used until a user calibration exists.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct FactoryCalibration {
    pub empty_adc: i32,
    pub full_adc: i32,
    /// ADC counts per gram; derived from the two points when absent
    #[serde(default)]
    pub scale_factor: Option<f32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub measurement: MeasurementCfg,
    pub gesture: GestureCfg,
    pub calibration: CalibrationCfg,
    pub drinks: DrinkCfg,
    pub time: TimeCfg,
    pub activity: ActivityCfg,
    pub logging: Logging,
    pub hardware: Hardware,
    pub storage: StorageCfg,
    pub factory_calibration: Option<FactoryCalibration>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Measurement
        let m = &self.measurement;
        if m.duration_s == 0 {
            eyre::bail!("measurement.duration_s must be >= 1");
        }
        if m.duration_s > 120 {
            eyre::bail!("measurement.duration_s is unreasonably large (>120s)");
        }
        if m.sample_rate_hz == 0 {
            eyre::bail!("measurement.sample_rate_hz must be > 0");
        }
        if !(m.variance_threshold.is_finite() && m.variance_threshold > 0.0) {
            eyre::bail!("measurement.variance_threshold must be > 0");
        }
        if !(m.outlier_std_devs.is_finite() && m.outlier_std_devs > 0.0) {
            eyre::bail!("measurement.outlier_std_devs must be > 0");
        }
        if m.min_samples == 0 {
            eyre::bail!("measurement.min_samples must be >= 1");
        }
        let expected = u64::from(m.duration_s) * u64::from(m.sample_rate_hz);
        if (m.min_samples as u64) > expected {
            eyre::bail!(
                "measurement.min_samples ({}) exceeds samples per measurement ({expected})",
                m.min_samples
            );
        }

        // Gesture
        let g = &self.gesture;
        if g.window < 2 {
            eyre::bail!("gesture.window must be >= 2");
        }
        if g.lsb_per_g <= 0.0 {
            eyre::bail!("gesture.lsb_per_g must be > 0");
        }
        if g.stability_variance <= 0.0 {
            eyre::bail!("gesture.stability_variance must be > 0");
        }
        if g.inverted_z_g >= 0.0 || g.inverted_z_g < -1.5 {
            eyre::bail!("gesture.inverted_z_g must be in [-1.5, 0.0)");
        }
        if g.upright_z_g <= 0.0 || g.upright_z_g > 1.5 {
            eyre::bail!("gesture.upright_z_g must be in (0.0, 1.5]");
        }
        if g.sideways_g <= 0.0 || g.upright_xy_g <= 0.0 {
            eyre::bail!("gesture.sideways_g and gesture.upright_xy_g must be > 0");
        }
        if g.upright_xy_g >= g.sideways_g {
            eyre::bail!("gesture.upright_xy_g must be below gesture.sideways_g");
        }
        if g.weight_tolerance_g < 0.0 {
            eyre::bail!("gesture.weight_tolerance_g must be >= 0");
        }

        // Calibration
        let c = &self.calibration;
        if c.water_volume_ml <= 0.0 {
            eyre::bail!("calibration.water_volume_ml must be > 0");
        }
        if c.water_density <= 0.0 {
            eyre::bail!("calibration.water_density must be > 0");
        }
        if c.max_scale_factor <= 0.0 {
            eyre::bail!("calibration.max_scale_factor must be > 0");
        }
        if c.nominal_scale_factor <= 0.0 || c.nominal_scale_factor > c.max_scale_factor {
            eyre::bail!("calibration.nominal_scale_factor must be in (0, max_scale_factor]");
        }
        if !(c.min_fill_fraction > 0.0 && c.min_fill_fraction <= 1.0) {
            eyre::bail!("calibration.min_fill_fraction must be in (0.0, 1.0]");
        }
        if let Some(d) = c.min_full_delta_adc
            && d <= 0
        {
            eyre::bail!("calibration.min_full_delta_adc must be > 0");
        }
        if c.empty_timeout_ms == 0 || c.full_timeout_ms == 0 {
            eyre::bail!("calibration timeouts must be >= 1 ms");
        }

        // Drinks
        let d = &self.drinks;
        if d.drink_threshold_ml <= 0.0 {
            eyre::bail!("drinks.drink_threshold_ml must be > 0");
        }
        if d.pour_threshold_ml <= d.drink_threshold_ml {
            eyre::bail!("drinks.pour_threshold_ml must exceed drinks.drink_threshold_ml");
        }
        if d.refill_threshold_ml <= 0.0 {
            eyre::bail!("drinks.refill_threshold_ml must be > 0");
        }
        if d.drift_tolerance_ml < 0.0 || d.drift_tolerance_ml >= d.drink_threshold_ml {
            eyre::bail!("drinks.drift_tolerance_ml must be in [0, drink_threshold_ml)");
        }
        if d.baseline_min_ml >= d.baseline_max_ml {
            eyre::bail!("drinks.baseline_min_ml must be below drinks.baseline_max_ml");
        }
        if d.day_reset_hour > 23 {
            eyre::bail!("drinks.day_reset_hour must be in 0..=23");
        }

        // Time
        if !(-12..=14).contains(&self.time.tz_offset_hours) {
            eyre::bail!("time.tz_offset_hours must be in -12..=14");
        }

        // Activity
        if self.activity.motion_log_capacity == 0 || self.activity.session_log_capacity == 0 {
            eyre::bail!("activity log capacities must be >= 1");
        }
        let max = usize::from(u16::MAX);
        if self.activity.motion_log_capacity > max || self.activity.session_log_capacity > max {
            eyre::bail!("activity log capacities must be <= {max}");
        }

        // Hardware
        if self.hardware.sensor_read_timeout_ms == 0 {
            eyre::bail!("hardware.sensor_read_timeout_ms must be >= 1");
        }

        // Storage
        if self.storage.drink_log_capacity == 0 {
            eyre::bail!("storage.drink_log_capacity must be >= 1");
        }

        if let Some(f) = &self.factory_calibration
            && f.full_adc <= f.empty_adc
        {
            eyre::bail!("factory_calibration.full_adc must exceed empty_adc");
        }

        Ok(())
    }
}
