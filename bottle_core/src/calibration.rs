//! Two-point load-cell calibration data and the pure conversions built on it.
//!
//! The model is linear:
//!   adc = empty_adc + scale_factor * water_grams
//! where `scale_factor` is ADC counts per gram of water. These conversions are
//! shared by the gesture-driven workflow and the externally driven flow.

use serde::{Deserialize, Serialize};

use crate::error::BottleError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    /// ADC counts per gram.
    pub scale_factor: f32,
    pub empty_adc: i32,
    pub full_adc: i32,
    /// Wall time the calibration was captured (UTC seconds).
    pub timestamp: u32,
    pub valid: bool,
}

impl Default for CalibrationData {
    fn default() -> Self {
        Self {
            scale_factor: 0.0,
            empty_adc: 0,
            full_adc: 0,
            timestamp: 0,
            valid: false,
        }
    }
}

impl CalibrationData {
    /// Build and validate a calibration from two captured points.
    pub fn from_points(
        empty_adc: i32,
        full_adc: i32,
        water_volume_ml: f32,
        water_density: f32,
        max_scale_factor: f32,
        timestamp: u32,
    ) -> Result<Self, BottleError> {
        let scale_factor =
            scale_factor_from_points(empty_adc, full_adc, water_volume_ml, water_density)?;
        let data = Self {
            scale_factor,
            empty_adc,
            full_adc,
            timestamp,
            valid: true,
        };
        data.check(max_scale_factor)?;
        Ok(data)
    }

    /// Structural checks independent of the `valid` flag.
    pub fn check(&self, max_scale_factor: f32) -> Result<(), BottleError> {
        if self.full_adc <= self.empty_adc {
            return Err(BottleError::CalibrationRejected(format!(
                "full reading {} not above empty reading {}",
                self.full_adc, self.empty_adc
            )));
        }
        if !(self.scale_factor.is_finite()
            && self.scale_factor > 0.0
            && self.scale_factor <= max_scale_factor)
        {
            return Err(BottleError::CalibrationRejected(format!(
                "scale factor {} outside (0, {max_scale_factor}]",
                self.scale_factor
            )));
        }
        Ok(())
    }

    /// Usable for conversions.
    pub fn is_usable(&self) -> bool {
        self.valid && self.scale_factor.is_finite() && self.scale_factor > 0.0
    }
}

/// ADC counts per gram from an empty and a full reading.
///
/// `scale_factor = (full - empty) / (volume_ml * density)`. Strictly increasing
/// in `full - empty` for a fixed positive volume; rejects `full <= empty`.
pub fn scale_factor_from_points(
    empty_adc: i32,
    full_adc: i32,
    water_volume_ml: f32,
    water_density: f32,
) -> Result<f32, BottleError> {
    if full_adc <= empty_adc {
        return Err(BottleError::CalibrationRejected(format!(
            "full reading {full_adc} not above empty reading {empty_adc}"
        )));
    }
    let grams = f64::from(water_volume_ml) * f64::from(water_density);
    if !(grams.is_finite() && grams > 0.0) {
        return Err(BottleError::CalibrationRejected(format!(
            "water mass {grams} g must be positive"
        )));
    }
    let delta = f64::from(full_adc) - f64::from(empty_adc);
    Ok((delta / grams) as f32)
}

/// Water weight in grams for a raw reading, or `None` without a usable
/// calibration.
pub fn water_weight_g(adc: i32, cal: &CalibrationData) -> Option<f32> {
    if !cal.is_usable() {
        return None;
    }
    let delta = f64::from(adc) - f64::from(cal.empty_adc);
    Some((delta / f64::from(cal.scale_factor)) as f32)
}

/// Inverse of `water_weight_g`: the reading expected for `grams` of water.
pub fn adc_for_water_weight(grams: f32, cal: &CalibrationData) -> Option<i32> {
    if !cal.is_usable() {
        return None;
    }
    let adc = f64::from(cal.empty_adc) + f64::from(grams) * f64::from(cal.scale_factor);
    Some(adc.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32)
}

/// Water volume in ml for a reading.
pub fn water_volume_ml(adc: i32, cal: &CalibrationData, water_density: f32) -> Option<f32> {
    water_weight_g(adc, cal).map(|g| g / water_density)
}
