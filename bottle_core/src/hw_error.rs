//! Maps `Box<dyn Error>` from trait boundaries to typed `BottleError`.
//!
//! The traits in `bottle_traits` use `Box<dyn Error + Send + Sync>` so drivers
//! can return their own errors; this module converts those to our taxonomy,
//! with an optional feature-gated path for `bottle_hardware::HwError`.

use crate::error::BottleError;

/// Map a sensor-side error (load cell, accelerometer).
pub fn map_sensor_error(e: &(dyn std::error::Error + 'static)) -> BottleError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<bottle_hardware::error::HwError>() {
            return match hw {
                bottle_hardware::error::HwError::DataReadyTimeout => {
                    BottleError::SensorUnavailable("data-ready timeout".to_string())
                }
                other => BottleError::SensorUnavailable(other.to_string()),
            };
        }
    }
    BottleError::SensorUnavailable(e.to_string())
}

/// Map a persistent-store error.
pub fn map_store_error(e: &(dyn std::error::Error + 'static)) -> BottleError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<bottle_hardware::error::HwError>() {
            return BottleError::PersistenceFailure(format!("store: {hw}"));
        }
    }
    BottleError::PersistenceFailure(e.to_string())
}
