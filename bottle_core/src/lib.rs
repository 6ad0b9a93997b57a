#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Sensor-to-event core of the smart bottle (hardware-agnostic).
//!
//! All hardware goes through the `bottle_traits` seams (`LoadCell`,
//! `Accelerometer`, `Store`, `RetainedMemory`, `Clock`, `WallClock`).
//!
//! ## Architecture
//!
//! - **Statistics**: outlier-filtered mean/variance (`stats`)
//! - **Measurement**: timed, filtered load-cell reads (`measurement`)
//! - **Gestures**: rolling-window accelerometer classifier (`gesture`)
//! - **Calibration**: two-point model (`calibration`), gesture-driven state
//!   machine (`workflow`) and transport-driven flow (`remote`)
//! - **Drinks**: drift-compensated detection over a persisted log (`drinks`, `storage`)
//! - **Activity**: wake/sleep recorder in retained memory (`activity`, `ring`, `retained`)
//! - **Device**: per-wake orchestration (`device::Bottle`, built with `BottleBuilder`)
//!
//! Weights stay in raw ADC counts until a calibration converts them; water
//! quantities are reported in grams or millilitres through `calibration`.

pub mod activity;
pub mod builder;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod device;
pub mod drinks;
pub mod error;
pub mod gesture;
pub mod hw_error;
pub mod measurement;
pub mod mocks;
pub mod remote;
pub mod retained;
pub mod ring;
pub mod stats;
pub mod storage;
pub mod time;
pub mod util;
pub mod workflow;

pub use activity::{
    ActivityRecorder, BackpackSession, MotionWakeEvent, SessionExit, SleepType, WakeReason,
};
pub use builder::BottleBuilder;
pub use calibration::{
    CalibrationData, adc_for_water_weight, scale_factor_from_points, water_volume_ml,
    water_weight_g,
};
pub use config::{
    ActivityCfg, BottleCfg, CalibrationCfg, DrinkCfg, GestureCfg, MeasurementCfg, StatsCfg,
};
pub use device::{Bottle, TickReport};
pub use drinks::{DailyState, DailyTotals, DrinkEvent, DrinkKind, DrinkRecord, DrinkTracker};
pub use error::{BottleError, BuildError, Result};
pub use gesture::{Accel, Gesture, GestureClassifier};
pub use measurement::{Measure, WeightMeasurement, WeightSensor};
pub use remote::{CalPoint, RemoteCalibration, RemoteStatus};
pub use stats::{SampleStats, filtered_stats};
pub use time::DayClock;
pub use workflow::{CalFailure, CalState, CalTick, CalibrationWorkflow};
