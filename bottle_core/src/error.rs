use thiserror::Error;

/// Typed failures surfaced by the core.
///
/// Sensor and statistics problems are normally reported through
/// `valid`/`stable` flags on results; these variants exist for callers that
/// want a typed verdict (see `WeightMeasurement::check`).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BottleError {
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),
    #[error("measurement invalid: {retained} samples retained, {required} required")]
    MeasurementInvalid { retained: usize, required: usize },
    #[error("measurement unstable: variance {variance:.1} (mean {mean_adc})")]
    MeasurementUnstable { mean_adc: i32, variance: f64 },
    #[error("calibration invalid: {0}")]
    CalibrationInvalid(&'static str),
    #[error("calibration timed out")]
    CalibrationTimeout,
    #[error("calibration rejected: {0}")]
    CalibrationRejected(String),
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
    #[error("wall clock not set")]
    TimeUnavailable,
    #[error("drink record {0} not found")]
    RecordNotFound(u32),
    #[error("busy: {0}")]
    Busy(&'static str),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing load cell")]
    MissingLoadCell,
    #[error("missing accelerometer")]
    MissingAccelerometer,
    #[error("missing store")]
    MissingStore,
    #[error("missing retained memory")]
    MissingRetained,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T, E = BottleError> = std::result::Result<T, E>;
pub use eyre::Report;
