//! Type-state builder for `Bottle`.
//!
//! The builder enforces at compile time that the load cell, accelerometer
//! and store are provided before `build()` is available. `try_build()` is
//! always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use bottle_traits::{
    Accelerometer, Clock, LoadCell, MonotonicClock, RetainedMemory, Store, SystemWallClock,
    WallClock,
};

use crate::activity::ActivityRecorder;
use crate::calibration::CalibrationData;
use crate::config::BottleCfg;
use crate::device::Bottle;
use crate::drinks::DrinkTracker;
use crate::error::BuildError;
use crate::gesture::GestureClassifier;
use crate::measurement::WeightSensor;
use crate::remote::RemoteCalibration;
use crate::retained::MAX_CAPACITY;
use crate::workflow::CalibrationWorkflow;

pub struct Missing;
pub struct Set;

/// Builder for `Bottle`. Configuration is validated on `build()`.
pub struct BottleBuilder<L, A, S> {
    load_cell: Option<Box<dyn LoadCell>>,
    accel: Option<Box<dyn Accelerometer>>,
    store: Option<Box<dyn Store>>,
    retained: Option<Box<dyn RetainedMemory>>,
    cfg: Option<BottleCfg>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    wall: Option<Arc<dyn WallClock + Send + Sync>>,
    factory: Option<CalibrationData>,
    _l: PhantomData<L>,
    _a: PhantomData<A>,
    _s: PhantomData<S>,
}

impl Default for BottleBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            load_cell: None,
            accel: None,
            store: None,
            retained: None,
            cfg: None,
            clock: None,
            wall: None,
            factory: None,
            _l: PhantomData,
            _a: PhantomData,
            _s: PhantomData,
        }
    }
}

impl Bottle {
    pub fn builder() -> BottleBuilder<Missing, Missing, Missing> {
        BottleBuilder::default()
    }
}

fn validate(cfg: &BottleCfg) -> Result<(), BuildError> {
    if cfg.measurement.sample_rate_hz == 0 {
        return Err(BuildError::InvalidConfig("sample_rate_hz must be > 0"));
    }
    if cfg.measurement.duration_s == 0 {
        return Err(BuildError::InvalidConfig("measurement duration must be > 0"));
    }
    if cfg.gesture.window < 2 {
        return Err(BuildError::InvalidConfig("gesture window must be >= 2"));
    }
    if !(cfg.gesture.lsb_per_g > 0.0) {
        return Err(BuildError::InvalidConfig("lsb_per_g must be > 0"));
    }
    if !(cfg.calibration.water_volume_ml > 0.0 && cfg.calibration.water_density > 0.0) {
        return Err(BuildError::InvalidConfig("calibration water mass must be > 0"));
    }
    if !(cfg.calibration.max_scale_factor > 0.0) {
        return Err(BuildError::InvalidConfig("max_scale_factor must be > 0"));
    }
    if cfg.drinks.pour_threshold_ml <= cfg.drinks.drink_threshold_ml {
        return Err(BuildError::InvalidConfig(
            "pour threshold must exceed drink threshold",
        ));
    }
    if cfg.drinks.log_capacity == 0 {
        return Err(BuildError::InvalidConfig("drink log capacity must be >= 1"));
    }
    if cfg.activity.motion_log_capacity == 0 || cfg.activity.session_log_capacity == 0 {
        return Err(BuildError::InvalidConfig("activity log capacities must be >= 1"));
    }
    if cfg.activity.motion_log_capacity > MAX_CAPACITY
        || cfg.activity.session_log_capacity > MAX_CAPACITY
    {
        return Err(BuildError::InvalidConfig("activity log capacities must be <= 65535"));
    }
    Ok(())
}

impl<L, A, S> BottleBuilder<L, A, S> {
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> eyre::Result<Bottle> {
        let load_cell = self
            .load_cell
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLoadCell))?;
        let accel = self
            .accel
            .ok_or_else(|| eyre::Report::new(BuildError::MissingAccelerometer))?;
        let store = self
            .store
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;
        let retained = self
            .retained
            .ok_or_else(|| eyre::Report::new(BuildError::MissingRetained))?;
        let cfg = self.cfg.unwrap_or_default();
        validate(&cfg).map_err(eyre::Report::new)?;

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        let wall: Arc<dyn WallClock + Send + Sync> = match self.wall {
            Some(w) => w,
            None => Arc::new(SystemWallClock),
        };
        let epoch = clock.now();
        let min_samples = cfg.measurement.stats.min_samples;

        Ok(Bottle {
            sensor: WeightSensor::new(load_cell, Arc::clone(&clock), cfg.measurement),
            accel,
            store,
            retained,
            clock,
            wall,
            epoch,
            classifier: GestureClassifier::new(cfg.gesture),
            workflow: CalibrationWorkflow::new(cfg.calibration, min_samples),
            remote: RemoteCalibration::new(cfg.calibration, min_samples),
            drinks: DrinkTracker::new(cfg.drinks),
            activity: ActivityRecorder::new(cfg.activity),
            calibration: None,
            factory: self.factory,
            last_drink_check_ms: None,
            cfg,
        })
    }

    pub fn with_config(mut self, cfg: BottleCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    pub fn with_retained(mut self, retained: impl RetainedMemory + 'static) -> Self {
        self.retained = Some(Box::new(retained));
        self
    }

    /// Monotonic clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Wall clock; defaults to the host system clock.
    pub fn with_wall_clock(mut self, wall: Arc<dyn WallClock + Send + Sync>) -> Self {
        self.wall = Some(wall);
        self
    }

    /// Calibration to seed the store with when it holds none.
    pub fn with_factory_calibration(mut self, cal: Option<CalibrationData>) -> Self {
        self.factory = cal;
        self
    }
}

impl<A, S> BottleBuilder<Missing, A, S> {
    pub fn with_load_cell(self, cell: impl LoadCell + 'static) -> BottleBuilder<Set, A, S> {
        BottleBuilder {
            load_cell: Some(Box::new(cell)),
            accel: self.accel,
            store: self.store,
            retained: self.retained,
            cfg: self.cfg,
            clock: self.clock,
            wall: self.wall,
            factory: self.factory,
            _l: PhantomData,
            _a: PhantomData,
            _s: PhantomData,
        }
    }
}

impl<L, S> BottleBuilder<L, Missing, S> {
    pub fn with_accelerometer(
        self,
        accel: impl Accelerometer + 'static,
    ) -> BottleBuilder<L, Set, S> {
        BottleBuilder {
            load_cell: self.load_cell,
            accel: Some(Box::new(accel)),
            store: self.store,
            retained: self.retained,
            cfg: self.cfg,
            clock: self.clock,
            wall: self.wall,
            factory: self.factory,
            _l: PhantomData,
            _a: PhantomData,
            _s: PhantomData,
        }
    }
}

impl<L, A> BottleBuilder<L, A, Missing> {
    pub fn with_store(self, store: impl Store + 'static) -> BottleBuilder<L, A, Set> {
        BottleBuilder {
            load_cell: self.load_cell,
            accel: self.accel,
            store: Some(Box::new(store)),
            retained: self.retained,
            cfg: self.cfg,
            clock: self.clock,
            wall: self.wall,
            factory: self.factory,
            _l: PhantomData,
            _a: PhantomData,
            _s: PhantomData,
        }
    }
}

impl BottleBuilder<Set, Set, Set> {
    /// Only available once load cell, accelerometer and store are set.
    pub fn build(self) -> eyre::Result<Bottle> {
        self.try_build()
    }
}
