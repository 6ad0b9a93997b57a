//! Hardware, clock and storage seams for the bottle firmware core.
//!
//! Every boundary uses `Box<dyn Error + Send + Sync>` so drivers can surface
//! their own error types; `bottle_core` maps them into its typed taxonomy.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock, SystemWallClock, WallClock};

/// Error type used across the trait boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Load-cell amplifier (ADC) source.
///
/// The core never assumes a push/interrupt model: it asks whether a sample is
/// available and then reads one.
pub trait LoadCell {
    fn is_ready(&mut self) -> bool;
    fn read(&mut self) -> Result<i32, BoxError>;
}

/// 3-axis accelerometer returning raw signed counts (x, y, z).
pub trait Accelerometer {
    fn read_raw(&mut self) -> Result<[i16; 3], BoxError>;
}

/// Persistent key-value store.
///
/// Named records hold small fixed structures (calibration, daily state,
/// buffer metadata); slot areas are append-indexed regions such as the drink
/// log. Every call may fail and must be checked by the caller.
pub trait Store {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError>;
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<(), BoxError>;
    fn get_slot(&self, area: &str, index: u32) -> Result<Option<Vec<u8>>, BoxError>;
    fn put_slot(&mut self, area: &str, index: u32, bytes: &[u8]) -> Result<(), BoxError>;
}

/// Low-power memory that survives deep sleep but not power loss.
///
/// Regions are plain bytes; their content after a power cycle is undefined
/// (not necessarily zero).
pub trait RetainedMemory {
    fn region(&mut self, name: &'static str, len: usize) -> &mut [u8];
}

impl<T: LoadCell + ?Sized> LoadCell for Box<T> {
    fn is_ready(&mut self) -> bool {
        (**self).is_ready()
    }
    fn read(&mut self) -> Result<i32, BoxError> {
        (**self).read()
    }
}

impl<T: Accelerometer + ?Sized> Accelerometer for Box<T> {
    fn read_raw(&mut self) -> Result<[i16; 3], BoxError> {
        (**self).read_raw()
    }
}

impl<T: Store + ?Sized> Store for Box<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        (**self).get(key)
    }
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<(), BoxError> {
        (**self).put(key, bytes)
    }
    fn get_slot(&self, area: &str, index: u32) -> Result<Option<Vec<u8>>, BoxError> {
        (**self).get_slot(area, index)
    }
    fn put_slot(&mut self, area: &str, index: u32, bytes: &[u8]) -> Result<(), BoxError> {
        (**self).put_slot(area, index, bytes)
    }
}
