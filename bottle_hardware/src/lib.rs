//! Hardware and host-side implementations of the `bottle_traits` seams.
//!
//! - `hx711` (feature `hardware`): bit-banged HX711 load-cell amplifier.
//! - `sim`: simulated load cell and accelerometer sharing one bottle model.
//! - `file_store`: directory-backed persistent store with atomic writes.
//! - `retained`: heap-backed retained RAM.
pub mod error;
pub mod file_store;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hx711;
pub mod retained;
pub mod sim;
pub mod util;

pub use error::HwError;
pub use file_store::FileStore;
pub use retained::RetainedRam;
pub use sim::{Orientation, SimBottle, SimParams};
