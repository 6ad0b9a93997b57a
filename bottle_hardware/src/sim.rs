//! Simulated bottle: one shared physical state feeding a load cell and an
//! accelerometer. The host simulator steers it through `SimBottle`.

use std::sync::{Arc, Mutex, PoisonError};

use bottle_traits::{Accelerometer, BoxError, LoadCell};

use crate::error::HwError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Upright,
    Inverted,
    Sideways,
    /// Carried around: readings swing every sample.
    Moving,
}

#[derive(Debug, Clone, Copy)]
pub struct SimParams {
    /// Reading with nothing on the cell.
    pub unloaded_adc: i32,
    /// Reading with the empty bottle resting on the cell.
    pub empty_adc: i32,
    pub counts_per_gram: f32,
    /// Peak-to-peak jitter in counts.
    pub noise_counts: i32,
    pub lsb_per_g: f32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            unloaded_adc: -40_000,
            empty_adc: 12_000,
            counts_per_gram: 200.0,
            noise_counts: 6,
            lsb_per_g: 16_384.0,
        }
    }
}

#[derive(Debug)]
struct World {
    params: SimParams,
    water_g: f32,
    orientation: Orientation,
    on_surface: bool,
    cell_fault: bool,
    rng: u32,
    tick: u32,
}

impl World {
    fn next_noise(&mut self, amp: i32) -> i32 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        if amp <= 0 {
            return 0;
        }
        (x % (amp as u32 * 2 + 1)) as i32 - amp
    }
}

/// Handle onto the simulated world; clones share it.
#[derive(Debug, Clone)]
pub struct SimBottle {
    world: Arc<Mutex<World>>,
}

impl SimBottle {
    pub fn new(params: SimParams, seed: u32) -> Self {
        Self {
            world: Arc::new(Mutex::new(World {
                params,
                water_g: 0.0,
                orientation: Orientation::Upright,
                on_surface: true,
                cell_fault: false,
                rng: seed.max(1),
                tick: 0,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        let mut g = self.world.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut g)
    }

    pub fn params(&self) -> SimParams {
        self.with(|w| w.params)
    }

    pub fn water_g(&self) -> f32 {
        self.with(|w| w.water_g)
    }

    pub fn set_water_g(&self, g: f32) {
        self.with(|w| w.water_g = g.max(0.0));
    }

    /// Remove water (a sip); returns the amount actually removed.
    pub fn drink(&self, g: f32) -> f32 {
        self.with(|w| {
            let taken = g.min(w.water_g).max(0.0);
            w.water_g -= taken;
            taken
        })
    }

    pub fn set_orientation(&self, o: Orientation) {
        self.with(|w| w.orientation = o);
    }

    pub fn set_on_surface(&self, on: bool) {
        self.with(|w| w.on_surface = on);
    }

    pub fn set_cell_fault(&self, fault: bool) {
        self.with(|w| w.cell_fault = fault);
    }

    pub fn load_cell(&self) -> SimulatedLoadCell {
        SimulatedLoadCell { bottle: self.clone() }
    }

    pub fn accelerometer(&self) -> SimulatedAccelerometer {
        SimulatedAccelerometer { bottle: self.clone() }
    }
}

pub struct SimulatedLoadCell {
    bottle: SimBottle,
}

impl LoadCell for SimulatedLoadCell {
    fn is_ready(&mut self) -> bool {
        true
    }

    fn read(&mut self) -> Result<i32, BoxError> {
        self.bottle.with(|w| {
            if w.cell_fault {
                return Err(HwError::DataReadyTimeout.into());
            }
            let p = w.params;
            let resting = w.on_surface && w.orientation == Orientation::Upright;
            let base = if resting {
                p.empty_adc + (w.water_g * p.counts_per_gram).round() as i32
            } else {
                p.unloaded_adc
            };
            Ok(base + w.next_noise(p.noise_counts / 2))
        })
    }
}

pub struct SimulatedAccelerometer {
    bottle: SimBottle,
}

impl Accelerometer for SimulatedAccelerometer {
    fn read_raw(&mut self) -> Result<[i16; 3], BoxError> {
        Ok(self.bottle.with(|w| {
            let one_g = w.params.lsb_per_g.clamp(1.0, f32::from(i16::MAX)) as i16;
            w.tick = w.tick.wrapping_add(1);
            let j = w.next_noise(20) as i16;
            match w.orientation {
                Orientation::Upright => [j, -j, one_g - j.abs()],
                Orientation::Inverted => [j, j, -one_g + j.abs()],
                Orientation::Sideways => [one_g - j.abs(), j, j],
                Orientation::Moving => {
                    let swing = if w.tick % 2 == 0 { one_g / 2 } else { -one_g / 2 };
                    [swing, j, one_g / 2]
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_follows_water_and_orientation() {
        let sim = SimBottle::new(SimParams::default(), 7);
        let mut cell = sim.load_cell();
        let empty = cell.read().unwrap();
        assert!((empty - 12_000).abs() <= 3);

        sim.set_water_g(500.0);
        let full = cell.read().unwrap();
        assert!((full - 112_000).abs() <= 3);

        sim.set_orientation(Orientation::Inverted);
        assert!((cell.read().unwrap() + 40_000).abs() <= 3);
    }

    #[test]
    fn drink_never_goes_negative() {
        let sim = SimBottle::new(SimParams::default(), 1);
        sim.set_water_g(20.0);
        assert_eq!(sim.drink(50.0), 20.0);
        assert_eq!(sim.water_g(), 0.0);
    }

    #[test]
    fn accelerometer_reports_orientation() {
        let sim = SimBottle::new(SimParams::default(), 3);
        let mut acc = sim.accelerometer();
        assert!(acc.read_raw().unwrap()[2] > 16_000);
        sim.set_orientation(Orientation::Inverted);
        assert!(acc.read_raw().unwrap()[2] < -16_000);
        sim.set_orientation(Orientation::Sideways);
        assert!(acc.read_raw().unwrap()[0] > 16_000);
    }

    #[test]
    fn cell_fault_surfaces_typed_error() {
        let sim = SimBottle::new(SimParams::default(), 3);
        sim.set_cell_fault(true);
        let err = sim.load_cell().read().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HwError>(),
            Some(HwError::DataReadyTimeout)
        ));
    }
}
