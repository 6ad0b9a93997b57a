//! HX711 24-bit load-cell amplifier over bit-banged GPIO (Raspberry Pi).

use std::time::Duration;

use bottle_traits::{BoxError, LoadCell};
use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::wait_until_low_with_timeout;

/// Extra clock pulses after the 24 data bits select the next conversion:
/// 1 = channel A gain 128, 2 = channel B gain 32, 3 = channel A gain 64.
pub const GAIN_A128: u8 = 1;

pub struct Hx711 {
    dt: InputPin,
    sck: OutputPin,
    gain_pulses: u8,
    timeout: Duration,
}

impl Hx711 {
    pub fn new(dt: InputPin, mut sck: OutputPin, gain_pulses: u8, timeout: Duration) -> Self {
        sck.set_low(); // clock idle low; high for >60 µs powers the chip down
        Self {
            dt,
            sck,
            gain_pulses: gain_pulses.clamp(1, 3),
            timeout,
        }
    }

    /// Claim the pins by BCM number.
    pub fn open(dt_pin: u8, sck_pin: u8, timeout: Duration) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let dt = gpio
            .get(dt_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input();
        let sck = gpio
            .get(sck_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        Ok(Self::new(dt, sck, GAIN_A128, timeout))
    }

    fn pulse(&mut self) {
        self.sck.set_high();
        std::hint::spin_loop();
        self.sck.set_low();
        std::hint::spin_loop();
    }

    /// Block until a conversion is ready (DT low) and clock it out.
    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        let dt = &self.dt;
        wait_until_low_with_timeout(|| dt.is_high(), timeout, Duration::from_micros(200))?;

        let mut value: i32 = 0;
        for _ in 0..24 {
            self.sck.set_high();
            std::hint::spin_loop();
            value = (value << 1) | i32::from(self.dt.is_high());
            self.sck.set_low();
            std::hint::spin_loop();
        }
        for _ in 0..self.gain_pulses {
            self.pulse();
        }

        // sign-extend 24-bit two's complement
        if value & 0x80_0000 != 0 {
            value |= !0xFF_FFFF;
        }
        trace!(raw = value, "hx711 raw read");
        Ok(value)
    }

    /// Hold SCK high to enter power-down before deep sleep.
    pub fn power_down(&mut self) {
        self.sck.set_high();
    }
}

impl LoadCell for Hx711 {
    fn is_ready(&mut self) -> bool {
        self.dt.is_low()
    }

    fn read(&mut self) -> std::result::Result<i32, BoxError> {
        let timeout = self.timeout;
        self.read_with_timeout(timeout).map_err(Into::into)
    }
}
