//! Scenario files: a simulated world plus a list of steps.
//!
//! ```toml
//! start_unix = 1710064800   # omit to boot without wall time
//! tick_ms = 100
//! seed = 7
//!
//! [[step]]
//! do = "wake"
//! reason = "power_on"
//!
//! [[step]]
//! do = "run"
//! secs = 30
//! ```

use std::path::Path;

use bottle_core::{SleepType, WakeReason};
use bottle_hardware::Orientation;
use eyre::WrapErr;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub start_unix: Option<u32>,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default)]
    pub seed: u32,
    /// Water in the bottle before the first step (grams)
    #[serde(default)]
    pub initial_water_g: f32,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

fn default_tick_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Wake {
    Motion,
    Timer,
    PowerOn,
}

impl From<Wake> for WakeReason {
    fn from(w: Wake) -> Self {
        match w {
            Wake::Motion => Self::Motion,
            Wake::Timer => Self::Timer,
            Wake::PowerOn => Self::PowerOn,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sleep {
    Normal,
    Extended,
}

impl From<Sleep> for SleepType {
    fn from(s: Sleep) -> Self {
        match s {
            Sleep::Normal => Self::Normal,
            Sleep::Extended => Self::Extended,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Pose {
    Upright,
    Inverted,
    Sideways,
    Moving,
}

impl From<Pose> for Orientation {
    fn from(p: Pose) -> Self {
        match p {
            Pose::Upright => Self::Upright,
            Pose::Inverted => Self::Inverted,
            Pose::Sideways => Self::Sideways,
            Pose::Moving => Self::Moving,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Point {
    Empty,
    Full,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "do", rename_all = "snake_case")]
pub enum Step {
    Wake { reason: Wake },
    /// Tick the device for this much simulated time.
    Run { secs: f32 },
    /// Go to sleep and let time pass; the next step is normally a wake.
    Sleep { kind: Sleep, secs: u64 },
    Orient { to: Pose },
    Surface { on: bool },
    /// Set the water level.
    Fill { grams: f32 },
    /// Remove water, as if someone drank it.
    Drink { grams: f32 },
    CellFault { on: bool },
    SetTime { unix: u32 },
    /// Lose power: retained memory and wall time are gone, the store survives.
    PowerLoss,
    /// Ask for one point of the transport-driven calibration.
    RemoteCalibrate { point: Point },
    CancelLastDrink,
    MarkSynced { up_to: u32 },
}

impl Scenario {
    pub fn from_toml(text: &str) -> eyre::Result<Self> {
        let s: Self = toml::from_str(text)?;
        if s.tick_ms == 0 {
            eyre::bail!("scenario tick_ms must be > 0");
        }
        if s.steps.is_empty() {
            eyre::bail!("scenario has no [[step]] entries");
        }
        if s.steps.first().is_some_and(|st| !matches!(st, Step::Wake { .. })) {
            eyre::bail!("scenario must start with a wake step");
        }
        Ok(s)
    }

    pub fn load(path: &Path) -> eyre::Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("read scenario {}", path.display()))?;
        Self::from_toml(&text).wrap_err_with(|| format!("parse scenario {}", path.display()))
    }
}
