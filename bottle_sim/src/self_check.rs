//! `self-check`: config, store and sensor presence.

use std::path::Path;

use bottle_core::hw_error::{map_sensor_error, map_store_error};
use bottle_hardware::{FileStore, SimBottle, SimParams};
use bottle_traits::{Accelerometer, LoadCell, Store};
use eyre::WrapErr;

const PROBE_KEY: &str = "self_check";

/// Set to make the simulated load cell stop answering.
pub const FAULT_ENV: &str = "BOTTLE_SIM_CELL_FAULT";

fn store_round_trip(state_dir: &Path) -> eyre::Result<()> {
    let mut store = FileStore::open(state_dir)
        .wrap_err_with(|| format!("open store at {}", state_dir.display()))?;
    let probe = [0xB0, 0x77, 0x1E];
    store.put(PROBE_KEY, &probe).map_err(|e| map_store_error(&*e))?;
    let back = store.get(PROBE_KEY).map_err(|e| map_store_error(&*e))?;
    if back.as_deref() != Some(&probe[..]) {
        eyre::bail!("store round-trip mismatch in {}", state_dir.display());
    }
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn probe_load_cell(cfg: &bottle_config::Config) -> eyre::Result<i32> {
    let timeout = std::time::Duration::from_millis(cfg.hardware.sensor_read_timeout_ms);
    let mut cell = bottle_hardware::hx711::Hx711::open(cfg.hardware.hx711_dt, cfg.hardware.hx711_sck, timeout)
        .wrap_err("open hx711")?;
    let raw = cell.read_with_timeout(timeout).wrap_err("hx711 read")?;
    cell.power_down();
    Ok(raw)
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn probe_load_cell(_cfg: &bottle_config::Config) -> eyre::Result<i32> {
    let world = SimBottle::new(SimParams::default(), 0);
    world.set_cell_fault(std::env::var_os(FAULT_ENV).is_some());
    let mut cell = world.load_cell();
    Ok(cell.read().map_err(|e| map_sensor_error(&*e))?)
}

pub fn run(cfg: &bottle_config::Config, state_dir: &Path) -> eyre::Result<serde_json::Value> {
    store_round_trip(state_dir)?;
    let raw = probe_load_cell(cfg)?;
    let accel = SimBottle::new(SimParams::default(), 0)
        .accelerometer()
        .read_raw()
        .map_err(|e| map_sensor_error(&*e))?;
    tracing::info!(raw, ?accel, "self-check passed");
    Ok(serde_json::json!({
        "event": "self_check",
        "ok": true,
        "load_cell_raw": raw,
        "store": state_dir.display().to_string(),
    }))
}
