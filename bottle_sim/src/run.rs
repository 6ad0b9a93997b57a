//! Scenario execution: the simulated world, the device and their clock.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bottle_core::{
    Bottle, BottleCfg, CalPoint, CalState, CalibrationData, DrinkEvent, DrinkKind, Gesture,
    TickReport,
};
use bottle_hardware::{FileStore, Orientation, RetainedRam, SimBottle, SimParams};
use bottle_traits::ManualClock;
use eyre::WrapErr;
use serde_json::{Value, json};

use crate::scenario::{Point, Scenario, Step};

/// Prints events as JSON lines or as aligned text.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    pub fn emit(&self, ev: &Value) {
        if self.json {
            println!("{ev}");
            return;
        }
        let name = ev.get("event").and_then(Value::as_str).unwrap_or("?");
        let fields = ev
            .as_object()
            .map(|m| {
                m.iter()
                    .filter(|(k, _)| k.as_str() != "event")
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        println!("{name:<12} {fields}");
    }
}

pub fn kind_name(k: DrinkKind) -> &'static str {
    match k {
        DrinkKind::Gulp => "gulp",
        DrinkKind::Pour => "pour",
    }
}

fn drink_json(ev: &DrinkEvent, t_ms: u64) -> Option<Value> {
    Some(match *ev {
        DrinkEvent::BaselineSet { level_ml } => {
            json!({ "event": "baseline", "t_ms": t_ms, "level_ml": level_ml.round() })
        }
        DrinkEvent::Drink {
            record_id,
            amount_ml,
            kind,
            level_ml,
        } => json!({
            "event": "drink",
            "t_ms": t_ms,
            "record_id": record_id,
            "amount_ml": amount_ml,
            "kind": kind_name(kind),
            "level_ml": level_ml.round(),
        }),
        DrinkEvent::Refill { amount_ml, level_ml } => json!({
            "event": "refill",
            "t_ms": t_ms,
            "amount_ml": amount_ml.round(),
            "level_ml": level_ml.round(),
        }),
        DrinkEvent::OutOfRange { level_ml } => {
            json!({ "event": "out_of_range", "t_ms": t_ms, "level_ml": level_ml.round() })
        }
        // steady-state noise
        DrinkEvent::DriftAdjusted { .. } | DrinkEvent::Holding { .. } => return None,
    })
}

fn calibrated_json(c: &CalibrationData, t_ms: u64) -> Value {
    json!({
        "event": "calibrated",
        "t_ms": t_ms,
        "scale_factor": c.scale_factor,
        "empty_adc": c.empty_adc,
        "full_adc": c.full_adc,
    })
}

struct Sim<'a> {
    cfg: &'a bottle_config::Config,
    core: BottleCfg,
    world: SimBottle,
    clock: ManualClock,
    store: FileStore,
    bottle: Bottle,
    out: Output,
    tick: Duration,
    last_cal: CalState,
    last_gesture: Gesture,
}

fn assemble(
    cfg: &bottle_config::Config,
    core: &BottleCfg,
    world: &SimBottle,
    clock: &ManualClock,
    store: FileStore,
) -> eyre::Result<Bottle> {
    let factory = cfg
        .factory_calibration
        .as_ref()
        .map(|f| CalibrationData::from_factory(f, &core.calibration));
    Bottle::builder()
        .with_config(core.clone())
        .with_load_cell(world.load_cell())
        .with_accelerometer(world.accelerometer())
        .with_store(store)
        .with_retained(RetainedRam::new())
        .with_clock(Arc::new(clock.clone()))
        .with_wall_clock(Arc::new(clock.clone()))
        .with_factory_calibration(factory)
        .build()
}

impl Sim<'_> {
    fn elapsed_ms(&self) -> u64 {
        self.bottle.now_ms()
    }

    fn observe(&mut self, r: &TickReport) {
        if r.gesture != self.last_gesture {
            if matches!(r.gesture, Gesture::InvertedHold | Gesture::SidewaysTilt) {
                self.out.emit(&json!({
                    "event": "gesture",
                    "t_ms": r.now_ms,
                    "gesture": format!("{:?}", r.gesture),
                }));
            }
            self.last_gesture = r.gesture;
        }
        if r.calibration != self.last_cal {
            self.out.emit(&json!({
                "event": "calibration",
                "t_ms": r.now_ms,
                "state": format!("{:?}", r.calibration),
            }));
            self.last_cal = r.calibration;
        }
        if let Some(c) = &r.calibrated {
            self.out.emit(&calibrated_json(c, r.now_ms));
        }
        if let Some(v) = r.drink.as_ref().and_then(|d| drink_json(d, r.now_ms)) {
            self.out.emit(&v);
        }
    }

    fn run_for(&mut self, secs: f32) {
        let span = (f64::from(secs.max(0.0)) * 1_000.0) as u64;
        let end = self.elapsed_ms().saturating_add(span);
        while self.elapsed_ms() < end {
            self.clock.advance(self.tick);
            let r = self.bottle.tick();
            self.observe(&r);
        }
    }

    fn power_loss(&mut self) -> eyre::Result<()> {
        self.clock.clear_wall_time();
        self.bottle = assemble(self.cfg, &self.core, &self.world, &self.clock, self.store.clone())?;
        self.last_cal = CalState::Idle;
        self.out.emit(&json!({ "event": "power_loss" }));
        Ok(())
    }

    fn remote(&mut self, point: Point) -> eyre::Result<()> {
        if !matches!(
            self.bottle.calibration_status(),
            bottle_core::RemoteStatus::Ready { .. }
        ) {
            self.bottle.calibration_start()?;
        }
        let point = match point {
            Point::Empty => CalPoint::Empty,
            Point::Full => CalPoint::Full,
        };
        self.bottle.calibration_measure(point)?;
        self.clock.advance(self.tick);
        let r = self.bottle.tick();
        self.observe(&r);
        self.out.emit(&json!({
            "event": "remote_status",
            "status": format!("{:?}", self.bottle.calibration_status()),
        }));
        Ok(())
    }

    fn step(&mut self, step: &Step) -> eyre::Result<()> {
        tracing::debug!(?step, "scenario step");
        match *step {
            Step::Wake { reason } => {
                self.bottle.wake(reason.into());
                self.last_cal = CalState::Idle;
                self.out.emit(&json!({
                    "event": "wake",
                    "reason": format!("{:?}", bottle_core::WakeReason::from(reason)),
                    "calibrated": self.bottle.calibration().is_some_and(|c| c.is_usable()),
                    "total_ml": self.bottle.totals().total_ml,
                }));
            }
            Step::Run { secs } => self.run_for(secs),
            Step::Sleep { kind, secs } => {
                self.bottle.prepare_sleep(kind.into());
                self.out.emit(&json!({
                    "event": "sleep",
                    "kind": format!("{:?}", bottle_core::SleepType::from(kind)),
                    "secs": secs,
                }));
                self.clock.advance(Duration::from_secs(secs));
            }
            Step::Orient { to } => {
                self.world.set_orientation(Orientation::from(to));
            }
            Step::Surface { on } => self.world.set_on_surface(on),
            Step::Fill { grams } => self.world.set_water_g(grams),
            Step::Drink { grams } => {
                let taken = self.world.drink(grams);
                tracing::debug!(taken, "simulated sip");
            }
            Step::CellFault { on } => self.world.set_cell_fault(on),
            Step::SetTime { unix } => self.clock.set_wall_time(unix),
            Step::PowerLoss => self.power_loss()?,
            Step::RemoteCalibrate { point } => self.remote(point)?,
            Step::CancelLastDrink => {
                let rec = self.bottle.cancel_last_drink()?;
                self.out.emit(&json!({
                    "event": "cancelled",
                    "record_id": rec.map(|r| r.record_id),
                }));
            }
            Step::MarkSynced { up_to } => {
                let n = self.bottle.mark_synced(up_to)?;
                self.out.emit(&json!({ "event": "synced", "up_to": up_to, "marked": n }));
            }
        }
        Ok(())
    }

    fn summary(&self) -> Value {
        let totals = self.bottle.totals();
        let records = self.bottle.drink_records().unwrap_or_default();
        let unsynced = records.iter().filter(|r| !r.synced && !r.deleted).count();
        json!({
            "event": "summary",
            "total_ml": totals.total_ml,
            "drink_count": totals.drink_count,
            "session_ml": self.bottle.current_session_ml(),
            "records": records.len(),
            "unsynced": unsynced,
            "storage_warning": totals.storage_warning,
            "motion_wakes": self.bottle.activity().motion_events().len(),
            "sessions": self.bottle.activity().sessions().len(),
            "calibrated": self.bottle.calibration().is_some_and(|c| c.is_usable()),
        })
    }
}

/// Run a scenario against the store in `state_dir`.
pub fn run_scenario(
    cfg: &bottle_config::Config,
    scenario: &Scenario,
    state_dir: &Path,
    out: Output,
) -> eyre::Result<()> {
    let core = BottleCfg::from(cfg);
    let world = SimBottle::new(SimParams::default(), scenario.seed);
    world.set_water_g(scenario.initial_water_g);
    let clock = match scenario.start_unix {
        Some(t) => ManualClock::with_wall_time(t),
        None => ManualClock::new(),
    };
    let store = FileStore::open(state_dir)
        .wrap_err_with(|| format!("open store at {}", state_dir.display()))?;
    let bottle = assemble(cfg, &core, &world, &clock, store.clone())?;
    let mut sim = Sim {
        cfg,
        core,
        world,
        clock,
        store,
        bottle,
        out,
        tick: Duration::from_millis(scenario.tick_ms),
        last_cal: CalState::Idle,
        last_gesture: Gesture::None,
    };
    tracing::info!(steps = scenario.steps.len(), dir = %state_dir.display(), "scenario start");
    for (i, step) in scenario.steps.iter().enumerate() {
        sim.step(step).wrap_err_with(|| format!("scenario step {} ({step:?})", i + 1))?;
    }
    sim.bottle.prepare_sleep(bottle_core::SleepType::Normal);
    out.emit(&sim.summary());
    Ok(())
}
