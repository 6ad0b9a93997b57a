use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("cfg.toml");
    fs::write(&path, "[logging]\nlevel = \"error\"\n").unwrap();
    path
}

// Calibrate with the factory section, sip twice, lose power, come back.
const POWER_LOSS_DAY: &str = r#"
start_unix = 1710064800
initial_water_g = 600

[[step]]
do = "wake"
reason = "power_on"

[[step]]
do = "run"
secs = 5

[[step]]
do = "drink"
grams = 40

[[step]]
do = "run"
secs = 5

[[step]]
do = "drink"
grams = 120

[[step]]
do = "run"
secs = 5

[[step]]
do = "sleep"
kind = "extended"
secs = 3600

[[step]]
do = "power_loss"

[[step]]
do = "set_time"
unix = 1710068460

[[step]]
do = "wake"
reason = "power_on"
"#;

fn run_json(dir: &tempfile::TempDir, cfg: &Path, scenario: &str) -> Vec<serde_json::Value> {
    let sc = dir.path().join("scenario.toml");
    fs::write(&sc, scenario).unwrap();
    let out = Command::cargo_bin("bottle_sim")
        .unwrap()
        .arg("--json")
        .arg("--config")
        .arg(cfg)
        .arg("--state-dir")
        .arg(dir.path().join("state"))
        .arg("run")
        .arg("--scenario")
        .arg(&sc)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8_lossy(&out)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("bad JSON line {l:?}: {e}")))
        .collect()
}

fn events<'a>(all: &'a [serde_json::Value], name: &str) -> Vec<&'a serde_json::Value> {
    all.iter().filter(|v| v["event"] == name).collect()
}

/// Every stdout line is an event object; drinks and the summary carry their fields.
#[rstest]
fn jsonl_events_schema() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(
        &cfg,
        "[logging]\nlevel = \"error\"\n\n[factory_calibration]\nempty_adc = 12000\nfull_adc = 178000\n",
    )
    .unwrap();
    let all = run_json(&dir, &cfg, POWER_LOSS_DAY);
    assert!(all.iter().all(|v| v.get("event").and_then(|e| e.as_str()).is_some()));

    let drinks = events(&all, "drink");
    assert_eq!(drinks.len(), 2, "{all:#?}");
    assert_eq!(drinks[0]["amount_ml"], 40);
    assert_eq!(drinks[0]["kind"], "gulp");
    assert_eq!(drinks[1]["amount_ml"], 120);
    assert_eq!(drinks[1]["kind"], "pour");
    for d in &drinks {
        assert!(d["record_id"].as_u64().is_some());
        assert!(d["level_ml"].as_f64().is_some());
        assert!(d["t_ms"].as_u64().is_some());
    }

    assert_eq!(events(&all, "power_loss").len(), 1);
    let wakes = events(&all, "wake");
    assert_eq!(wakes.len(), 2);
    // the store survives the power loss
    assert_eq!(wakes[1]["total_ml"], 160);
    assert_eq!(wakes[1]["calibrated"], true);

    let summary = events(&all, "summary");
    assert_eq!(summary.len(), 1);
    let s = summary[0];
    assert_eq!(s["total_ml"], 160);
    assert_eq!(s["drink_count"], 2);
    assert_eq!(s["records"], 2);
    // retained memory did not survive
    assert_eq!(s["sessions"], 0);
}

/// Errors in JSON mode are a single object on stdout with a stable reason.
#[rstest]
fn jsonl_error_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let out = Command::cargo_bin("bottle_sim")
        .unwrap()
        .env("BOTTLE_SIM_CELL_FAULT", "1")
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("--state-dir")
        .arg(dir.path().join("state"))
        .arg("self-check")
        .assert()
        .code(4)
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout.lines().find(|l| l.contains("\"error\"")).unwrap_or("");
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert_eq!(v["reason"], "SensorUnavailable");
    assert!(v["message"].as_str().is_some_and(|m| !m.is_empty()));
}
