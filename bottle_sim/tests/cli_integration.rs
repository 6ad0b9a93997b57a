use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Every section has defaults; only keep the console quiet
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[logging]
level = "warn"

[time]
tz_offset_hours = 0
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

// Gesture calibration, one 50 g sip, then a motion wake.
const DRINK_DAY: &str = r#"
start_unix = 1710064800
seed = 7

[[step]]
do = "wake"
reason = "power_on"

[[step]]
do = "orient"
to = "inverted"

[[step]]
do = "run"
secs = 6

[[step]]
do = "orient"
to = "upright"

[[step]]
do = "run"
secs = 20

[[step]]
do = "fill"
grams = 830

[[step]]
do = "run"
secs = 25

[[step]]
do = "run"
secs = 5

[[step]]
do = "drink"
grams = 50

[[step]]
do = "run"
secs = 6

[[step]]
do = "sleep"
kind = "normal"
secs = 600

[[step]]
do = "wake"
reason = "motion"
"#;

fn write_scenario(dir: &tempfile::TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("scenario.toml");
    fs::write(&path, text).unwrap();
    path
}

fn bin(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bottle_sim").unwrap();
    cmd.arg("--config")
        .arg(write_valid_config(dir))
        .arg("--state-dir")
        .arg(dir.path().join("state"));
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "self_check", "stdout")]
#[case(&["run"], 2, "required", "stderr")]
#[case(&["frobnicate"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let mut cmd = bin(&dir);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn missing_config_is_explained() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("bottle_sim").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("self-check");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("config file could not be read"));
}

#[rstest]
fn invalid_config_value_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[measurement]\nsample_rate_hz = 0\n").unwrap();
    let mut cmd = Command::cargo_bin("bottle_sim").unwrap();
    cmd.arg("--config").arg(&cfg).arg("self-check");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("sample_rate_hz"));
}

#[rstest]
fn drink_day_scenario_counts_the_sip() {
    let dir = tempdir().unwrap();
    let scenario = write_scenario(&dir, DRINK_DAY);
    bin(&dir)
        .arg("run")
        .arg("--scenario")
        .arg(&scenario)
        .assert()
        .success()
        .stdout(predicate::str::contains("calibrated"))
        .stdout(predicate::str::contains("amount_ml=50"))
        .stdout(predicate::str::contains("kind=\"gulp\""));
}

#[rstest]
fn export_after_run_writes_csv() {
    let dir = tempdir().unwrap();
    let scenario = write_scenario(&dir, DRINK_DAY);
    bin(&dir)
        .arg("run")
        .arg("--scenario")
        .arg(&scenario)
        .assert()
        .success();

    let csv = dir.path().join("drinks.csv");
    bin(&dir)
        .arg("export")
        .arg("--csv")
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("rows=1"));

    let text = fs::read_to_string(&csv).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("record_id,timestamp,amount_ml,bottle_level_ml,kind,synced,deleted")
    );
    let row = lines.next().unwrap();
    assert!(row.starts_with("1,"), "{row}");
    assert!(row.contains(",50,"), "{row}");
    assert!(row.contains(",gulp,"), "{row}");
}

#[rstest]
fn scenario_must_start_with_wake() {
    let dir = tempdir().unwrap();
    let scenario = write_scenario(&dir, "[[step]]\ndo = \"run\"\nsecs = 1\n");
    bin(&dir)
        .arg("run")
        .arg("--scenario")
        .arg(&scenario)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("wake"));
}
