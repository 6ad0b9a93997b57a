use bottle_config::{load_file, load_toml};
use rstest::rstest;
use std::fs;
use tempfile::tempdir;

#[test]
fn empty_file_is_valid_with_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults should validate");
    assert_eq!(cfg.measurement.duration_s, 10);
    assert_eq!(cfg.measurement.min_samples, 8);
    assert_eq!(cfg.drinks.day_reset_hour, 4);
    assert_eq!(cfg.activity.motion_log_capacity, 100);
    assert!(cfg.factory_calibration.is_none());
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let toml = r#"
[drinks]
drink_threshold_ml = 25.0

[time]
tz_offset_hours = -5
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.drinks.drink_threshold_ml, 25.0);
    assert_eq!(cfg.drinks.pour_threshold_ml, 100.0);
    assert_eq!(cfg.time.tz_offset_hours, -5);
}

#[rstest]
#[case("[measurement]\nsample_rate_hz = 0", "sample_rate_hz must be > 0")]
#[case("[measurement]\nduration_s = 0", "duration_s must be >= 1")]
#[case(
    "[measurement]\nduration_s = 1\nsample_rate_hz = 2\nmin_samples = 8",
    "exceeds samples per measurement"
)]
#[case("[gesture]\nwindow = 1", "gesture.window must be >= 2")]
#[case("[gesture]\ninverted_z_g = 0.5", "inverted_z_g must be in")]
#[case("[calibration]\nwater_volume_ml = 0.0", "water_volume_ml must be > 0")]
#[case("[calibration]\nmin_full_delta_adc = -3", "min_full_delta_adc must be > 0")]
#[case("[drinks]\npour_threshold_ml = 20.0", "pour_threshold_ml must exceed")]
#[case("[drinks]\ndrift_tolerance_ml = 40.0", "drift_tolerance_ml must be in")]
#[case("[drinks]\nday_reset_hour = 24", "day_reset_hour must be in 0..=23")]
#[case("[time]\ntz_offset_hours = 20", "tz_offset_hours must be in")]
#[case("[storage]\ndrink_log_capacity = 0", "drink_log_capacity must be >= 1")]
#[case(
    "[activity]\nmotion_log_capacity = 70000",
    "activity log capacities must be <= 65535"
)]
#[case(
    "[factory_calibration]\nempty_adc = 100\nfull_adc = 50",
    "full_adc must exceed empty_adc"
)]
fn rejects_out_of_range_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "error {err} does not mention {needle}"
    );
}

#[test]
fn factory_calibration_scale_factor_is_optional() {
    let toml = r#"
[factory_calibration]
empty_adc = 10000
full_adc = 176000
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid");
    let f = cfg.factory_calibration.expect("present");
    assert_eq!(f.empty_adc, 10_000);
    assert!(f.scale_factor.is_none());
}

#[test]
fn load_file_reports_path_on_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[drinks\nbroken").unwrap();
    let err = load_file(&path).expect_err("parse error");
    assert!(format!("{err}").contains("parse config"));
}

#[test]
fn load_file_validates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(&path, "[gesture]\nlsb_per_g = 0.0\n").unwrap();
    let err = load_file(&path).expect_err("validation error");
    assert!(format!("{err}").contains("lsb_per_g must be > 0"));
}
