//! Human-readable error descriptions and structured JSON error formatting.

use bottle_core::error::{BottleError, BuildError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Values that pass the schema but contradict each other.\nHow to fix: Edit the config file, then rerun."
            ),
            other => format!(
                "What happened: The device could not be assembled ({other}).\nLikely causes: A driver failed to initialize.\nHow to fix: Re-run with --log-level=debug to see which one."
            ),
        };
    }

    if let Some(be) = err.chain().find_map(|e| e.downcast_ref::<BottleError>()) {
        return match be {
            BottleError::SensorUnavailable(_) => "What happened: Load cell did not respond.\nLikely causes: HX711 not wired correctly, no power/ground, or read timeout too low.\nHow to fix: Verify DT/SCK pins and power, and consider raising hardware.sensor_read_timeout_ms.".to_string(),
            BottleError::PersistenceFailure(msg) => format!(
                "What happened: The persistent store failed ({msg}).\nLikely causes: storage.dir is not writable or the disk is full.\nHow to fix: Point --state-dir or storage.dir at a writable directory."
            ),
            BottleError::TimeUnavailable => "What happened: Drink tracking needs wall time.\nLikely causes: The scenario never set the clock.\nHow to fix: Add start_unix to the scenario or a set_time step before drink operations.".to_string(),
            BottleError::RecordNotFound(id) => format!(
                "What happened: Drink record {id} does not exist or is already deleted.\nHow to fix: List records with `export` first."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open hx711") {
        return "What happened: Failed to initialize the HX711 pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix [hardware] hx711_dt/hx711_sck in the config; ensure the process may access GPIO.".to_string();
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nHow to fix: Pass --config with an existing TOML file. Original: {msg}"
        );
    }

    if lower.contains("parse config") || lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid.\nDetail: {msg}\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("scenario") {
        let cause = err.root_cause();
        return format!("What happened: Scenario failed: {msg}.\nCause: {cause}");
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable short name for the error class, used in JSON and for exit codes.
pub fn error_class(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.chain().find_map(|e| e.downcast_ref::<BottleError>()) {
        Some(BottleError::SensorUnavailable(_)) => "SensorUnavailable",
        Some(BottleError::PersistenceFailure(_)) => "PersistenceFailure",
        Some(_) => "Device",
        None => "Error",
    }
}

/// Map error classes to stable exit codes.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match error_class(err) {
        "Build" => 3,
        "SensorUnavailable" => 4,
        "PersistenceFailure" => 5,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "event": "error",
        "reason": error_class(err),
        "message": humanize(err),
    })
    .to_string()
}
