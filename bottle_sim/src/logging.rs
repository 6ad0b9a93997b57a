//! Tracing subscriber setup.
//!
//! Console output goes to stderr (stdout carries scenario events). Filter
//! priority: `RUST_LOG`, then `--log-level`, then `[logging].level`, then
//! `info`. `[logging].file` adds a JSON-lines file layer through
//! `tracing-appender` with the configured rotation.

use std::path::Path;

use eyre::WrapErr;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::cli::FILE_GUARD;

fn build_filter(cli_level: Option<&str>, cfg_level: Option<&str>) -> EnvFilter {
    if let Ok(f) = EnvFilter::try_from_default_env() {
        return f;
    }
    let level = cli_level.or(cfg_level).unwrap_or("info");
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn appender(file: &str, rotation: Option<&str>) -> eyre::Result<RollingFileAppender> {
    let path = Path::new(file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| eyre::eyre!("logging.file {file:?} has no file name"))?;
    std::fs::create_dir_all(dir).wrap_err_with(|| format!("create log dir {}", dir.display()))?;
    Ok(match rotation.unwrap_or("never") {
        "daily" => rolling::daily(dir, name),
        "hourly" => rolling::hourly(dir, name),
        "never" => rolling::never(dir, name),
        other => eyre::bail!("logging.rotation must be never|daily|hourly, got {other:?}"),
    })
}

pub fn init(json: bool, cli_level: Option<&str>, cfg: &bottle_config::Logging) -> eyre::Result<()> {
    let filter = build_filter(cli_level, cfg.level.as_deref());

    let file_layer = match cfg.file.as_deref() {
        Some(file) => {
            let (writer, guard) = tracing_appender::non_blocking(appender(file, cfg.rotation.as_deref())?);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| eyre::eyre!("install tracing subscriber: {e}"))
}
