//! Host simulator for the smart bottle core.
//!
//! Drives `bottle_core::Bottle` against simulated sensors, a file-backed
//! store and a manual clock, from scenario files.

mod cli;
mod error_fmt;
mod export;
mod logging;
mod run;
mod scenario;
mod self_check;

use std::path::PathBuf;

use clap::Parser;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::run::Output;

fn state_dir(cli: &Cli, cfg: &bottle_config::Config) -> PathBuf {
    cli.state_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.storage.dir))
}

fn real_main(cli: &Cli) -> eyre::Result<()> {
    color_eyre::install()?;
    let cfg = bottle_config::load_file(&cli.config)?;
    logging::init(cli.json, cli.log_level.as_deref(), &cfg.logging)?;
    let dir = state_dir(cli, &cfg);
    let out = Output { json: cli.json };

    match &cli.cmd {
        Commands::Run { scenario } => {
            let sc = scenario::Scenario::load(scenario)?;
            run::run_scenario(&cfg, &sc, &dir, out)
        }
        Commands::Export { csv } => {
            let n = export::export_csv(&dir, cfg.storage.drink_log_capacity, csv)?;
            out.emit(&serde_json::json!({
                "event": "exported",
                "rows": n,
                "path": csv.display().to_string(),
            }));
            Ok(())
        }
        Commands::SelfCheck => {
            let report = self_check::run(&cfg, &dir)?;
            out.emit(&report);
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = real_main(&cli) {
        tracing::error!(error = %e, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}
