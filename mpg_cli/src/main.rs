#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `mpg`: drive the fuel computer from the command line.

mod cli;
mod commands;
mod error_fmt;
mod logging;

use std::path::Path;

use clap::Parser;
use eyre::{Result, WrapErr};
use mpg_config::Config;
use mpg_core::Trip;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::commands::{EvaluateArgs, SimulateArgs};
use crate::error_fmt::{CliError, exit_code_for_error, format_error_json, humanize};

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&text).map_err(|e| CliError::InvalidConfig(e.message().to_owned()))?;
    cfg.validate()
        .map_err(|e| CliError::InvalidConfig(e.to_string()))?;
    Ok(cfg)
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    logging::init(&cli.log_level, cli.json, &cfg.logging)?;
    tracing::debug!(config = ?cli.config, "config loaded");

    match cli.cmd {
        Commands::Simulate {
            speed,
            rpm,
            pulse_us,
            seconds,
            park,
            trips,
            save,
        } => commands::simulate(
            &cfg,
            &SimulateArgs {
                speed,
                rpm,
                pulse_us,
                seconds,
                park,
                trips,
                save,
            },
            cli.json,
        ),
        Commands::Evaluate {
            quantity,
            trip,
            vss_pulses,
            vss_cycles,
            inj_pulses,
            inj_cycles,
            inj_open_cycles,
            tank_open_cycles,
        } => commands::evaluate(
            &cfg,
            &EvaluateArgs {
                quantity,
                trip,
                counters: Trip {
                    vss_pulses,
                    injector_pulses: inj_pulses,
                    vss_cycles,
                    injector_cycles: inj_cycles,
                    injector_open_cycles: inj_open_cycles,
                },
                tank_open_cycles,
            },
            cli.json,
        ),
        Commands::Programs { program } => commands::programs(&cfg, program.as_deref(), cli.json),
        Commands::Trips => commands::trips(&cfg, cli.json),
        Commands::Settings { set } => commands::settings(&cfg, &set, cli.json),
        Commands::SelfCheck => commands::self_check(&cfg, cli.json),
    }
}

fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    let _ = JSON_MODE.set(json);
    if !json {
        let _ = color_eyre::install();
    }

    if let Err(e) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}
