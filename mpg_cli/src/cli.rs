//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "mpg", version, about = "Fuel economy computer")]
pub struct Cli {
    /// Path to config TOML (reference vehicle when omitted)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print results and errors as JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the simulated vehicle through the interrupt layer and show the trips
    Simulate {
        /// Road speed in distance units per hour
        #[arg(long, default_value_t = 60.0)]
        speed: f64,
        /// Engine speed in revolutions per minute
        #[arg(long, default_value_t = 2000.0)]
        rpm: f64,
        /// Electrical injector pulse width in microseconds
        #[arg(long = "pulse-us", default_value_t = 3000.0)]
        pulse_us: f64,
        /// Simulated drive length
        #[arg(long, default_value_t = 10)]
        seconds: u32,
        /// Coast with the engine off for this many seconds afterwards
        #[arg(long, default_value_t = 0)]
        park: u32,
        /// Trips to report (instant, current, tank, idle-*); repeatable
        #[arg(long = "trip", value_name = "TRIP")]
        trips: Vec<String>,
        /// Save the tank trip to this slot when done
        #[arg(long, value_name = "SLOT")]
        save: Option<usize>,
    },
    /// Evaluate one quantity over hand-entered trip counters
    Evaluate {
        /// Quantity name (e.g. fuel-econ, speed, time-to-empty)
        #[arg(long)]
        quantity: String,
        /// Trip instance the counters are loaded into
        #[arg(long, default_value = "current")]
        trip: String,
        #[arg(long = "vss-pulses", default_value_t = 0)]
        vss_pulses: u32,
        #[arg(long = "vss-cycles", default_value_t = 0)]
        vss_cycles: u64,
        #[arg(long = "inj-pulses", default_value_t = 0)]
        inj_pulses: u32,
        #[arg(long = "inj-cycles", default_value_t = 0)]
        inj_cycles: u64,
        #[arg(long = "inj-open-cycles", default_value_t = 0)]
        inj_open_cycles: u64,
        /// Tank trip injector-open cycles (for remaining fuel and range)
        #[arg(long = "tank-open-cycles")]
        tank_open_cycles: Option<u64>,
    },
    /// List catalog programs, or disassemble one
    Programs {
        /// Program name to disassemble
        #[arg(long)]
        program: Option<String>,
    },
    /// List saved trip slots in the storage image
    Trips,
    /// Show every setting as the engine reads it
    Settings {
        /// Change a setting (NAME=VALUE, stored units) before listing; repeatable
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
    },
    /// Run every quantity against every trip in both unit systems and both backends
    SelfCheck,
}
