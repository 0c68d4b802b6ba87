#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Fuel-consumption and trip computer core (hardware-agnostic).
//!
//! Interrupt handlers timestamp road-speed and injector edges against a 32-bit cycle
//! clock and credit raw accumulators; the main loop folds those into trip instances
//! every half second and evaluates display quantities with a small bytecode engine.
//! Hardware is reached only through `mpg_traits`.
//!
//! ## Architecture
//!
//! - **Clock**: native counter extended to 32 bits (`clock`)
//! - **Capture**: edge handlers, rationality filters, tick scheduler (`capture`, `isr`)
//! - **Accumulators**: trip records and the trip instance store (`trip`, `trips`)
//! - **Settings**: bit-width-checked table with unit conversion slots (`settings`)
//! - **Kernel**: 64-bit add/compare/shift primitives, restoring multiply and divide (`arith`)
//! - **Engine**: register machine, instruction set and wire codec (`vm`)
//! - **Catalog**: every shipped program and the quantities built on them (`catalog`)
//! - **Formatting**: six-character numbers, `hh:mm:ss`, raw views (`format`)
//! - **Orchestration**: main-loop cycle, settings edits, persistence (`computer`, `persist`)
//!
//! ## Fixed-Point Values
//!
//! Quantities are `u64` scaled by 1000. `u64::MAX` (and anything at or above `2^63`)
//! is the overflow sentinel; see [`catalog::Fixed`].

pub mod arith;
pub mod capture;
pub mod catalog;
pub mod clock;
pub mod computer;
pub mod conversions;
pub mod error;
pub mod format;
pub mod isr;
pub mod persist;
pub mod settings;
pub mod trip;
pub mod trips;
pub mod util;
pub mod vm;

pub use arith::Arithmetic;
pub use catalog::{Calculator, Evaluation, Fixed, Quantity};
pub use computer::{CycleReport, FuelComputer, FuelComputerBuilder};
pub use error::{EngineError, Report, Result};
pub use settings::{Setting, Settings};
pub use trip::Trip;
pub use trips::{TripId, TripStore};
