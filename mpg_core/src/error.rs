use thiserror::Error;

use crate::settings::Setting;
use crate::vm::Program;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("trip slot {slot} out of range (0..{max})")]
    SlotOutOfRange { slot: usize, max: usize },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SettingError {
    #[error("unknown setting index {0}")]
    UnknownIndex(u8),
    #[error("{setting} value {value} does not fit in {bits} bits")]
    OutOfRange {
        setting: Setting,
        value: u32,
        bits: u8,
    },
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing non-volatile storage")]
    MissingStorage,
    #[error("cycles_per_second must be > 0")]
    ZeroCycleRate,
    #[error("tick length must be a power of two >= 2, got {0}")]
    BadTickLength(u32),
}

/// Interpreter faults. None of these is reachable from the shipped catalog.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("call stack overflow entering {0}")]
    StackOverflow(Program),
    #[error("{program} ran past its last instruction")]
    RanOffEnd { program: Program },
    #[error("{program} skip at {pc} lands outside the program")]
    SkipOutOfRange { program: Program, pc: usize },
    #[error("no trip instance at index {0}")]
    UnknownTrip(u8),
    #[error("no setting at index {0}")]
    UnknownSetting(u8),
    #[error("no conversion slot at index {0}")]
    UnknownConversion(u8),
    #[error("no analog channel {0}")]
    UnknownChannel(u8),
    #[error("byte position {0} outside register")]
    BytePosition(u8),
    #[error("step budget of {0} instructions exhausted")]
    StepLimit(u32),
}

/// A fault plus whatever register 2 held when execution stopped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{fault} (partial result {partial:#x})")]
pub struct ExecError {
    pub fault: Fault,
    pub partial: u64,
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
