//! The program catalog: every derived quantity, the formatter helpers and the
//! settings-maintenance routines, written as engine bytecode.
//!
//! Subroutine register contracts:
//!
//! | program          | in                     | out                         | clobbers   |
//! |------------------|------------------------|-----------------------------|------------|
//! | `multiply`       | r2, r1                 | r2 = r2 * r1                | r4 r5      |
//! | `divide`         | r2, r1                 | r2 = r2 / r1, r1 = rem      | r4 r5      |
//! | `adjust`         | r2 quot, r1 rem, r3 d  | r2 rounded half-up          | r1         |
//! | `divide_round`   | r2, r1                 | r2 = round(r2 / r1)         | r1 r3 r4 r5|
//! | `mul_div_round`  | r2, r1, r3             | r2 = round(r2 * r1 / r3)    | r1 r3 r4 r5|
//! | `overflow`       |                        | r2 = sentinel               | r1         |
//!
//! Quantity programs take the trip instance as context index and leave a ×1000 fixed
//! point value (or a count / seconds, see [`DisplayKind`]) in r2.

use crate::arith::Arithmetic;
use crate::error::{ExecError, Fault};
use crate::settings::Setting;
use crate::trip::TripVar;
use crate::vm::{Const, Environment, Instr, Machine, Program, ProgramTable, Reg};

use Instr::{
    Add, Call, Div, Done, Isqrt, Jump, Ld, LdConst, LdDenom, LdImm, LdNumer, LdSetting,
    LdSettingIndexed, LdSettingIndirect, LdTankFuel, LdTripVar, LdVoltage, Mul, Shl, Shr, Skip,
    SkipIfIndexBelow, SkipIfLsb, SkipIfLte, SkipIfMetric, SkipIfMsb, SkipIfZero, StByte,
    StSetting, StSettingIndirect, Sub,
};
use Reg::{R1, R2, R3, R4, R5};

// ── Kernel subroutines ───────────────────────────────────────────────────────

const OVERFLOW: &[Instr] = &[LdImm(R2, 0), LdImm(R1, 1), Sub { x: R2, y: R1 }, Done];

const MULTIPLY_NATIVE: &[Instr] = &[Mul { x: R2, y: R1 }, Done];

const DIVIDE_NATIVE: &[Instr] = &[Div { x: R2, y: R1 }, Done];

/// Shift-and-add: r5 is the shifting multiplicand, r4 the draining multiplier.
const MULTIPLY_PRIMITIVE: &[Instr] = &[
    Ld { x: R4, y: R1 },
    Ld { x: R5, y: R2 },
    LdImm(R2, 0),
    SkipIfZero(R4, 6),
    SkipIfLsb(R4, 1),
    Skip(1),
    Add { x: R2, y: R5 },
    Shl(R5),
    Shr(R4),
    Skip(-7),
    Done,
];

/// Restoring long division: r4 is the normalized divisor, r5 the quotient bit marker.
const DIVIDE_PRIMITIVE: &[Instr] = &[
    SkipIfZero(R2, 7),
    SkipIfZero(R1, 1),
    Skip(7),
    // divide by zero: remainder keeps the dividend, quotient is the sentinel
    Ld { x: R1, y: R2 },
    LdImm(R2, 0),
    LdImm(R5, 1),
    Sub { x: R2, y: R5 },
    Done,
    // zero dividend
    Ld { x: R1, y: R2 },
    Done,
    Ld { x: R4, y: R1 },
    Ld { x: R1, y: R2 },
    LdImm(R5, 1),
    LdImm(R2, 0),
    SkipIfMsb(R4, 3),
    Shl(R4),
    Shl(R5),
    Skip(-4),
    SkipIfZero(R5, 7),
    SkipIfLte { x: R4, y: R1, skip: 1 },
    Skip(2),
    Sub { x: R1, y: R4 },
    Add { x: R2, y: R5 },
    Shr(R4),
    Shr(R5),
    Skip(-8),
    Done,
];

const ADJUST: &[Instr] = &[
    SkipIfZero(R3, 5),
    Shl(R1),
    SkipIfLte { x: R3, y: R1, skip: 1 },
    Done,
    LdImm(R1, 1),
    Add { x: R2, y: R1 },
    Done,
];

const DIVIDE_ROUND: &[Instr] = &[Ld { x: R3, y: R1 }, Call(Program::Divide), Jump(Program::Adjust)];

const MUL_DIV_ROUND: &[Instr] = &[Call(Program::Multiply), Ld { x: R1, y: R3 }, Jump(Program::DivideRound)];

/// Cycles in r2 to microseconds.
const TO_MICROS: &[Instr] = &[
    LdConst(R1, Const::MicrosPerSecond),
    LdConst(R3, Const::CyclesPerSecond),
    Jump(Program::MulDivRound),
];

// ── Formatting ───────────────────────────────────────────────────────────────

/// Half-up round-off of a ×1000 value at `min(index, magnitude decimals)`.
/// Index 4 and above means raw: no rounding, only the ceiling check.
const ROUND_OFF: &[Instr] = &[
    LdConst(R1, Const::RoundCeiling),
    SkipIfLte { x: R2, y: R1, skip: 1 },
    Jump(Program::Overflow),
    SkipIfIndexBelow { limit: 4, skip: 1 },
    Done,
    SkipIfIndexBelow { limit: 1, skip: 9 },
    LdConst(R1, Const::TenMillion),
    SkipIfLte { x: R1, y: R2, skip: 7 },
    SkipIfIndexBelow { limit: 2, skip: 8 },
    LdConst(R1, Const::Million),
    SkipIfLte { x: R1, y: R2, skip: 6 },
    SkipIfIndexBelow { limit: 3, skip: 7 },
    LdConst(R1, Const::HundredThousand),
    SkipIfLte { x: R1, y: R2, skip: 5 },
    Skip(6),
    LdConst(R1, Const::FiveHundred),
    Skip(3),
    LdImm(R1, 50),
    Skip(1),
    LdImm(R1, 5),
    Add { x: R2, y: R1 },
    LdConst(R1, Const::RoundCeiling),
    SkipIfLte { x: R2, y: R1, skip: 1 },
    Jump(Program::Overflow),
    Done,
];

/// Rounds, then peels five base-100 digit pairs into r3 bytes 4..0 (byte 0 most
/// significant). Leaves the sentinel in r2 on overflow.
const FORMAT_NUMBER: &[Instr] = &[
    Call(Program::RoundOff),
    LdConst(R1, Const::RoundCeiling),
    SkipIfLte { x: R2, y: R1, skip: 1 },
    Done,
    LdImm(R3, 0),
    LdImm(R1, 100),
    Call(Program::Divide),
    StByte { x: R1, y: R3, pos: 4 },
    LdImm(R1, 100),
    Call(Program::Divide),
    StByte { x: R1, y: R3, pos: 3 },
    LdImm(R1, 100),
    Call(Program::Divide),
    StByte { x: R1, y: R3, pos: 2 },
    LdImm(R1, 100),
    Call(Program::Divide),
    StByte { x: R1, y: R3, pos: 1 },
    LdImm(R1, 100),
    Call(Program::Divide),
    StByte { x: R1, y: R3, pos: 0 },
    Done,
];

/// Seconds in r2 to hours/minutes/seconds in r3 bytes 0/1/2; r2 is non-zero past 99 hours.
const FORMAT_TIME: &[Instr] = &[
    LdImm(R3, 0),
    LdImm(R1, 60),
    Call(Program::Divide),
    StByte { x: R1, y: R3, pos: 2 },
    LdImm(R1, 60),
    Call(Program::Divide),
    StByte { x: R1, y: R3, pos: 1 },
    LdImm(R1, 100),
    Call(Program::Divide),
    StByte { x: R1, y: R3, pos: 0 },
    Done,
];

// ── Quantities ───────────────────────────────────────────────────────────────

const FUEL_USED: &[Instr] = &[
    LdTripVar(R2, TripVar::InjectorOpenCycles),
    Call(Program::ToMicros),
    LdConst(R1, Const::DecimalPoint),
    LdSetting(R3, Setting::MicrosPerQuantity),
    Jump(Program::MulDivRound),
];

/// Fuel per hour: open/total duty times one hour of microseconds per quantity.
const FUEL_RATE: &[Instr] = &[
    LdTripVar(R3, TripVar::InjectorCycles),
    SkipIfZero(R3, 6),
    LdTripVar(R2, TripVar::InjectorOpenCycles),
    LdConst(R1, Const::HourMillis),
    Call(Program::MulDivRound),
    LdConst(R1, Const::MicrosPerSecond),
    LdSetting(R3, Setting::MicrosPerQuantity),
    Jump(Program::MulDivRound),
    LdImm(R2, 0),
    Done,
];

const ENGINE_RUN_TIME: &[Instr] = &[
    LdTripVar(R2, TripVar::InjectorCycles),
    LdConst(R1, Const::CyclesPerSecond),
    Jump(Program::Divide),
];

/// Remaining fuel over the trip's burn rate, in seconds.
const TIME_TO_EMPTY: &[Instr] = &[
    LdTripVar(R3, TripVar::InjectorOpenCycles),
    SkipIfZero(R3, 9),
    Call(Program::RemainingFuel),
    LdTripVar(R1, TripVar::InjectorCycles),
    LdTripVar(R3, TripVar::InjectorOpenCycles),
    Call(Program::MulDivRound),
    LdSetting(R1, Setting::MicrosPerQuantity),
    LdConst(R3, Const::MicrosPerSecond),
    Call(Program::MulDivRound),
    LdConst(R1, Const::DecimalPoint),
    Jump(Program::DivideRound),
    Jump(Program::Overflow),
];

const DISTANCE: &[Instr] = &[
    LdTripVar(R2, TripVar::VssPulses),
    LdConst(R1, Const::DecimalPoint),
    LdSetting(R3, Setting::PulsesPerDistance),
    Jump(Program::MulDivRound),
];

const SPEED: &[Instr] = &[
    LdSetting(R3, Setting::PulsesPerDistance),
    SkipIfZero(R3, 9),
    LdTripVar(R3, TripVar::VssCycles),
    SkipIfZero(R3, 8),
    LdTripVar(R2, TripVar::VssPulses),
    LdConst(R1, Const::HourMillis),
    LdSetting(R3, Setting::PulsesPerDistance),
    Call(Program::MulDivRound),
    LdConst(R1, Const::CyclesPerSecond),
    LdTripVar(R3, TripVar::VssCycles),
    Jump(Program::MulDivRound),
    Jump(Program::Overflow),
    // stationary
    LdImm(R2, 0),
    Done,
];

const MOTION_TIME: &[Instr] = &[
    LdTripVar(R2, TripVar::VssCycles),
    LdConst(R1, Const::CyclesPerSecond),
    Jump(Program::Divide),
];

/// Imperial: distance per quantity. Metric: quantity per 100 distance units.
const FUEL_ECON: &[Instr] = &[
    SkipIfMetric(13),
    LdSetting(R3, Setting::PulsesPerDistance),
    SkipIfZero(R3, 23),
    LdTripVar(R3, TripVar::InjectorOpenCycles),
    SkipIfZero(R3, 21),
    LdTripVar(R2, TripVar::VssPulses),
    LdSetting(R1, Setting::MicrosPerQuantity),
    LdSetting(R3, Setting::PulsesPerDistance),
    Call(Program::MulDivRound),
    LdConst(R1, Const::CyclesPerSecond),
    LdTripVar(R3, TripVar::InjectorOpenCycles),
    Call(Program::MulDivRound),
    LdConst(R1, Const::DecimalPoint),
    Jump(Program::DivideRound),
    // metric
    LdTripVar(R3, TripVar::VssPulses),
    SkipIfZero(R3, 10),
    LdSetting(R3, Setting::MicrosPerQuantity),
    SkipIfZero(R3, 8),
    LdTripVar(R2, TripVar::InjectorOpenCycles),
    Call(Program::ToMicros),
    LdSetting(R1, Setting::PulsesPerDistance),
    LdTripVar(R3, TripVar::VssPulses),
    Call(Program::MulDivRound),
    LdConst(R1, Const::HundredThousand),
    LdSetting(R3, Setting::MicrosPerQuantity),
    Jump(Program::MulDivRound),
    Jump(Program::Overflow),
];

/// Tank size less the tank trip's burn, floored at zero.
const REMAINING_FUEL: &[Instr] = &[
    LdTankFuel(R2),
    Call(Program::ToMicros),
    LdConst(R1, Const::DecimalPoint),
    LdSetting(R3, Setting::MicrosPerQuantity),
    Call(Program::MulDivRound),
    LdSetting(R1, Setting::TankSize),
    SkipIfLte { x: R2, y: R1, skip: 2 },
    LdImm(R2, 0),
    Done,
    Sub { x: R1, y: R2 },
    Ld { x: R2, y: R1 },
    Done,
];

const DISTANCE_TO_EMPTY: &[Instr] = &[
    LdSetting(R3, Setting::PulsesPerDistance),
    SkipIfZero(R3, 12),
    LdTripVar(R3, TripVar::InjectorOpenCycles),
    SkipIfZero(R3, 10),
    Call(Program::RemainingFuel),
    LdTripVar(R1, TripVar::VssPulses),
    LdSetting(R3, Setting::PulsesPerDistance),
    Call(Program::MulDivRound),
    LdSetting(R1, Setting::MicrosPerQuantity),
    LdTripVar(R3, TripVar::InjectorOpenCycles),
    Call(Program::MulDivRound),
    LdConst(R1, Const::CyclesPerSecond),
    LdConst(R3, Const::MicrosPerSecond),
    Jump(Program::MulDivRound),
    Jump(Program::Overflow),
];

const ENGINE_SPEED: &[Instr] = &[
    LdTripVar(R3, TripVar::InjectorCycles),
    SkipIfZero(R3, 8),
    LdTripVar(R2, TripVar::InjectorPulses),
    LdConst(R1, Const::MinuteMillis),
    Call(Program::Multiply),
    LdSetting(R1, Setting::CrankRevs),
    Call(Program::Multiply),
    LdConst(R1, Const::CyclesPerSecond),
    LdTripVar(R3, TripVar::InjectorCycles),
    Jump(Program::MulDivRound),
    LdImm(R2, 0),
    Done,
];

const INJECTOR_OPEN_TIME: &[Instr] = &[LdTripVar(R2, TripVar::InjectorOpenCycles), Jump(Program::ToMicros)];
const INJECTOR_TOTAL_TIME: &[Instr] = &[LdTripVar(R2, TripVar::InjectorCycles), Jump(Program::ToMicros)];
const VSS_TOTAL_TIME: &[Instr] = &[LdTripVar(R2, TripVar::VssCycles), Jump(Program::ToMicros)];
const INJECTOR_PULSES: &[Instr] = &[LdTripVar(R2, TripVar::InjectorPulses), Done];
const VSS_PULSES: &[Instr] = &[LdTripVar(R2, TripVar::VssPulses), Done];

const FUEL_COST: &[Instr] = &[
    LdSetting(R3, Setting::MicrosPerQuantity),
    SkipIfZero(R3, 4),
    Call(Program::FuelUsed),
    LdSetting(R1, Setting::FuelCost),
    LdConst(R3, Const::DecimalPoint),
    Jump(Program::MulDivRound),
    Jump(Program::Overflow),
];

const FUEL_RATE_COST: &[Instr] = &[
    LdSetting(R3, Setting::MicrosPerQuantity),
    SkipIfZero(R3, 4),
    Call(Program::FuelRate),
    LdSetting(R1, Setting::FuelCost),
    LdConst(R3, Const::DecimalPoint),
    Jump(Program::MulDivRound),
    Jump(Program::Overflow),
];

const FUEL_COST_PER_DISTANCE: &[Instr] = &[
    LdTripVar(R3, TripVar::VssPulses),
    SkipIfZero(R3, 6),
    LdSetting(R3, Setting::MicrosPerQuantity),
    SkipIfZero(R3, 4),
    Call(Program::FuelCost),
    LdSetting(R1, Setting::PulsesPerDistance),
    LdTripVar(R3, TripVar::VssPulses),
    Jump(Program::MulDivRound),
    Jump(Program::Overflow),
];

const DISTANCE_PER_FUEL_COST: &[Instr] = &[
    LdSetting(R3, Setting::PulsesPerDistance),
    SkipIfZero(R3, 11),
    LdTripVar(R3, TripVar::InjectorOpenCycles),
    SkipIfZero(R3, 9),
    LdTripVar(R2, TripVar::VssPulses),
    LdSetting(R1, Setting::MicrosPerQuantity),
    LdSetting(R3, Setting::PulsesPerDistance),
    Call(Program::MulDivRound),
    LdConst(R1, Const::CyclesPerSecond),
    LdTripVar(R3, TripVar::InjectorOpenCycles),
    Call(Program::MulDivRound),
    LdSetting(R1, Setting::FuelCost),
    Jump(Program::DivideRound),
    Jump(Program::Overflow),
];

const REMAINING_FUEL_COST: &[Instr] = &[
    LdSetting(R3, Setting::MicrosPerQuantity),
    SkipIfZero(R3, 4),
    Call(Program::RemainingFuel),
    LdSetting(R1, Setting::FuelCost),
    LdConst(R3, Const::DecimalPoint),
    Jump(Program::MulDivRound),
    Jump(Program::Overflow),
];

/// ADC counts to millivolts.
const VOLTAGE_0: &[Instr] = &[
    LdVoltage(R2, 0),
    LdConst(R1, Const::AdcReferenceMv),
    LdConst(R3, Const::AdcFullScale),
    Jump(Program::MulDivRound),
];

const VOLTAGE_1: &[Instr] = &[
    LdVoltage(R2, 1),
    LdConst(R1, Const::AdcReferenceMv),
    LdConst(R3, Const::AdcFullScale),
    Jump(Program::MulDivRound),
];

// ── Maintenance ──────────────────────────────────────────────────────────────

/// FE-vs-speed bucket for the trip's speed, or 255 when outside the bar graph.
const SPEED_BUCKET: &[Instr] = &[
    Call(Program::Speed),
    LdSetting(R1, Setting::BarLowSpeed),
    SkipIfLte { x: R1, y: R2, skip: 2 },
    LdImm(R2, 255),
    Done,
    Sub { x: R2, y: R1 },
    LdSetting(R1, Setting::BarSpeedQuantum),
    Call(Program::Divide),
    LdImm(R1, 14),
    SkipIfLte { x: R2, y: R1, skip: 1 },
    LdImm(R2, 255),
    Done,
];

/// Rescale conversion slot `index` leaving the current unit system.
const CONVERT_SETTING: &[Instr] = &[
    LdSettingIndirect(R2),
    SkipIfMetric(4),
    LdNumer(R1),
    LdDenom(R3),
    Call(Program::MulDivRound),
    Skip(3),
    LdDenom(R1),
    LdNumer(R3),
    Call(Program::MulDivRound),
    StSettingIndirect(R2),
    Done,
];

/// Microseconds per quantity from injector count, size and the Q4.12 square root of
/// the pressure ratio.
const FUEL_FACTOR: &[Instr] = &[
    LdSetting(R3, Setting::RefFuelPressure),
    SkipIfZero(R3, 18),
    LdSetting(R2, Setting::SysFuelPressure),
    LdConst(R1, Const::Q12One),
    Call(Program::MulDivRound),
    Isqrt(R2),
    LdSetting(R1, Setting::InjectorCount),
    Call(Program::Multiply),
    LdSetting(R1, Setting::InjectorSize),
    Call(Program::Multiply),
    SkipIfMetric(3),
    LdConst(R1, Const::VolumeNumer),
    LdConst(R3, Const::VolumeDenom),
    Call(Program::MulDivRound),
    SkipIfZero(R2, 5),
    Ld { x: R1, y: R2 },
    LdConst(R2, Const::FuelFactorNumer),
    Call(Program::DivideRound),
    StSetting(R2, Setting::MicrosPerQuantity),
    Done,
    Jump(Program::Overflow),
];

const SETTLE_CYCLES: &[Instr] = &[
    LdSetting(R2, Setting::InjectorSettle),
    LdConst(R1, Const::CyclesPerSecond),
    LdConst(R3, Const::MicrosPerSecond),
    Jump(Program::MulDivRound),
];

/// Engine cycle length at the minimum good RPM.
const MIN_GOOD_RPM_CYCLES: &[Instr] = &[
    LdSetting(R3, Setting::MinGoodRpm),
    SkipIfZero(R3, 5),
    LdSetting(R2, Setting::CrankRevs),
    LdImm(R1, 60),
    Call(Program::Multiply),
    LdConst(R1, Const::CyclesPerSecond),
    Jump(Program::MulDivRound),
    Jump(Program::Overflow),
];

const INJECTOR_CEILING_CYCLES: &[Instr] = &[
    LdSetting(R3, Setting::MinGoodRpm),
    SkipIfZero(R3, 4),
    Call(Program::MinGoodRpmCycles),
    LdSetting(R1, Setting::InjectorDutyCeiling),
    LdConst(R3, Const::DutyScale),
    Jump(Program::MulDivRound),
    Jump(Program::Overflow),
];

const SLEEP_TICKS: &[Instr] = &[
    LdSetting(R2, Setting::ActivityTimeout),
    LdConst(R1, Const::CyclesPerSecond),
    LdConst(R3, Const::TickCycles),
    Jump(Program::MulDivRound),
];

const VSS_PAUSE_TICKS: &[Instr] = &[
    LdSetting(R2, Setting::VssPause),
    LdConst(R1, Const::CyclesPerSecond),
    LdConst(R3, Const::DecimalPoint),
    Call(Program::MulDivRound),
    LdConst(R1, Const::TickCycles),
    Jump(Program::DivideRound),
];

const READ_SETTING: &[Instr] = &[LdSettingIndexed(R2, 0), Done];

// ── Catalog ──────────────────────────────────────────────────────────────────

/// The shipped program table, parameterized by the multiply/divide backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Catalog {
    arithmetic: Arithmetic,
}

impl Catalog {
    #[must_use]
    pub fn new(arithmetic: Arithmetic) -> Self {
        let catalog = Self { arithmetic };
        debug_assert!(catalog.validate().is_ok(), "catalog failed validation");
        catalog
    }

    #[must_use]
    pub const fn arithmetic(&self) -> Arithmetic {
        self.arithmetic
    }

    /// Static checks: every skip lands inside its program and no program can fall
    /// off its end.
    pub fn validate(&self) -> Result<(), Fault> {
        for &program in Program::ALL {
            let code = self.program(program);
            match code.last() {
                Some(last) if last.is_terminal() => {}
                _ => return Err(Fault::RanOffEnd { program }),
            }
            for (pc, ins) in code.iter().enumerate() {
                let Some(d) = ins.skip() else { continue };
                let in_range = (pc + 1)
                    .checked_add_signed(isize::from(d))
                    .is_some_and(|t| t < code.len());
                if !in_range {
                    return Err(Fault::SkipOutOfRange { program, pc });
                }
            }
        }
        Ok(())
    }
}

impl ProgramTable for Catalog {
    fn program(&self, id: Program) -> &[Instr] {
        match id {
            Program::Overflow => OVERFLOW,
            Program::Multiply => match self.arithmetic {
                Arithmetic::Native => MULTIPLY_NATIVE,
                Arithmetic::Primitive => MULTIPLY_PRIMITIVE,
            },
            Program::Divide => match self.arithmetic {
                Arithmetic::Native => DIVIDE_NATIVE,
                Arithmetic::Primitive => DIVIDE_PRIMITIVE,
            },
            Program::Adjust => ADJUST,
            Program::DivideRound => DIVIDE_ROUND,
            Program::MulDivRound => MUL_DIV_ROUND,
            Program::ToMicros => TO_MICROS,
            Program::RemainingFuel => REMAINING_FUEL,
            Program::RoundOff => ROUND_OFF,
            Program::FormatNumber => FORMAT_NUMBER,
            Program::FormatTime => FORMAT_TIME,
            Program::FuelUsed => FUEL_USED,
            Program::FuelRate => FUEL_RATE,
            Program::EngineRunTime => ENGINE_RUN_TIME,
            Program::TimeToEmpty => TIME_TO_EMPTY,
            Program::Distance => DISTANCE,
            Program::Speed => SPEED,
            Program::MotionTime => MOTION_TIME,
            Program::FuelEcon => FUEL_ECON,
            Program::DistanceToEmpty => DISTANCE_TO_EMPTY,
            Program::EngineSpeed => ENGINE_SPEED,
            Program::InjectorOpenTime => INJECTOR_OPEN_TIME,
            Program::InjectorTotalTime => INJECTOR_TOTAL_TIME,
            Program::VssTotalTime => VSS_TOTAL_TIME,
            Program::InjectorPulses => INJECTOR_PULSES,
            Program::VssPulses => VSS_PULSES,
            Program::FuelCost => FUEL_COST,
            Program::FuelRateCost => FUEL_RATE_COST,
            Program::FuelCostPerDistance => FUEL_COST_PER_DISTANCE,
            Program::DistancePerFuelCost => DISTANCE_PER_FUEL_COST,
            Program::RemainingFuelCost => REMAINING_FUEL_COST,
            Program::Voltage0 => VOLTAGE_0,
            Program::Voltage1 => VOLTAGE_1,
            Program::SpeedBucket => SPEED_BUCKET,
            Program::ConvertSetting => CONVERT_SETTING,
            Program::FuelFactor => FUEL_FACTOR,
            Program::SettleCycles => SETTLE_CYCLES,
            Program::MinGoodRpmCycles => MIN_GOOD_RPM_CYCLES,
            Program::InjectorCeilingCycles => INJECTOR_CEILING_CYCLES,
            Program::SleepTicks => SLEEP_TICKS,
            Program::VssPauseTicks => VSS_PAUSE_TICKS,
            Program::ReadSetting => READ_SETTING,
        }
    }
}

// ── Quantities ───────────────────────────────────────────────────────────────

/// How a quantity's raw result is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayKind {
    /// ×1000 fixed point, six characters.
    Number,
    /// Plain integer.
    Count,
    /// Seconds, shown as `hh:mm:ss`.
    Time,
}

macro_rules! quantity_table {
    ($( $variant:ident => $name:literal, $program:ident, $decimals:literal, $kind:ident; )*) => {
        /// A derived quantity the display can show for any trip instance.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Quantity {
            $( $variant, )*
        }

        impl Quantity {
            pub const ALL: &'static [Self] = &[ $( Self::$variant, )* ];

            #[must_use]
            pub const fn name(self) -> &'static str {
                match self { $( Self::$variant => $name, )* }
            }

            #[must_use]
            pub const fn program(self) -> Program {
                match self { $( Self::$variant => Program::$program, )* }
            }

            /// Decimal places shown; a property of the quantity, not the value.
            #[must_use]
            pub const fn decimals(self) -> u8 {
                match self { $( Self::$variant => $decimals, )* }
            }

            #[must_use]
            pub const fn display(self) -> DisplayKind {
                match self { $( Self::$variant => DisplayKind::$kind, )* }
            }
        }
    };
}

quantity_table! {
    FuelUsed => "fuel-used", FuelUsed, 2, Number;
    FuelRate => "fuel-rate", FuelRate, 2, Number;
    EngineRunTime => "engine-run-time", EngineRunTime, 0, Time;
    TimeToEmpty => "time-to-empty", TimeToEmpty, 0, Time;
    Distance => "distance", Distance, 1, Number;
    Speed => "speed", Speed, 1, Number;
    MotionTime => "motion-time", MotionTime, 0, Time;
    FuelEcon => "fuel-econ", FuelEcon, 2, Number;
    RemainingFuel => "remaining-fuel", RemainingFuel, 2, Number;
    DistanceToEmpty => "distance-to-empty", DistanceToEmpty, 1, Number;
    EngineSpeed => "engine-speed", EngineSpeed, 0, Number;
    InjectorOpenTime => "injector-open-us", InjectorOpenTime, 0, Count;
    InjectorTotalTime => "injector-total-us", InjectorTotalTime, 0, Count;
    VssTotalTime => "vss-total-us", VssTotalTime, 0, Count;
    InjectorPulses => "injector-pulses", InjectorPulses, 0, Count;
    VssPulses => "vss-pulses", VssPulses, 0, Count;
    FuelCost => "fuel-cost", FuelCost, 2, Number;
    FuelRateCost => "fuel-rate-cost", FuelRateCost, 2, Number;
    FuelCostPerDistance => "fuel-cost-per-distance", FuelCostPerDistance, 2, Number;
    DistancePerFuelCost => "distance-per-fuel-cost", DistancePerFuelCost, 1, Number;
    RemainingFuelCost => "remaining-fuel-cost", RemainingFuelCost, 2, Number;
    Voltage0 => "voltage-0", Voltage0, 3, Number;
    Voltage1 => "voltage-1", Voltage1, 3, Number;
}

impl Quantity {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|q| q.name() == name)
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Checked view of a raw engine result: the top half of the range is the overflow
/// sentinel (including the all-ones value a zero divide leaves behind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fixed {
    Value(u64),
    Overflow,
}

impl Fixed {
    pub const SENTINEL_FLOOR: u64 = 1 << 63;

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        if raw >= Self::SENTINEL_FLOOR {
            Self::Overflow
        } else {
            Self::Value(raw)
        }
    }

    #[must_use]
    pub const fn value(self) -> Option<u64> {
        match self {
            Self::Value(v) => Some(v),
            Self::Overflow => None,
        }
    }

    #[must_use]
    pub const fn is_overflow(self) -> bool {
        matches!(self, Self::Overflow)
    }
}

/// Result of evaluating a quantity against one trip instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub quantity: Quantity,
    pub raw: u64,
    pub value: Fixed,
}

impl Evaluation {
    #[must_use]
    pub const fn decimals(&self) -> u8 {
        self.quantity.decimals()
    }

    #[must_use]
    pub const fn display(&self) -> DisplayKind {
        self.quantity.display()
    }
}

/// Machine plus catalog: the unit that evaluates quantities and helper programs.
#[derive(Debug, Default)]
pub struct Calculator {
    machine: Machine,
    catalog: Catalog,
}

impl Calculator {
    #[must_use]
    pub fn new(arithmetic: Arithmetic) -> Self {
        Self {
            machine: Machine::new(),
            catalog: Catalog::new(arithmetic),
        }
    }

    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub const fn arithmetic(&self) -> Arithmetic {
        self.catalog.arithmetic()
    }

    /// Register contents after the last run.
    #[must_use]
    pub const fn register(&self, r: Reg) -> u64 {
        self.machine.reg(r)
    }

    /// Run `program` with `input` in r2.
    pub fn call<E>(&mut self, env: &mut E, program: Program, index: u8, input: u64) -> Result<u64, ExecError>
    where
        E: Environment + ?Sized,
    {
        self.machine.set_reg(R2, input);
        self.machine.run(&self.catalog, env, program, index)
    }

    pub fn run<E>(&mut self, env: &mut E, program: Program, index: u8) -> Result<u64, ExecError>
    where
        E: Environment + ?Sized,
    {
        self.call(env, program, index, 0)
    }

    pub fn evaluate<E>(&mut self, env: &mut E, quantity: Quantity, trip: u8) -> Result<Evaluation, ExecError>
    where
        E: Environment + ?Sized,
    {
        let raw = self.run(env, quantity.program(), trip)?;
        tracing::trace!(%quantity, trip, raw, "evaluated");
        Ok(Evaluation {
            quantity,
            raw,
            value: Fixed::from_raw(raw),
        })
    }
}
