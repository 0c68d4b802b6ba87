//! Tagged instruction set of the calculation engine.

use crate::settings::Setting;
use crate::trip::TripVar;

/// One of the five interpreter-visible 64-bit registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg {
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
}

impl Reg {
    pub const ALL: [Self; 5] = [Self::R1, Self::R2, Self::R3, Self::R4, Self::R5];

    /// Slot in the register file.
    #[inline]
    #[must_use]
    pub const fn slot(self) -> usize {
        self as usize - 1
    }

    /// 1-based register number, as used by the packed selector nibbles.
    #[must_use]
    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }
}

impl core::fmt::Display for Reg {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "r{}", *self as u8)
    }
}

macro_rules! indexed_enum {
    ($(#[$meta:meta])* $vis:vis enum $ty:ident { $( $variant:ident = $idx:literal => $name:literal, )* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        $vis enum $ty {
            $( $variant = $idx, )*
        }

        impl $ty {
            pub const ALL: &'static [Self] = &[ $( Self::$variant, )* ];

            #[must_use]
            pub const fn name(self) -> &'static str {
                match self { $( Self::$variant => $name, )* }
            }
        }

        impl TryFrom<u8> for $ty {
            type Error = u8;

            fn try_from(v: u8) -> Result<Self, Self::Error> {
                Self::ALL.get(usize::from(v)).copied().ok_or(v)
            }
        }

        impl core::fmt::Display for $ty {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

indexed_enum! {
    /// Entries of the engine's constant table.
    pub enum Const {
        DecimalPoint = 0 => "decimal_point",
        MicrosPerSecond = 1 => "micros_per_second",
        CyclesPerSecond = 2 => "cycles_per_second",
        TickCycles = 3 => "tick_cycles",
        HourMillis = 4 => "hour_millis",
        MinuteMillis = 5 => "minute_millis",
        RoundCeiling = 6 => "round_ceiling",
        TenMillion = 7 => "ten_million",
        Million = 8 => "million",
        HundredThousand = 9 => "hundred_thousand",
        FiveHundred = 10 => "five_hundred",
        Q12One = 11 => "q12_one",
        FuelFactorNumer = 12 => "fuel_factor_numer",
        VolumeNumer = 13 => "volume_numer",
        VolumeDenom = 14 => "volume_denom",
        DutyScale = 15 => "duty_scale",
        AdcReferenceMv = 16 => "adc_reference_mv",
        AdcFullScale = 17 => "adc_full_scale",
    }
}

impl Const {
    /// Resolve against the running clock configuration.
    #[must_use]
    pub const fn value(self, cycles_per_second: u32, tick_cycles: u32) -> u64 {
        match self {
            Self::DecimalPoint => 1_000,
            Self::MicrosPerSecond | Self::Million => 1_000_000,
            Self::CyclesPerSecond => cycles_per_second as u64,
            Self::TickCycles => tick_cycles as u64,
            Self::HourMillis => 3_600_000,
            Self::MinuteMillis => 60_000,
            Self::RoundCeiling => 0xFFFF_FFFE,
            Self::TenMillion => 10_000_000,
            Self::HundredThousand => 100_000,
            Self::FiveHundred => 500,
            Self::Q12One => 4_096,
            // microseconds per minute * decimal point * Q12 one
            Self::FuelFactorNumer => 60 * 1_000_000 * 1_000 * 4_096,
            Self::VolumeNumer => 1_000_000_000,
            Self::VolumeDenom => 3_785_411_784,
            Self::DutyScale => 1_024,
            Self::AdcReferenceMv => crate::util::ADC_REFERENCE_MV as u64,
            Self::AdcFullScale => crate::util::ADC_FULL_SCALE as u64,
        }
    }
}

indexed_enum! {
    /// Catalog program identifiers. The discriminant is the call operand.
    pub enum Program {
        Overflow = 0 => "overflow",
        Multiply = 1 => "multiply",
        Divide = 2 => "divide",
        Adjust = 3 => "adjust",
        DivideRound = 4 => "divide_round",
        MulDivRound = 5 => "mul_div_round",
        ToMicros = 6 => "to_micros",
        RemainingFuel = 7 => "remaining_fuel",
        RoundOff = 8 => "round_off",
        FormatNumber = 9 => "format_number",
        FormatTime = 10 => "format_time",
        FuelUsed = 11 => "fuel_used",
        FuelRate = 12 => "fuel_rate",
        EngineRunTime = 13 => "engine_run_time",
        TimeToEmpty = 14 => "time_to_empty",
        Distance = 15 => "distance",
        Speed = 16 => "speed",
        MotionTime = 17 => "motion_time",
        FuelEcon = 18 => "fuel_econ",
        DistanceToEmpty = 19 => "distance_to_empty",
        EngineSpeed = 20 => "engine_speed",
        InjectorOpenTime = 21 => "injector_open_time",
        InjectorTotalTime = 22 => "injector_total_time",
        VssTotalTime = 23 => "vss_total_time",
        InjectorPulses = 24 => "injector_pulses",
        VssPulses = 25 => "vss_pulses",
        FuelCost = 26 => "fuel_cost",
        FuelRateCost = 27 => "fuel_rate_cost",
        FuelCostPerDistance = 28 => "fuel_cost_per_distance",
        DistancePerFuelCost = 29 => "distance_per_fuel_cost",
        RemainingFuelCost = 30 => "remaining_fuel_cost",
        Voltage0 = 31 => "voltage_0",
        Voltage1 = 32 => "voltage_1",
        SpeedBucket = 33 => "speed_bucket",
        ConvertSetting = 34 => "convert_setting",
        FuelFactor = 35 => "fuel_factor",
        SettleCycles = 36 => "settle_cycles",
        MinGoodRpmCycles = 37 => "min_good_rpm_cycles",
        InjectorCeilingCycles = 38 => "injector_ceiling_cycles",
        SleepTicks = 39 => "sleep_ticks",
        VssPauseTicks = 40 => "vss_pause_ticks",
        ReadSetting = 41 => "read_setting",
    }
}

/// A decoded instruction. Skip distances count instructions, relative to the
/// instruction after the skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    // control flow
    Done,
    Skip(i8),
    SkipIfZero(Reg, i8),
    /// Skip when `x <= y`.
    SkipIfLte { x: Reg, y: Reg, skip: i8 },
    SkipIfLsb(Reg, i8),
    SkipIfMsb(Reg, i8),
    SkipIfMetric(i8),
    /// Skip when the context index is below `limit`.
    SkipIfIndexBelow { limit: u8, skip: i8 },
    Call(Program),
    Jump(Program),
    TraceOn,
    TraceOff,

    // data movement
    LdImm(Reg, u8),
    LdConst(Reg, Const),
    LdSetting(Reg, Setting),
    /// Setting at `base + index`.
    LdSettingIndexed(Reg, u8),
    /// Setting named by conversion slot `index`.
    LdSettingIndirect(Reg),
    StSetting(Reg, Setting),
    StSettingIndirect(Reg),
    /// Conversion numerator for slot `index`.
    LdNumer(Reg),
    LdDenom(Reg),
    LdTripVar(Reg, TripVar),
    /// Injector open cycles of the tank trip, regardless of context.
    LdTankFuel(Reg),
    LdVoltage(Reg, u8),
    /// `x = y`
    Ld { x: Reg, y: Reg },
    /// `x = y.byte[pos]`
    LdByte { x: Reg, y: Reg, pos: u8 },
    /// `y.byte[pos] = x.byte[0]`
    StByte { x: Reg, y: Reg, pos: u8 },
    Swap { x: Reg, y: Reg },

    // arithmetic
    /// `x += y`
    Add { x: Reg, y: Reg },
    /// `x -= y`
    Sub { x: Reg, y: Reg },
    /// `x *= y`
    Mul { x: Reg, y: Reg },
    /// `x /= y`, remainder into `y`
    Div { x: Reg, y: Reg },
    Shl(Reg),
    Shr(Reg),
    Isqrt(Reg),
}

impl Instr {
    /// Skip distance, if this is a (conditional) skip.
    #[must_use]
    pub const fn skip(self) -> Option<i8> {
        match self {
            Self::Skip(d)
            | Self::SkipIfZero(_, d)
            | Self::SkipIfLte { skip: d, .. }
            | Self::SkipIfLsb(_, d)
            | Self::SkipIfMsb(_, d)
            | Self::SkipIfMetric(d)
            | Self::SkipIfIndexBelow { skip: d, .. } => Some(d),
            _ => None,
        }
    }

    /// Same instruction with a different skip distance.
    #[must_use]
    pub const fn with_skip(self, d: i8) -> Self {
        match self {
            Self::Skip(_) => Self::Skip(d),
            Self::SkipIfZero(r, _) => Self::SkipIfZero(r, d),
            Self::SkipIfLte { x, y, .. } => Self::SkipIfLte { x, y, skip: d },
            Self::SkipIfLsb(r, _) => Self::SkipIfLsb(r, d),
            Self::SkipIfMsb(r, _) => Self::SkipIfMsb(r, d),
            Self::SkipIfMetric(_) => Self::SkipIfMetric(d),
            Self::SkipIfIndexBelow { limit, .. } => Self::SkipIfIndexBelow { limit, skip: d },
            other => other,
        }
    }

    /// Whether control never falls through to the next instruction.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Jump(_) | Self::Skip(_))
    }
}

impl core::fmt::Display for Instr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            Self::Done => f.write_str("done"),
            Self::Skip(d) => write!(f, "skip {d:+}"),
            Self::SkipIfZero(r, d) => write!(f, "skipz {r}, {d:+}"),
            Self::SkipIfLte { x, y, skip } => write!(f, "skiple {x}, {y}, {skip:+}"),
            Self::SkipIfLsb(r, d) => write!(f, "skiplsb {r}, {d:+}"),
            Self::SkipIfMsb(r, d) => write!(f, "skipmsb {r}, {d:+}"),
            Self::SkipIfMetric(d) => write!(f, "skipmetric {d:+}"),
            Self::SkipIfIndexBelow { limit, skip } => write!(f, "skipidx< {limit}, {skip:+}"),
            Self::Call(p) => write!(f, "call {p}"),
            Self::Jump(p) => write!(f, "jump {p}"),
            Self::TraceOn => f.write_str("traceon"),
            Self::TraceOff => f.write_str("traceoff"),
            Self::LdImm(r, v) => write!(f, "ldi {r}, {v}"),
            Self::LdConst(r, c) => write!(f, "ldc {r}, {c}"),
            Self::LdSetting(r, s) => write!(f, "lds {r}, {s}"),
            Self::LdSettingIndexed(r, b) => write!(f, "lds {r}, [{b}+idx]"),
            Self::LdSettingIndirect(r) => write!(f, "lds {r}, [conv idx]"),
            Self::StSetting(r, s) => write!(f, "sts {s}, {r}"),
            Self::StSettingIndirect(r) => write!(f, "sts [conv idx], {r}"),
            Self::LdNumer(r) => write!(f, "ldnumer {r}"),
            Self::LdDenom(r) => write!(f, "lddenom {r}"),
            Self::LdTripVar(r, v) => write!(f, "ldtrip {r}, {v}"),
            Self::LdTankFuel(r) => write!(f, "ldtank {r}"),
            Self::LdVoltage(r, ch) => write!(f, "ldvolt {r}, {ch}"),
            Self::Ld { x, y } => write!(f, "ld {x}, {y}"),
            Self::LdByte { x, y, pos } => write!(f, "ldb {x}, {y}[{pos}]"),
            Self::StByte { x, y, pos } => write!(f, "stb {y}[{pos}], {x}"),
            Self::Swap { x, y } => write!(f, "swap {x}, {y}"),
            Self::Add { x, y } => write!(f, "add {x}, {y}"),
            Self::Sub { x, y } => write!(f, "sub {x}, {y}"),
            Self::Mul { x, y } => write!(f, "mul {x}, {y}"),
            Self::Div { x, y } => write!(f, "div {x}, {y}"),
            Self::Shl(r) => write!(f, "shl {r}"),
            Self::Shr(r) => write!(f, "shr {r}"),
            Self::Isqrt(r) => write!(f, "isqrt {r}"),
        }
    }
}
