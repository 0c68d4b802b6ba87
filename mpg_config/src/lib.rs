#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the fuel computer.
//!
//! - `Config` and its sections are deserialized from TOML; every section is optional.
//! - Calibration fields are optional too. A present field overrides the value held in
//!   the computer's settings store; an absent one leaves the stored value alone.
//! - Quantities that the engine stores ×1000 (tank size, pressures, speeds, cost) are
//!   [`Milli`] values: a whole number (`18`) or a decimal string (`"68.137"`).
use core::fmt;
use core::str::FromStr;

use serde::Deserialize;
use serde::de::{self, Visitor};

/// Unit system the calibration values are expressed in.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Miles, US gallons, psi.
    #[default]
    Us,
    /// Kilometres, litres, kPa.
    Metric,
}

/// Multiply/divide backend for the calculation engine.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArithmeticMode {
    #[default]
    Native,
    Primitive,
}

/// A non-negative decimal with three places, held as thousandths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Milli(pub u64);

impl Milli {
    pub const fn from_units(units: u64) -> Option<Self> {
        match units.checked_mul(1000) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    pub const fn thousandths(self) -> u64 {
        self.0
    }

    /// Largest value a setting of `bits` width can hold.
    pub fn max_for_bits(bits: u32) -> Self {
        Self(u64::from(u32::MAX >> (32 - bits)))
    }
}

impl fmt::Display for Milli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / 1000, self.0 % 1000)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a decimal with at most three places")]
pub struct ParseMilliError(String);

impl FromStr for Milli {
    type Err = ParseMilliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseMilliError(s.to_owned());
        let (whole, frac) = s.trim().split_once('.').unwrap_or((s.trim(), ""));
        if (whole.is_empty() && frac.is_empty()) || frac.len() > 3 {
            return Err(bad());
        }
        if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let mut value: u64 = 0;
        for b in whole.bytes() {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(b - b'0')))
                .ok_or_else(bad)?;
        }
        let mut thousandths: u64 = 0;
        for b in frac.bytes().chain(core::iter::repeat(b'0')).take(3) {
            thousandths = thousandths * 10 + u64::from(b - b'0');
        }
        value
            .checked_mul(1000)
            .and_then(|v| v.checked_add(thousandths))
            .map(Self)
            .ok_or_else(bad)
    }
}

struct MilliVisitor;

impl Visitor<'_> for MilliVisitor {
    type Value = Milli;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a whole number or a decimal string such as \"18.5\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Milli, E> {
        Milli::from_units(v).ok_or_else(|| E::custom(format!("{v} is too large")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Milli, E> {
        let v = u64::try_from(v).map_err(|_| E::custom(format!("{v} is negative")))?;
        self.visit_u64(v)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Milli, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Milli, E> {
        Err(E::custom("write decimal values as strings, e.g. \"18.5\""))
    }
}

impl<'de> Deserialize<'de> for Milli {
    fn deserialize<D: de::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(MilliVisitor)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Vehicle {
    pub units: Option<Units>,
    /// Road-speed sensor pulses per mile (or km).
    pub pulses_per_distance: Option<u32>,
    /// Tank capacity in gallons (or litres).
    pub tank_size: Option<Milli>,
    /// Road-speed debounce window in milliseconds (0 disables).
    pub vss_pause_ms: Option<u32>,
    /// Crank revolutions per injector event (2 for sequential injection).
    pub crank_revs: Option<u32>,
    /// Below this the engine is considered stopped.
    pub min_good_rpm: Option<u32>,
    /// Injector-open microseconds per gallon (or litre). Derived from `[injectors]`
    /// when absent.
    pub micros_per_quantity: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Injectors {
    pub count: Option<u32>,
    /// Flow rating in mL/min at the reference pressure.
    pub size_ml_min: Option<u32>,
    /// Opening delay subtracted from every measured pulse.
    pub settle_us: Option<u32>,
    /// Regulated rail pressure.
    pub sys_pressure: Option<Milli>,
    /// Pressure the flow rating was measured at.
    pub ref_pressure: Option<Milli>,
    /// Largest plausible fraction of an engine cycle an injector stays open.
    pub duty_ceiling: Option<Milli>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Behavior {
    /// Seconds without pulses or input before the display sleeps.
    pub activity_timeout_s: Option<u32>,
    pub wakeup_reset_current: Option<bool>,
    pub window_filter: Option<bool>,
    /// Seconds per fuel-economy-over-time sample (0 disables).
    pub fe_vs_time_period_s: Option<u32>,
    pub autosave_active: Option<bool>,
    pub autosave_idle: Option<bool>,
    /// Lowest speed shown on the FE-vs-speed bar graph.
    pub bar_low_speed: Option<Milli>,
    /// Width of one FE-vs-speed bar.
    pub bar_speed_quantum: Option<Milli>,
    /// Price per gallon (or litre).
    pub fuel_cost: Option<Milli>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Engine {
    /// Rate of the cycle clock.
    pub cycles_per_second: u32,
    /// Native timer range; one scheduler tick per wrap.
    pub tick_cycles: u32,
    pub arithmetic: ArithmeticMode,
    /// Keep the idle/EOC accumulators.
    pub track_idle: bool,
    /// Reload the autosaved trips at startup.
    pub restore_trips: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            cycles_per_second: 312_500,
            tick_cycles: 256,
            arithmetic: ArithmeticMode::Native,
            track_idle: true,
            restore_trips: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Storage {
    /// Non-volatile image file; an in-memory store is used when absent.
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub vehicle: Vehicle,
    pub injectors: Injectors,
    pub behavior: Behavior,
    pub engine: Engine,
    pub storage: Storage,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn check_int(v: Option<u32>, ok: impl Fn(u32) -> bool, msg: &str) -> eyre::Result<()> {
    match v {
        Some(v) if !ok(v) => eyre::bail!("{msg}"),
        _ => Ok(()),
    }
}

fn check_milli(v: Option<Milli>, ok: impl Fn(Milli) -> bool, msg: &str) -> eyre::Result<()> {
    match v {
        Some(v) if !ok(v) => eyre::bail!("{msg}"),
        _ => Ok(()),
    }
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        let u16_range = |v: u32| (1..=65_535).contains(&v);
        let u8_range = |v: u32| (1..=255).contains(&v);
        let fits = |bits| move |m: Milli| m <= Milli::max_for_bits(bits);
        let nonzero_fits = |bits| move |m: Milli| m.0 > 0 && m <= Milli::max_for_bits(bits);

        // Vehicle
        let v = &self.vehicle;
        check_int(v.pulses_per_distance, u16_range, "vehicle.pulses_per_distance must be in 1..=65535")?;
        check_milli(v.tank_size, fits(24), "vehicle.tank_size must be in [0.0, 16777.215]")?;
        check_int(v.vss_pause_ms, |x| x <= 255, "vehicle.vss_pause_ms must be <= 255")?;
        check_int(v.crank_revs, u8_range, "vehicle.crank_revs must be in 1..=255")?;
        check_int(v.min_good_rpm, u16_range, "vehicle.min_good_rpm must be in 1..=65535")?;
        check_int(v.micros_per_quantity, |x| x > 0, "vehicle.micros_per_quantity must be > 0")?;

        // Injectors
        let i = &self.injectors;
        check_int(i.count, u8_range, "injectors.count must be in 1..=255")?;
        check_int(i.size_ml_min, u16_range, "injectors.size_ml_min must be in 1..=65535")?;
        check_int(i.settle_us, |x| x <= 65_535, "injectors.settle_us must be <= 65535")?;
        check_milli(i.sys_pressure, nonzero_fits(32), "injectors.sys_pressure must be > 0")?;
        check_milli(i.ref_pressure, nonzero_fits(32), "injectors.ref_pressure must be > 0")?;
        check_milli(
            i.duty_ceiling,
            |m| m.0 > 0 && m.0 < 1000,
            "injectors.duty_ceiling must be in (0.0, 1.0)",
        )?;

        // Behavior
        let b = &self.behavior;
        check_int(b.activity_timeout_s, u16_range, "behavior.activity_timeout_s must be in 1..=65535")?;
        check_int(b.fe_vs_time_period_s, |x| x <= 65_535, "behavior.fe_vs_time_period_s must be <= 65535")?;
        check_milli(b.bar_low_speed, fits(24), "behavior.bar_low_speed must be in [0.0, 16777.215]")?;
        check_milli(b.bar_speed_quantum, nonzero_fits(24), "behavior.bar_speed_quantum must be > 0")?;
        check_milli(b.fuel_cost, fits(16), "behavior.fuel_cost must be in [0.0, 65.535]")?;

        // Engine
        if self.engine.cycles_per_second == 0 {
            eyre::bail!("engine.cycles_per_second must be > 0");
        }
        if self.engine.tick_cycles < 2 || !self.engine.tick_cycles.is_power_of_two() {
            eyre::bail!("engine.tick_cycles must be a power of two >= 2");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_overrides_nothing() {
        let cfg = load_toml("").unwrap();
        assert!(cfg.vehicle.units.is_none());
        assert!(cfg.vehicle.pulses_per_distance.is_none());
        assert!(cfg.injectors.duty_ceiling.is_none());
        assert_eq!(cfg.engine.cycles_per_second, 312_500);
        cfg.validate().unwrap();
    }

    #[test]
    fn milli_parses_without_floats() {
        assert_eq!("68.137".parse::<Milli>().unwrap(), Milli(68_137));
        assert_eq!("0.8".parse::<Milli>().unwrap(), Milli(800));
        assert_eq!("18".parse::<Milli>().unwrap(), Milli(18_000));
        assert_eq!(".5".parse::<Milli>().unwrap(), Milli(500));
        assert!("1.2345".parse::<Milli>().is_err());
        assert!("-1".parse::<Milli>().is_err());
        assert!("".parse::<Milli>().is_err());
        assert!("1e3".parse::<Milli>().is_err());
        assert_eq!(Milli::max_for_bits(16), Milli(65_535));
        assert_eq!(Milli(3_799).to_string(), "3.799");
    }
}
