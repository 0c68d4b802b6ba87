//! Text rendering of engine results.
//!
//! Rounding and digit extraction run as catalog programs; this module only turns the
//! digit bytes those programs leave in r3 into characters.

use crate::catalog::{Calculator, DisplayKind, Evaluation, Fixed};
use crate::error::ExecError;
use crate::settings::Setting;
use crate::trip::TripVar;
use crate::util::{DEFAULT_CYCLES_PER_SECOND, DEFAULT_TICK_CYCLES};
use crate::vm::{Environment, Program, Reg};

/// Shown whenever a value overflows or does not fit its field.
pub const OVERFLOW_TEXT: &str = " ---- ";
pub const NUMBER_WIDTH: usize = 6;
pub const COUNT_WIDTH: usize = 10;

/// Context index asking the round-off program for the unrounded value.
const RAW_INDEX: u8 = 4;
const MAX_DECIMALS: u8 = 3;

/// The formatting programs read no trips or settings.
struct Detached;

impl Environment for Detached {
    fn metric(&self) -> bool {
        false
    }
    fn cycles_per_second(&self) -> u32 {
        DEFAULT_CYCLES_PER_SECOND
    }
    fn tick_cycles(&self) -> u32 {
        DEFAULT_TICK_CYCLES
    }
    fn trip_var(&self, _trip: u8, _var: TripVar) -> Option<u64> {
        None
    }
    fn tank_fuel(&self) -> u64 {
        0
    }
    fn setting(&self, s: Setting) -> u32 {
        s.default_value()
    }
    fn store_setting(&mut self, _s: Setting, _value: u64) {}
    fn voltage(&self, _channel: u8) -> Option<u16> {
        None
    }
}

/// Run the number formatter; `None` on overflow, else ten ASCII digits.
fn digits(calc: &mut Calculator, value: u64, index: u8) -> Result<Option<[u8; 10]>, ExecError> {
    let r2 = calc.call(&mut Detached, Program::FormatNumber, index, value)?;
    if Fixed::from_raw(r2).is_overflow() {
        return Ok(None);
    }
    let pairs = calc.register(Reg::R3).to_le_bytes();
    let mut out = [b'0'; 10];
    for (i, pair) in pairs[..5].iter().enumerate() {
        out[2 * i] = b'0' + pair / 10;
        out[2 * i + 1] = b'0' + pair % 10;
    }
    Ok(Some(out))
}

/// `ddddddd.ddd` with leading integer zeros blanked.
fn fixed_layout(d: &[u8; 10]) -> [u8; 11] {
    let mut buf = [b' '; 11];
    buf[..7].copy_from_slice(&d[..7]);
    buf[7] = b'.';
    buf[8..].copy_from_slice(&d[7..]);
    for c in &mut buf[..6] {
        if *c != b'0' {
            break;
        }
        *c = b' ';
    }
    buf
}

fn text(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Six-character rendering of a ×1000 value with up to `decimals` places.
///
/// The number of places actually shown shrinks with magnitude so that the integer
/// part always fits.
pub fn number(calc: &mut Calculator, value: u64, decimals: u8) -> Result<String, ExecError> {
    let decimals = decimals.min(MAX_DECIMALS);
    let Some(d) = digits(calc, value, decimals)? else {
        return Ok(OVERFLOW_TEXT.to_owned());
    };
    let buf = fixed_layout(&d);

    let mut start = 1;
    if decimals > 0 {
        let mut y = 2;
        while y < 2 + usize::from(decimals) && buf[y] == b' ' {
            y += 1;
            start = y;
        }
    }
    if start == 1 && buf[0] != b' ' {
        return Ok(OVERFLOW_TEXT.to_owned());
    }
    Ok(text(&buf[start..start + NUMBER_WIDTH]))
}

/// `hh:mm:ss`, overflowing at 100 hours.
pub fn time(calc: &mut Calculator, seconds: u64) -> Result<String, ExecError> {
    let r2 = calc.call(&mut Detached, Program::FormatTime, 0, seconds)?;
    if r2 != 0 {
        return Ok(OVERFLOW_TEXT.to_owned());
    }
    let [h, m, s, ..] = calc.register(Reg::R3).to_le_bytes();
    Ok(format!("{h:02}:{m:02}:{s:02}"))
}

/// Right-aligned integer, up to ten digits.
pub fn count(calc: &mut Calculator, value: u64) -> Result<String, ExecError> {
    let Some(d) = digits(calc, value, RAW_INDEX)? else {
        return Ok(OVERFLOW_TEXT.to_owned());
    };
    let first = d.iter().position(|c| *c != b'0').unwrap_or(d.len() - 1);
    Ok(format!("{:>width$}", text(&d[first..]), width = COUNT_WIDTH))
}

/// Unrounded `ddddddd.ddd` diagnostic view of a ×1000 value.
pub fn raw(calc: &mut Calculator, value: u64) -> Result<String, ExecError> {
    Ok(match digits(calc, value, RAW_INDEX)? {
        Some(d) => text(&fixed_layout(&d)),
        None => OVERFLOW_TEXT.to_owned(),
    })
}

/// Render an evaluation according to its quantity's display kind.
pub fn evaluation(calc: &mut Calculator, e: &Evaluation) -> Result<String, ExecError> {
    match e.display() {
        DisplayKind::Number => number(calc, e.raw, e.decimals()),
        DisplayKind::Count => count(calc, e.raw),
        DisplayKind::Time => time(calc, e.raw),
    }
}
