//! Packed byte form of programs, for tables stored or exchanged as data.
//!
//! Each instruction is an opcode byte, then an optional register selector byte, then an
//! optional operand byte:
//!
//! - bits 0..=5 of the opcode byte: base opcode
//! - bit 6 (`0x40`): selector byte follows, `x` in the high nibble and `y` in the low
//!   nibble as 1-based register numbers (0 = unused)
//! - bit 7 (`0x80`): operand byte follows (immediate, program, setting, trip variable,
//!   channel, byte position or skip distance)
//!
//! `SkipIfIndexBelow` carries its limit in the selector slot. Skip distances are signed
//! byte offsets on the wire, measured from the end of the skip instruction; in memory
//! they count instructions.

use thiserror::Error;

use super::instr::{Const, Instr, Program, Reg};
use crate::settings::Setting;
use crate::trip::TripVar;

const SEL: u8 = 0x40;
const OPERAND: u8 = 0x80;
const BASE_MASK: u8 = 0x3F;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown opcode {opcode:#04x} at byte {at}")]
    UnknownOpcode { opcode: u8, at: usize },
    #[error("opcode {opcode:#04x} at byte {at} has the wrong operand flags")]
    ShapeMismatch { opcode: u8, at: usize },
    #[error("program truncated at byte {0}")]
    Truncated(usize),
    #[error("bad register selector {sel:#04x} at byte {at}")]
    BadRegister { sel: u8, at: usize },
    #[error("operand {value} out of range at byte {at}")]
    BadOperand { value: u8, at: usize },
    #[error("skip at instruction {0} does not land on an instruction")]
    BadSkipTarget(usize),
    #[error("skip at instruction {0} does not fit in a signed byte")]
    SkipTooFar(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    None,
    Byte,
    Sel,
    SelByte,
}

impl Shape {
    const fn flags(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Byte => OPERAND,
            Self::Sel => SEL,
            Self::SelByte => SEL | OPERAND,
        }
    }

    const fn len(self) -> usize {
        match self {
            Self::None => 1,
            Self::Byte | Self::Sel => 2,
            Self::SelByte => 3,
        }
    }
}

const fn shape_of(base: u8) -> Option<Shape> {
    Some(match base {
        0 | 10 | 11 => Shape::None,
        1 | 6 | 8 | 9 => Shape::Byte,
        16 | 18..=20 | 22 | 24 | 27..=34 => Shape::Sel,
        2..=5 | 7 | 12..=15 | 17 | 21 | 23 | 25 | 26 => Shape::SelByte,
        _ => return None,
    })
}

const fn sel(x: Reg, y: Option<Reg>) -> u8 {
    let yn = match y {
        Some(r) => r as u8,
        None => 0,
    };
    ((x as u8) << 4) | yn
}

#[allow(clippy::cast_sign_loss)]
const fn skip_byte(d: i8) -> u8 {
    d as u8
}

/// `(base opcode, selector, operand)` with the skip operand still in instruction units.
fn parts(i: Instr) -> (u8, Option<u8>, Option<u8>) {
    use Instr::*;
    match i {
        Done => (0, None, None),
        Skip(d) => (1, None, Some(skip_byte(d))),
        SkipIfZero(r, d) => (2, Some(sel(r, None)), Some(skip_byte(d))),
        SkipIfLte { x, y, skip } => (3, Some(sel(x, Some(y))), Some(skip_byte(skip))),
        SkipIfLsb(r, d) => (4, Some(sel(r, None)), Some(skip_byte(d))),
        SkipIfMsb(r, d) => (5, Some(sel(r, None)), Some(skip_byte(d))),
        SkipIfMetric(d) => (6, None, Some(skip_byte(d))),
        SkipIfIndexBelow { limit, skip } => (7, Some(limit), Some(skip_byte(skip))),
        Call(p) => (8, None, Some(p as u8)),
        Jump(p) => (9, None, Some(p as u8)),
        TraceOn => (10, None, None),
        TraceOff => (11, None, None),
        LdImm(r, v) => (12, Some(sel(r, None)), Some(v)),
        LdConst(r, c) => (13, Some(sel(r, None)), Some(c as u8)),
        LdSetting(r, s) => (14, Some(sel(r, None)), Some(s as u8)),
        LdSettingIndexed(r, b) => (15, Some(sel(r, None)), Some(b)),
        LdSettingIndirect(r) => (16, Some(sel(r, None)), None),
        StSetting(r, s) => (17, Some(sel(r, None)), Some(s as u8)),
        StSettingIndirect(r) => (18, Some(sel(r, None)), None),
        LdNumer(r) => (19, Some(sel(r, None)), None),
        LdDenom(r) => (20, Some(sel(r, None)), None),
        LdTripVar(r, v) => (21, Some(sel(r, None)), Some(v as u8)),
        LdTankFuel(r) => (22, Some(sel(r, None)), None),
        LdVoltage(r, ch) => (23, Some(sel(r, None)), Some(ch)),
        Ld { x, y } => (24, Some(sel(x, Some(y))), None),
        LdByte { x, y, pos } => (25, Some(sel(x, Some(y))), Some(pos)),
        StByte { x, y, pos } => (26, Some(sel(x, Some(y))), Some(pos)),
        Swap { x, y } => (27, Some(sel(x, Some(y))), None),
        Add { x, y } => (28, Some(sel(x, Some(y))), None),
        Sub { x, y } => (29, Some(sel(x, Some(y))), None),
        Mul { x, y } => (30, Some(sel(x, Some(y))), None),
        Div { x, y } => (31, Some(sel(x, Some(y))), None),
        Shl(r) => (32, Some(sel(r, None)), None),
        Shr(r) => (33, Some(sel(r, None)), None),
        Isqrt(r) => (34, Some(sel(r, None)), None),
    }
}

/// Encoded length of one instruction in bytes.
#[must_use]
pub fn encoded_len(i: Instr) -> usize {
    let (_, s, o) = parts(i);
    1 + usize::from(s.is_some()) + usize::from(o.is_some())
}

fn offsets(program: &[Instr]) -> Vec<usize> {
    let mut out = Vec::with_capacity(program.len() + 1);
    let mut at = 0;
    for i in program {
        out.push(at);
        at += encoded_len(*i);
    }
    out.push(at);
    out
}

/// Encode a program, converting instruction skips to byte skips.
pub fn encode(program: &[Instr]) -> Result<Vec<u8>, CodecError> {
    let offs = offsets(program);
    let mut out = Vec::with_capacity(offs[program.len()]);
    for (idx, ins) in program.iter().enumerate() {
        let mut ins = *ins;
        if let Some(d) = ins.skip() {
            let target = isize::try_from(idx + 1)
                .ok()
                .and_then(|n| n.checked_add(isize::from(d)))
                .and_then(|t| usize::try_from(t).ok())
                .filter(|t| *t < program.len())
                .ok_or(CodecError::BadSkipTarget(idx))?;
            let bytes = offs[target] as isize - offs[idx + 1] as isize;
            let d = i8::try_from(bytes).map_err(|_| CodecError::SkipTooFar(idx))?;
            ins = ins.with_skip(d);
        }
        let (base, s, o) = parts(ins);
        let flags = if s.is_some() { SEL } else { 0 } | if o.is_some() { OPERAND } else { 0 };
        out.push(base | flags);
        out.extend(s);
        out.extend(o);
    }
    Ok(out)
}

fn reg(sel: u8, nibble: u8, at: usize) -> Result<Reg, CodecError> {
    Reg::from_number(nibble).ok_or(CodecError::BadRegister { sel, at })
}

/// Decode a packed program, converting byte skips back to instruction skips.
pub fn decode(bytes: &[u8]) -> Result<Vec<Instr>, CodecError> {
    let mut instrs = Vec::new();
    let mut offs = Vec::new();
    let mut at = 0;
    while at < bytes.len() {
        let opcode = bytes[at];
        let base = opcode & BASE_MASK;
        let shape = shape_of(base).ok_or(CodecError::UnknownOpcode { opcode, at })?;
        if opcode & !BASE_MASK != shape.flags() {
            return Err(CodecError::ShapeMismatch { opcode, at });
        }
        let end = at + shape.len();
        if end > bytes.len() {
            return Err(CodecError::Truncated(at));
        }
        let (s, o) = match shape {
            Shape::None => (0, 0),
            Shape::Byte => (0, bytes[at + 1]),
            Shape::Sel => (bytes[at + 1], 0),
            Shape::SelByte => (bytes[at + 1], bytes[at + 2]),
        };
        offs.push(at);
        instrs.push(build(base, s, o, at)?);
        at = end;
    }
    offs.push(at);

    for idx in 0..instrs.len() {
        if let Some(d) = instrs[idx].skip() {
            let target = offs[idx + 1] as isize + isize::from(d);
            let t = usize::try_from(target)
                .ok()
                .and_then(|t| offs[..instrs.len()].binary_search(&t).ok())
                .ok_or(CodecError::BadSkipTarget(idx))?;
            let d = i8::try_from(t as isize - (idx as isize + 1))
                .map_err(|_| CodecError::SkipTooFar(idx))?;
            instrs[idx] = instrs[idx].with_skip(d);
        }
    }
    Ok(instrs)
}

#[allow(clippy::cast_possible_wrap)]
fn build(base: u8, s: u8, o: u8, at: usize) -> Result<Instr, CodecError> {
    use Instr::*;
    let bad = |value: u8| CodecError::BadOperand { value, at };
    let x = || reg(s, s >> 4, at);
    let y = || reg(s, s & 0x0F, at);
    let d = o as i8;
    Ok(match base {
        0 => Done,
        1 => Skip(d),
        2 => SkipIfZero(x()?, d),
        3 => SkipIfLte { x: x()?, y: y()?, skip: d },
        4 => SkipIfLsb(x()?, d),
        5 => SkipIfMsb(x()?, d),
        6 => SkipIfMetric(d),
        7 => SkipIfIndexBelow { limit: s, skip: d },
        8 => Call(Program::try_from(o).map_err(bad)?),
        9 => Jump(Program::try_from(o).map_err(bad)?),
        10 => TraceOn,
        11 => TraceOff,
        12 => LdImm(x()?, o),
        13 => LdConst(x()?, Const::try_from(o).map_err(bad)?),
        14 => LdSetting(x()?, Setting::try_from(o).map_err(|_| bad(o))?),
        15 => LdSettingIndexed(x()?, o),
        16 => LdSettingIndirect(x()?),
        17 => StSetting(x()?, Setting::try_from(o).map_err(|_| bad(o))?),
        18 => StSettingIndirect(x()?),
        19 => LdNumer(x()?),
        20 => LdDenom(x()?),
        21 => LdTripVar(x()?, TripVar::try_from(o).map_err(bad)?),
        22 => LdTankFuel(x()?),
        23 => LdVoltage(x()?, o),
        24 => Ld { x: x()?, y: y()? },
        25 => LdByte { x: x()?, y: y()?, pos: o },
        26 => StByte { x: x()?, y: y()?, pos: o },
        27 => Swap { x: x()?, y: y()? },
        28 => Add { x: x()?, y: y()? },
        29 => Sub { x: x()?, y: y()? },
        30 => Mul { x: x()?, y: y()? },
        31 => Div { x: x()?, y: y()? },
        32 => Shl(x()?),
        33 => Shr(x()?),
        34 => Isqrt(x()?),
        _ => return Err(CodecError::UnknownOpcode { opcode: base, at }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use Instr::*;
    use Reg::*;

    #[test]
    fn selector_nibbles_are_one_based() {
        let bytes = encode(&[Add { x: R2, y: R5 }, Done]).unwrap();
        assert_eq!(bytes, vec![28 | SEL, 0x25, 0]);
    }

    #[test]
    fn skips_become_byte_offsets() {
        // skip over a 3-byte LdImm and a 1-byte Done
        let prog = [Skip(2), LdImm(R1, 7), Done, Done];
        let bytes = encode(&prog).unwrap();
        assert_eq!(bytes[..2], [1 | OPERAND, 4]);
        assert_eq!(decode(&bytes).unwrap(), prog);
    }

    #[test]
    fn backward_skip_round_trips() {
        let prog = [Shl(R4), SkipIfMsb(R4, 1), Skip(-3), Done];
        let bytes = encode(&prog).unwrap();
        // Skip(-3) jumps from byte 7 back to byte 0
        assert_eq!(bytes[5..7], [1 | OPERAND, (-7i8) as u8]);
        assert_eq!(decode(&bytes).unwrap(), prog);
    }

    #[test]
    fn index_below_keeps_limit_in_selector() {
        let prog = [SkipIfIndexBelow { limit: 3, skip: 0 }, Done];
        let bytes = encode(&prog).unwrap();
        assert_eq!(bytes[..3], [7 | SEL | OPERAND, 3, 0]);
        assert_eq!(decode(&bytes).unwrap(), prog);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            decode(&[0x3F]),
            Err(CodecError::UnknownOpcode { opcode: 0x3F, at: 0 })
        );
        assert_eq!(
            decode(&[28]),
            Err(CodecError::ShapeMismatch { opcode: 28, at: 0 })
        );
        assert_eq!(decode(&[28 | SEL]), Err(CodecError::Truncated(0)));
        assert!(matches!(
            decode(&[28 | SEL, 0x61]),
            Err(CodecError::BadRegister { .. })
        ));
        assert!(matches!(
            decode(&[8 | OPERAND, 200]),
            Err(CodecError::BadOperand { value: 200, .. })
        ));
    }

    #[test]
    fn skip_into_operand_bytes_is_rejected() {
        // byte skip of +1 lands inside the LdImm encoding
        let bytes = [1 | OPERAND, 1, 12 | SEL | OPERAND, 0x10, 5, 0];
        assert_eq!(decode(&bytes), Err(CodecError::BadSkipTarget(0)));
    }

    #[test]
    fn encode_rejects_skip_past_end() {
        assert_eq!(encode(&[Skip(1), Done]), Err(CodecError::BadSkipTarget(0)));
    }
}
