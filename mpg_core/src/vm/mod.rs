//! Calculation engine: a small register machine over the 64-bit kernel.
//!
//! State is five registers, a 16-deep return stack of `(program, pc)` frames and a
//! context index that every call inherits. The index picks the trip instance that
//! `LdTripVar` reads, the conversion slot for the indirect setting opcodes, and the
//! offset for `LdSettingIndexed`.

pub mod codec;
pub mod instr;

pub use crate::error::{ExecError, Fault};
pub use instr::{Const, Instr, Program, Reg};

use crate::arith;
use crate::settings::{CONVERSIONS, Conversion, Setting};
use crate::trip::TripVar;

pub const REGISTER_COUNT: usize = 5;
pub const STACK_DEPTH: usize = 16;
/// Upper bound on executed instructions per run; the catalog needs a few thousand.
pub const STEP_LIMIT: u32 = 1 << 16;

/// Supplies program bodies by identifier.
pub trait ProgramTable {
    fn program(&self, id: Program) -> &[Instr];
}

/// Everything a program can observe or change outside its registers.
pub trait Environment {
    fn metric(&self) -> bool;
    fn cycles_per_second(&self) -> u32;
    fn tick_cycles(&self) -> u32;
    /// Raw counter of the trip instance at context index `trip`.
    fn trip_var(&self, trip: u8, var: TripVar) -> Option<u64>;
    fn tank_fuel(&self) -> u64;
    fn setting(&self, s: Setting) -> u32;
    fn store_setting(&mut self, s: Setting, value: u64);
    fn voltage(&self, channel: u8) -> Option<u16>;
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    program: Program,
    pc: usize,
}

#[derive(Debug, Default)]
pub struct Machine {
    regs: [u64; REGISTER_COUNT],
    stack: heapless::Vec<Frame, STACK_DEPTH>,
    trace: bool,
}

impl Machine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub const fn reg(&self, r: Reg) -> u64 {
        self.regs[r.slot()]
    }

    #[inline]
    pub fn set_reg(&mut self, r: Reg, v: u64) {
        self.regs[r.slot()] = v;
    }

    #[must_use]
    pub const fn registers(&self) -> &[u64; REGISTER_COUNT] {
        &self.regs
    }

    /// Run `entry` with context `index` until it returns; yields register 2.
    ///
    /// Registers keep whatever the caller loaded, so arguments go in before the call.
    pub fn run<P, E>(
        &mut self,
        table: &P,
        env: &mut E,
        entry: Program,
        index: u8,
    ) -> Result<u64, ExecError>
    where
        P: ProgramTable + ?Sized,
        E: Environment + ?Sized,
    {
        self.stack.clear();
        self.trace = false;
        let out = self.execute(table, env, entry, index);
        out.map_err(|fault| {
            tracing::error!(program = %entry, index, %fault, "engine fault");
            ExecError {
                fault,
                partial: self.reg(Reg::R2),
            }
        })
    }

    fn execute<P, E>(
        &mut self,
        table: &P,
        env: &mut E,
        entry: Program,
        index: u8,
    ) -> Result<u64, Fault>
    where
        P: ProgramTable + ?Sized,
        E: Environment + ?Sized,
    {
        let mut program = entry;
        let mut code = table.program(program);
        let mut pc = 0usize;
        let mut steps = 0u32;

        loop {
            steps += 1;
            if steps > STEP_LIMIT {
                return Err(Fault::StepLimit(STEP_LIMIT));
            }
            let Some(&ins) = code.get(pc) else {
                return Err(Fault::RanOffEnd { program });
            };
            if self.trace {
                tracing::trace!(%program, pc, instr = %ins, regs = ?self.regs, "step");
            }
            pc += 1;

            let mut taken = false;
            match ins {
                Instr::Done => match self.stack.pop() {
                    Some(frame) => {
                        program = frame.program;
                        code = table.program(program);
                        pc = frame.pc;
                    }
                    None => return Ok(self.reg(Reg::R2)),
                },
                Instr::Skip(_) => taken = true,
                Instr::SkipIfZero(r, _) => taken = arith::is_zero(self.reg(r)),
                Instr::SkipIfLte { x, y, .. } => taken = arith::lte(self.reg(x), self.reg(y)),
                Instr::SkipIfLsb(r, _) => taken = arith::lsb(self.reg(r)),
                Instr::SkipIfMsb(r, _) => taken = arith::msb(self.reg(r)),
                Instr::SkipIfMetric(_) => taken = env.metric(),
                Instr::SkipIfIndexBelow { limit, .. } => taken = index < limit,
                Instr::Call(target) => {
                    self.stack
                        .push(Frame { program, pc })
                        .map_err(|_| Fault::StackOverflow(target))?;
                    program = target;
                    code = table.program(program);
                    pc = 0;
                }
                Instr::Jump(target) => {
                    program = target;
                    code = table.program(program);
                    pc = 0;
                }
                Instr::TraceOn => self.trace = true,
                Instr::TraceOff => self.trace = false,

                Instr::LdImm(r, v) => self.set_reg(r, u64::from(v)),
                Instr::LdConst(r, c) => {
                    self.set_reg(r, c.value(env.cycles_per_second(), env.tick_cycles()));
                }
                Instr::LdSetting(r, s) => self.set_reg(r, u64::from(env.setting(s))),
                Instr::LdSettingIndexed(r, base) => {
                    let i = base.wrapping_add(index);
                    let s = Setting::try_from(i).map_err(|_| Fault::UnknownSetting(i))?;
                    self.set_reg(r, u64::from(env.setting(s)));
                }
                Instr::LdSettingIndirect(r) => {
                    let c = conversion(index)?;
                    self.set_reg(r, u64::from(env.setting(c.setting)));
                }
                Instr::StSetting(r, s) => env.store_setting(s, self.reg(r)),
                Instr::StSettingIndirect(r) => {
                    let c = conversion(index)?;
                    env.store_setting(c.setting, self.reg(r));
                }
                Instr::LdNumer(r) => self.set_reg(r, conversion(index)?.numer()),
                Instr::LdDenom(r) => self.set_reg(r, conversion(index)?.denom()),
                Instr::LdTripVar(r, v) => {
                    let val = env.trip_var(index, v).ok_or(Fault::UnknownTrip(index))?;
                    self.set_reg(r, val);
                }
                Instr::LdTankFuel(r) => self.set_reg(r, env.tank_fuel()),
                Instr::LdVoltage(r, ch) => {
                    let v = env.voltage(ch).ok_or(Fault::UnknownChannel(ch))?;
                    self.set_reg(r, u64::from(v));
                }
                Instr::Ld { x, y } => self.set_reg(x, self.reg(y)),
                Instr::LdByte { x, y, pos } => {
                    let b = byte_at(self.reg(y), pos)?;
                    self.set_reg(x, u64::from(b));
                }
                Instr::StByte { x, y, pos } => {
                    let mut bytes = self.reg(y).to_le_bytes();
                    let slot = bytes.get_mut(usize::from(pos)).ok_or(Fault::BytePosition(pos))?;
                    *slot = self.reg(x).to_le_bytes()[0];
                    self.set_reg(y, u64::from_le_bytes(bytes));
                }
                Instr::Swap { x, y } => self.regs.swap(x.slot(), y.slot()),

                Instr::Add { x, y } => self.set_reg(x, arith::add(self.reg(x), self.reg(y))),
                Instr::Sub { x, y } => self.set_reg(x, arith::sub(self.reg(x), self.reg(y))),
                Instr::Mul { x, y } => self.set_reg(x, arith::mul(self.reg(x), self.reg(y))),
                Instr::Div { x, y } => {
                    let (q, r) = arith::div(self.reg(x), self.reg(y));
                    self.set_reg(x, q);
                    self.set_reg(y, r);
                }
                Instr::Shl(r) => self.set_reg(r, arith::shl(self.reg(r))),
                Instr::Shr(r) => self.set_reg(r, arith::shr(self.reg(r))),
                Instr::Isqrt(r) => self.set_reg(r, arith::isqrt_q12(self.reg(r))),
            }

            if taken {
                let d = ins.skip().unwrap_or(0);
                pc = pc
                    .checked_add_signed(isize::from(d))
                    .filter(|t| *t < code.len())
                    .ok_or(Fault::SkipOutOfRange {
                        program,
                        pc: pc - 1,
                    })?;
            }
        }
    }
}

fn conversion(index: u8) -> Result<Conversion, Fault> {
    CONVERSIONS
        .get(usize::from(index))
        .copied()
        .ok_or(Fault::UnknownConversion(index))
}

fn byte_at(v: u64, pos: u8) -> Result<u8, Fault> {
    v.to_le_bytes()
        .get(usize::from(pos))
        .copied()
        .ok_or(Fault::BytePosition(pos))
}
