//! Shared constants and small helpers.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Fixed-point scale of every "number" quantity (three implied decimals).
pub const DECIMAL_POINT: u64 = 1_000;
/// Cycle clock rate of the reference board (20 MHz core, /64 prescaler).
pub const DEFAULT_CYCLES_PER_SECOND: u32 = 312_500;
/// Native range of the reference 8-bit timer; one scheduler tick per wrap.
pub const DEFAULT_TICK_CYCLES: u32 = 256;
/// Main-loop cycles per second (half-second cycles).
pub const LOOPS_PER_SECOND: u32 = 2;
/// Full-scale reading of the analog converter.
pub const ADC_FULL_SCALE: u32 = 1_024;
/// Reference voltage of the analog converter in millivolts.
pub const ADC_REFERENCE_MV: u32 = 5_000;
/// Number of analog channels sampled.
pub const ANALOG_CHANNELS: usize = 2;

/// Ticks in one main-loop cycle for the given clock rate and tick length.
/// Never returns 0.
#[inline]
pub fn loop_ticks(cycles_per_second: u32, tick_cycles: u32) -> u32 {
    (cycles_per_second / (LOOPS_PER_SECOND * tick_cycles.max(1))).max(1)
}

/// Clamp a 64-bit engine result into a 32-bit parameter slot.
#[inline]
pub fn saturate_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}
