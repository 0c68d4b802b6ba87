//! 64-bit unsigned fixed-point kernel.
//!
//! Values are never signed: a "negative" subtraction wraps and callers compare first.
//! Multiply and divide exist twice. The native forms below back the `Mul`/`Div`
//! opcodes. The primitive forms are bytecode programs in the catalog built only from
//! the shift/add/compare operations here, and both must agree bit for bit.

/// Which implementation the catalog's multiply and divide subroutines use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Arithmetic {
    /// Full-width hardware multiply/divide.
    #[default]
    Native,
    /// Shift-and-add multiply, restoring long division.
    Primitive,
}

impl core::str::FromStr for Arithmetic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(Self::Native),
            "primitive" => Ok(Self::Primitive),
            other => Err(format!("unknown arithmetic backend '{other}'")),
        }
    }
}

/// Add with carry-in; returns the sum and carry-out.
#[inline]
#[must_use]
pub const fn add_carry(x: u64, y: u64, carry: bool) -> (u64, bool) {
    let (s1, c1) = x.overflowing_add(y);
    let (s2, c2) = s1.overflowing_add(carry as u64);
    (s2, c1 | c2)
}

#[inline]
#[must_use]
pub const fn add(x: u64, y: u64) -> u64 {
    add_carry(x, y, false).0
}

/// Subtraction as addition of the ones' complement with a carry-in.
#[inline]
#[must_use]
pub const fn sub(x: u64, y: u64) -> u64 {
    add_carry(x, !y, true).0
}

/// Less-or-equal, compared most significant byte first.
#[must_use]
pub fn lte(x: u64, y: u64) -> bool {
    let (xb, yb) = (x.to_be_bytes(), y.to_be_bytes());
    for (a, b) in xb.iter().zip(yb.iter()) {
        if a != b {
            return a < b;
        }
    }
    true
}

#[inline]
#[must_use]
pub const fn is_zero(x: u64) -> bool {
    x == 0
}

#[inline]
#[must_use]
pub const fn lsb(x: u64) -> bool {
    x & 1 != 0
}

#[inline]
#[must_use]
pub const fn msb(x: u64) -> bool {
    x >> 63 != 0
}

#[inline]
#[must_use]
pub const fn shl(x: u64) -> u64 {
    x << 1
}

#[inline]
#[must_use]
pub const fn shr(x: u64) -> u64 {
    x >> 1
}

/// Native multiply, wrapping at 64 bits.
#[inline]
#[must_use]
pub const fn mul(x: u64, y: u64) -> u64 {
    x.wrapping_mul(y)
}

/// Native divide: `(quotient, remainder)`.
///
/// A zero divisor yields the overflow sentinel (`u64::MAX`) with the dividend as
/// remainder. A zero dividend yields `(0, 0)`.
#[inline]
#[must_use]
pub const fn div(x: u64, y: u64) -> (u64, u64) {
    if x == 0 {
        (0, 0)
    } else if y == 0 {
        (u64::MAX, x)
    } else {
        (x / y, x % y)
    }
}

/// Square root of a Q4.12 value, in Q4.12 (4096 = 1.0).
///
/// Inputs wider than 32 bits saturate; the result is exact to the floor.
#[inline]
#[must_use]
pub fn isqrt_q12(x: u64) -> u64 {
    (x.min(u64::from(u32::MAX)) << 12).isqrt()
}

// Host reference forms of the primitive algorithms, used by property tests to pin
// the bytecode versions against an independent statement of the same algorithm.

/// Shift-and-add multiply.
#[must_use]
pub const fn mul_shift_add(mut multiplicand: u64, mut multiplier: u64) -> u64 {
    let mut acc = 0u64;
    while multiplier != 0 {
        if lsb(multiplier) {
            acc = add(acc, multiplicand);
        }
        multiplicand = shl(multiplicand);
        multiplier = shr(multiplier);
    }
    acc
}

/// Restoring long division with a quotient-bit marker.
#[must_use]
pub fn div_restoring(dividend: u64, divisor: u64) -> (u64, u64) {
    if dividend == 0 {
        return (0, 0);
    }
    if divisor == 0 {
        return (sub(0, 1), dividend);
    }
    let mut d = divisor;
    let mut marker = 1u64;
    let mut rem = dividend;
    let mut quot = 0u64;
    while !msb(d) {
        d = shl(d);
        marker = shl(marker);
    }
    while marker != 0 {
        if lte(d, rem) {
            rem = sub(rem, d);
            quot = add(quot, marker);
        }
        d = shr(d);
        marker = shr(marker);
    }
    (quot, rem)
}
