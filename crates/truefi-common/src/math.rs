//! Fixed-point helpers
//!
//! All amounts are unsigned 128-bit integers. Rates are expressed in basis
//! points (1/10000). Division always truncates toward zero and every helper
//! reports overflow, underflow or division by zero instead of wrapping.

use num_bigint::BigUint;
use num_traits::ToPrimitive as _;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, MathematicalOps};

use crate::error::ArithmeticError;

/// 100% expressed in basis points
pub const BASIS_POINTS: u128 = 10_000;

/// Decimal scale every limit is normalized to
pub const NORMALIZED_DECIMALS: u8 = 18;

type MathResult<T> = std::result::Result<T, ArithmeticError>;

/// `x * bp / 10000`, truncating
#[inline]
pub fn basis_points(x: u128, bp: u128) -> MathResult<u128> {
    mul_div(x, bp, BASIS_POINTS)
}

/// `a * b / c`, truncating.
///
/// The product is widened past 128 bits when needed, so only a quotient
/// that does not fit `u128` overflows. Two 18-decimal amounts multiply
/// well beyond `u128::MAX`.
pub fn mul_div(a: u128, b: u128, c: u128) -> MathResult<u128> {
    if c == 0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / c);
    }
    let quotient = BigUint::from(a) * BigUint::from(b) / BigUint::from(c);
    quotient.to_u128().ok_or(ArithmeticError::Overflow)
}

/// Integer power for small exponents used by the rate curves
#[inline]
pub fn power(base: u128, exponent: u32) -> MathResult<u128> {
    base.checked_pow(exponent).ok_or(ArithmeticError::Overflow)
}

#[inline]
pub fn add(a: u128, b: u128) -> MathResult<u128> {
    a.checked_add(b).ok_or(ArithmeticError::Overflow)
}

#[inline]
pub fn sub(a: u128, b: u128) -> MathResult<u128> {
    a.checked_sub(b).ok_or(ArithmeticError::Underflow)
}

#[inline]
pub fn div(a: u128, b: u128) -> MathResult<u128> {
    a.checked_div(b).ok_or(ArithmeticError::DivisionByZero)
}

/// `10^exponent`
pub fn pow10(exponent: u8) -> MathResult<u128> {
    power(10, exponent as u32)
}

/// Rescale an amount between token decimal counts.
///
/// Scaling down truncates.
pub fn normalize_decimals(amount: u128, from: u8, to: u8) -> MathResult<u128> {
    if to >= from {
        amount
            .checked_mul(pow10(to - from)?)
            .ok_or(ArithmeticError::Overflow)
    } else {
        Ok(amount / pow10(from - to)?)
    }
}

/// Express an amount with `decimals` in the 18-decimal scale limits use
#[inline]
pub fn to_normalized(amount: u128, decimals: u8) -> MathResult<u128> {
    normalize_decimals(amount, decimals, NORMALIZED_DECIMALS)
}

/// Convert an 18-decimal amount back to a token's native scale
#[inline]
pub fn from_normalized(amount: u128, decimals: u8) -> MathResult<u128> {
    normalize_decimals(amount, NORMALIZED_DECIMALS, decimals)
}

/// Human-readable decimal for logs and reports
pub fn to_decimal(amount: u128, decimals: u8) -> MathResult<Decimal> {
    let mantissa = i128::try_from(amount).map_err(|_| ArithmeticError::Overflow)?;
    Decimal::try_from_i128_with_scale(mantissa, decimals as u32)
        .map_err(|_| ArithmeticError::Overflow)
}

/// `floor(10000 * (numerator / denominator) ^ (exponent_bp / 10000))`
///
/// Fractional exponents go through `rust_decimal` logarithms, integer
/// exponents stay in integer math.
pub fn fractional_power_bp(numerator: u128, denominator: u128, exponent_bp: u128) -> MathResult<u128> {
    if denominator == 0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    if exponent_bp == 0 {
        return Ok(BASIS_POINTS);
    }
    if numerator == 0 {
        return Ok(0);
    }
    if numerator == denominator {
        return Ok(BASIS_POINTS);
    }
    if exponent_bp % BASIS_POINTS == 0 {
        let exponent = u32::try_from(exponent_bp / BASIS_POINTS).map_err(|_| ArithmeticError::Overflow)?;
        let num = power(numerator, exponent)?;
        let den = power(denominator, exponent)?;
        return mul_div(BASIS_POINTS, num, den);
    }

    let n = Decimal::from_u128(numerator).ok_or(ArithmeticError::Overflow)?;
    let d = Decimal::from_u128(denominator).ok_or(ArithmeticError::Overflow)?;
    let e = Decimal::from_u128(exponent_bp).ok_or(ArithmeticError::Overflow)?
        / Decimal::from(BASIS_POINTS as u64);

    let ratio = n.checked_div(d).ok_or(ArithmeticError::DivisionByZero)?;
    let raised = ratio.checked_powd(e).ok_or(ArithmeticError::Overflow)?;
    let scaled = raised
        .checked_mul(Decimal::from(BASIS_POINTS as u64))
        .ok_or(ArithmeticError::Overflow)?;

    scaled.floor().to_u128().ok_or(ArithmeticError::Overflow)
}
