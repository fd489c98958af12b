//! Fixed-point arithmetic for cross-precision accounting
//!
//! Every amount is an unsigned integer scaled by `10^decimals` of its unit.
//! Helpers are checked (`None` on overflow) and round toward zero on division,
//! so valuations are conservative: a deposit is never credited with more
//! capacity usage than it is worth.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Precision of the canonical USD accounting unit.
pub const USD_DECIMALS: u8 = 6;

/// Precision of the native asset.
pub const NATIVE_DECIMALS: u8 = 18;

/// Largest exponent for which `10^exp` fits in a `u128`.
pub const MAX_POW10: u32 = 38;

/// `10^exp`, or `None` when it does not fit in a `u128`.
pub fn pow10(exp: u32) -> Option<u128> {
    10u128.checked_pow(exp)
}

/// Multiply by `10^exp` for positive `exp`, floor-divide by `10^-exp` otherwise.
///
/// Dividing by a power of ten larger than `u128::MAX` always floors to zero.
pub fn shift(value: u128, exp: i32) -> Option<u128> {
    if exp >= 0 {
        value.checked_mul(pow10(exp.unsigned_abs())?)
    } else {
        let exp = exp.unsigned_abs();
        if exp > MAX_POW10 {
            return Some(0);
        }
        Some(value / pow10(exp)?)
    }
}

/// Rescale `value` from `from_decimals` to `to_decimals` of precision.
pub fn rescale(value: u128, from_decimals: u8, to_decimals: u8) -> Option<u128> {
    shift(value, i32::from(to_decimals) - i32::from(from_decimals))
}

/// `a * b * 10^exp` with a single floor at the end.
pub fn mul_shift(a: u128, b: u128, exp: i32) -> Option<u128> {
    shift(a.checked_mul(b)?, exp)
}

/// `a * 10^exp / divisor` with a single floor at the end.
pub fn shift_div(a: u128, exp: i32, divisor: u128) -> Option<u128> {
    if divisor == 0 {
        return None;
    }
    if exp >= 0 {
        Some(shift(a, exp)? / divisor)
    } else {
        // Divide once by the combined denominator to keep a single floor.
        let scale = pow10(exp.unsigned_abs())?;
        match divisor.checked_mul(scale) {
            Some(denominator) => Some(a / denominator),
            None => Some(0),
        }
    }
}

/// `floor(value * pct / 100)` without intermediate overflow for `pct <= 100`.
pub fn percent_of(value: u128, pct: u32) -> Option<u128> {
    let pct = u128::from(pct);
    let whole = (value / 100).checked_mul(pct)?;
    let part = (value % 100) * pct / 100;
    whole.checked_add(part)
}

/// Amount in the canonical USD accounting unit (6-decimal fixed point).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UsdAmount(u128);

impl UsdAmount {
    pub const ZERO: Self = Self(0);

    /// Wrap a raw 6-decimal value (`1_000_000` = 1 USD).
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Whole dollars.
    pub fn from_dollars(dollars: u64) -> Self {
        Self(u128::from(dollars) * 1_000_000)
    }

    pub const fn raw(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Decimal rendering, `None` beyond rust_decimal's 96-bit mantissa.
    pub fn to_decimal(self) -> Option<Decimal> {
        let mantissa = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(mantissa, u32::from(USD_DECIMALS)).ok()
    }
}

impl fmt::Display for UsdAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Some(d) => write!(f, "{} USD", d),
            None => write!(f, "{}e-6 USD", self.0),
        }
    }
}
