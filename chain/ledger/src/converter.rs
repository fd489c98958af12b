//! Value conversion between asset-native units and the canonical USD unit
//!
//! Pure fixed-point arithmetic. The oracle-backed entry points only read
//! prices; they never touch ledger state.
//!
//! Native:  usd6 = amount * p_usd / 10^(asset_dec + p_usd_dec - 6)
//! Token:   native18 = amount * p_native / 10^(asset_dec + p_native_dec - 18)
//!          usd_p    = native18 * p_usd / 10^18
//!          usd6     = rescale(usd_p, p_usd_dec -> 6)

use ledger_types::numeric::{
    mul_shift, rescale, shift_div, UsdAmount, NATIVE_DECIMALS, USD_DECIMALS,
};
use ledger_types::time::Timestamp;
use tracing::debug;

use crate::errors::LedgerError;
use crate::oracle::{Price, PriceOracleAdapter};
use crate::registry::AssetConfig;

/// Sum of `plus` decimals minus sum of `minus` decimals.
fn exp(plus: &[u8], minus: &[u8]) -> i32 {
    let sum = |ds: &[u8]| ds.iter().map(|d| i32::from(*d)).sum::<i32>();
    sum(plus) - sum(minus)
}

fn overflow(context: &'static str) -> LedgerError {
    LedgerError::Overflow { context }
}

// ───────────────────────────── Pure conversions ─────────────────────────────

/// Native amount → USD (6dp), single floor.
pub fn native_to_usd(amount: u128, asset_decimals: u8, usd_price: Price) -> Option<UsdAmount> {
    let e = exp(&[USD_DECIMALS], &[asset_decimals, usd_price.decimals]);
    mul_shift(amount, usd_price.value, e).map(UsdAmount::from_raw)
}

/// Token amount → USD (6dp) through the native asset.
pub fn token_to_usd(
    amount: u128,
    asset_decimals: u8,
    native_price: Price,
    usd_price: Price,
) -> Option<UsdAmount> {
    let e = exp(&[NATIVE_DECIMALS], &[asset_decimals, native_price.decimals]);
    let in_native = mul_shift(amount, native_price.value, e)?;
    let usd_at_feed = mul_shift(in_native, usd_price.value, -i32::from(NATIVE_DECIMALS))?;
    rescale(usd_at_feed, usd_price.decimals, USD_DECIMALS).map(UsdAmount::from_raw)
}

/// USD (6dp) → native amount, floor.
pub fn usd_to_native(usd: UsdAmount, asset_decimals: u8, usd_price: Price) -> Option<u128> {
    let e = exp(&[asset_decimals, usd_price.decimals], &[USD_DECIMALS]);
    shift_div(usd.raw(), e, usd_price.value)
}

/// USD (6dp) → token amount through the native asset, floor at each step.
pub fn usd_to_token(
    usd: UsdAmount,
    asset_decimals: u8,
    native_price: Price,
    usd_price: Price,
) -> Option<u128> {
    let usd_at_feed = rescale(usd.raw(), USD_DECIMALS, usd_price.decimals)?;
    let in_native = shift_div(usd_at_feed, i32::from(NATIVE_DECIMALS), usd_price.value)?;
    let e = exp(&[asset_decimals, native_price.decimals], &[NATIVE_DECIMALS]);
    shift_div(in_native, e, native_price.value)
}

/// Rescale a USD (6dp) figure to `decimals` of precision without any price.
///
/// Used for the per-asset minimum deposit.
pub fn scale_from_canonical(usd: UsdAmount, decimals: u8) -> Result<u128, LedgerError> {
    rescale(usd.raw(), USD_DECIMALS, decimals).ok_or_else(|| overflow("minimum deposit rescale"))
}

// ───────────────────────────── Oracle-backed ─────────────────────────────

/// Value `amount` of `config.asset` in the canonical USD unit.
///
/// A zero amount is zero and never queries the oracle.
pub fn to_canonical_usd(
    oracle: &PriceOracleAdapter,
    config: &AssetConfig,
    amount: u128,
    now: Timestamp,
) -> Result<UsdAmount, LedgerError> {
    if amount == 0 {
        return Ok(UsdAmount::ZERO);
    }

    let usd_price = oracle.native_usd_price(now)?;
    let usd = if config.is_native {
        native_to_usd(amount, config.decimals, usd_price)
    } else {
        let native_price = oracle.asset_native_price(config, now)?;
        token_to_usd(amount, config.decimals, native_price, usd_price)
    }
    .ok_or_else(|| overflow("usd conversion"))?;

    debug!(asset = %config.asset, amount, usd = usd.raw(), "converted to canonical usd");
    Ok(usd)
}

/// Inverse of [`to_canonical_usd`]: how many units of `config.asset` are worth `usd`.
pub fn from_canonical_usd(
    oracle: &PriceOracleAdapter,
    config: &AssetConfig,
    usd: UsdAmount,
    now: Timestamp,
) -> Result<u128, LedgerError> {
    if usd.is_zero() {
        return Ok(0);
    }

    let usd_price = oracle.native_usd_price(now)?;
    let amount = if config.is_native {
        usd_to_native(usd, config.decimals, usd_price)
    } else {
        let native_price = oracle.asset_native_price(config, now)?;
        usd_to_token(usd, config.decimals, native_price, usd_price)
    }
    .ok_or_else(|| overflow("usd inverse conversion"))?;

    debug!(asset = %config.asset, usd = usd.raw(), amount, "converted from canonical usd");
    Ok(amount)
}
