//! Ledger configuration
//!
//! Plain data with defaults; hosts load it from whatever serde format they use.

use ledger_types::ids::PriceSourceId;
use ledger_types::numeric::UsdAmount;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::policy::WithdrawalPolicy;

/// 200 native units at 18 decimals.
const DEFAULT_WITHDRAWAL_LIMIT: u128 = 200 * 1_000_000_000_000_000_000;

/// Ledger engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ceiling on the total USD value held; fixed for the ledger's lifetime
    pub bank_cap_usd: UsdAmount,
    /// Smallest accepted deposit, rescaled to each asset's precision
    pub min_deposit_usd: UsdAmount,
    /// Seconds after the latest deposit during which withdrawals are refused
    pub lock_period_secs: i64,
    /// Per-transaction withdrawal ceiling in raw asset units
    pub withdrawal_limit: u128,
    /// Whole-number percentage kept from each regular withdrawal
    pub withdrawal_fee_pct: u32,
    /// Ceiling enforced whenever the fee is changed
    pub max_withdrawal_fee_pct: u32,
    /// Feed that prices the native asset in USD
    pub native_usd_source: PriceSourceId,
    /// Oldest acceptable oracle answer; `None` disables the check
    pub max_price_age_secs: Option<i64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            bank_cap_usd: UsdAmount::from_dollars(1_000_000),
            min_deposit_usd: UsdAmount::from_dollars(100),
            lock_period_secs: 86_400,
            withdrawal_limit: DEFAULT_WITHDRAWAL_LIMIT,
            withdrawal_fee_pct: 1,
            max_withdrawal_fee_pct: 10,
            native_usd_source: PriceSourceId::new("NATIVE/USD"),
            max_price_age_secs: Some(3600),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bank_cap_usd.is_zero() {
            return Err(ConfigError::ZeroCap);
        }
        if self.min_deposit_usd > self.bank_cap_usd {
            return Err(ConfigError::MinimumAboveCap {
                minimum: self.min_deposit_usd,
                cap: self.bank_cap_usd,
            });
        }
        if let Some(age) = self.max_price_age_secs {
            if age <= 0 {
                return Err(ConfigError::NonPositivePriceAge(age));
            }
        }
        self.withdrawal_policy().map(|_| ())
    }

    pub(crate) fn withdrawal_policy(&self) -> Result<WithdrawalPolicy, ConfigError> {
        WithdrawalPolicy::new(
            self.lock_period_secs,
            self.withdrawal_limit,
            self.withdrawal_fee_pct,
            self.max_withdrawal_fee_pct,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bank_cap_usd, UsdAmount::from_dollars(1_000_000));
        assert_eq!(config.lock_period_secs, 86_400);
        assert_eq!(config.max_price_age_secs, Some(3600));
    }

    #[test]
    fn test_zero_cap_rejected() {
        let config = LedgerConfig {
            bank_cap_usd: UsdAmount::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCap));
    }

    #[test]
    fn test_minimum_above_cap_rejected() {
        let config = LedgerConfig {
            bank_cap_usd: UsdAmount::from_dollars(50),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MinimumAboveCap { .. })
        ));
    }

    #[test]
    fn test_fee_above_ceiling_rejected() {
        let config = LedgerConfig {
            withdrawal_fee_pct: 20,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::FeeAboveCeiling { fee: 20, max: 10 })
        );
    }

    #[test]
    fn test_non_positive_price_age_rejected() {
        let config = LedgerConfig {
            max_price_age_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NonPositivePriceAge(0)));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{"withdrawal_fee_pct": 5, "lock_period_secs": 0}"#).unwrap();
        assert_eq!(config.withdrawal_fee_pct, 5);
        assert_eq!(config.lock_period_secs, 0);
        assert_eq!(config.bank_cap_usd, UsdAmount::from_dollars(1_000_000));
        assert!(config.validate().is_ok());
    }
}
