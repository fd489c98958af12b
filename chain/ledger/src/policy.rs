//! Withdrawal policy: time lock, per-transaction ceiling and fee
//!
//! Checks run in a fixed order so callers always see the same error for the
//! same situation:
//! 1. insufficient balance
//! 2. funds still locked
//! 3. per-transaction limit
//! 4. fee split (`net + fee == requested`)
//!
//! The per-transaction limit is a raw amount applied to every asset alike,
//! whatever its precision.

use ledger_types::numeric::percent_of;
use ledger_types::time::Timestamp;
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, LedgerError};

/// Result of a successful policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalQuote {
    /// Amount paid out to the user.
    pub net: u128,
    /// Amount retained by the ledger.
    pub fee: u128,
}

/// Validate a withdrawal request and split it into net amount and fee.
pub fn check_and_compute(
    balance: u128,
    requested: u128,
    last_deposit_at: Timestamp,
    now: Timestamp,
    lock_period_secs: i64,
    per_tx_limit: u128,
    fee_pct: u32,
) -> Result<WithdrawalQuote, LedgerError> {
    if requested > balance {
        return Err(LedgerError::InsufficientBalance {
            requested,
            available: balance,
        });
    }

    let unlock_time = last_deposit_at.saturating_add(lock_period_secs);
    if now < unlock_time {
        return Err(LedgerError::FundsLocked { unlock_time });
    }

    if requested > per_tx_limit {
        return Err(LedgerError::WithdrawalLimitExceeded {
            requested,
            limit: per_tx_limit,
        });
    }

    let fee = percent_of(requested, fee_pct).ok_or(LedgerError::Overflow {
        context: "withdrawal fee",
    })?;
    Ok(WithdrawalQuote {
        net: requested - fee,
        fee,
    })
}

/// Mutable withdrawal parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalPolicy {
    lock_period_secs: i64,
    per_tx_limit: u128,
    fee_pct: u32,
    max_fee_pct: u32,
}

impl WithdrawalPolicy {
    pub fn new(
        lock_period_secs: i64,
        per_tx_limit: u128,
        fee_pct: u32,
        max_fee_pct: u32,
    ) -> Result<Self, ConfigError> {
        if lock_period_secs < 0 {
            return Err(ConfigError::NegativeLockPeriod(lock_period_secs));
        }
        if max_fee_pct > 100 {
            return Err(ConfigError::CeilingAboveHundred(max_fee_pct));
        }
        if fee_pct > max_fee_pct {
            return Err(ConfigError::FeeAboveCeiling {
                fee: fee_pct,
                max: max_fee_pct,
            });
        }
        Ok(Self {
            lock_period_secs,
            per_tx_limit,
            fee_pct,
            max_fee_pct,
        })
    }

    /// Run [`check_and_compute`] with this policy's parameters.
    pub fn quote(
        &self,
        balance: u128,
        requested: u128,
        last_deposit_at: Timestamp,
        now: Timestamp,
    ) -> Result<WithdrawalQuote, LedgerError> {
        check_and_compute(
            balance,
            requested,
            last_deposit_at,
            now,
            self.lock_period_secs,
            self.per_tx_limit,
            self.fee_pct,
        )
    }

    /// Change the fee. Returns the previous value.
    pub fn set_fee_pct(&mut self, fee_pct: u32) -> Result<u32, LedgerError> {
        if fee_pct > self.max_fee_pct {
            return Err(LedgerError::FeeTooHigh {
                fee: fee_pct,
                max: self.max_fee_pct,
            });
        }
        Ok(std::mem::replace(&mut self.fee_pct, fee_pct))
    }

    /// Change the fee ceiling. Returns the previous value.
    pub fn set_max_fee_pct(&mut self, max_fee_pct: u32) -> Result<u32, LedgerError> {
        if max_fee_pct > 100 {
            return Err(ConfigError::CeilingAboveHundred(max_fee_pct).into());
        }
        if max_fee_pct < self.fee_pct {
            return Err(ConfigError::FeeAboveCeiling {
                fee: self.fee_pct,
                max: max_fee_pct,
            }
            .into());
        }
        Ok(std::mem::replace(&mut self.max_fee_pct, max_fee_pct))
    }

    pub fn lock_period_secs(&self) -> i64 {
        self.lock_period_secs
    }

    pub fn per_tx_limit(&self) -> u128 {
        self.per_tx_limit
    }

    pub fn fee_pct(&self) -> u32 {
        self.fee_pct
    }

    pub fn max_fee_pct(&self) -> u32 {
        self.max_fee_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: u128 = 1_000_000_000_000_000_000;
    const DAY: i64 = 86_400;
    const T0: Timestamp = 1_700_000_000;

    #[test]
    fn test_fee_split_142_5_and_7_5() {
        let quote = check_and_compute(1000 * UNIT, 150 * UNIT, T0, T0 + DAY, DAY, 200 * UNIT, 5)
            .unwrap();
        assert_eq!(quote.fee, 75 * UNIT / 10);
        assert_eq!(quote.net, 1425 * UNIT / 10);
    }

    #[test]
    fn test_limit_exceeded() {
        let err = check_and_compute(1000 * UNIT, 250 * UNIT, T0, T0 + DAY, DAY, 200 * UNIT, 5)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::WithdrawalLimitExceeded {
                requested: 250 * UNIT,
                limit: 200 * UNIT
            }
        );
    }

    #[test]
    fn test_locked_until_anchor_plus_period() {
        let err = check_and_compute(100, 10, T0, T0 + DAY - 1, DAY, 1000, 0).unwrap_err();
        assert_eq!(
            err,
            LedgerError::FundsLocked {
                unlock_time: T0 + DAY
            }
        );
        // Boundary: exactly at unlock time is allowed
        assert!(check_and_compute(100, 10, T0, T0 + DAY, DAY, 1000, 0).is_ok());
    }

    #[test]
    fn test_insufficient_checked_before_lock() {
        let err = check_and_compute(5, 10, T0, T0, DAY, 1000, 0).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_lock_checked_before_limit() {
        let err = check_and_compute(5000, 2000, T0, T0, DAY, 1000, 0).unwrap_err();
        assert!(matches!(err, LedgerError::FundsLocked { .. }));
    }

    #[test]
    fn test_policy_new_validation() {
        assert!(WithdrawalPolicy::new(DAY, 100, 1, 10).is_ok());
        assert_eq!(
            WithdrawalPolicy::new(-1, 100, 1, 10),
            Err(ConfigError::NegativeLockPeriod(-1))
        );
        assert_eq!(
            WithdrawalPolicy::new(DAY, 100, 11, 10),
            Err(ConfigError::FeeAboveCeiling { fee: 11, max: 10 })
        );
        assert_eq!(
            WithdrawalPolicy::new(DAY, 100, 1, 101),
            Err(ConfigError::CeilingAboveHundred(101))
        );
    }

    #[test]
    fn test_set_fee_respects_ceiling() {
        let mut policy = WithdrawalPolicy::new(DAY, 100, 1, 10).unwrap();
        assert_eq!(policy.set_fee_pct(5), Ok(1));
        assert_eq!(
            policy.set_fee_pct(11),
            Err(LedgerError::FeeTooHigh { fee: 11, max: 10 })
        );
        assert_eq!(policy.fee_pct(), 5);
    }

    #[test]
    fn test_set_max_fee() {
        let mut policy = WithdrawalPolicy::new(DAY, 100, 5, 10).unwrap();
        assert!(matches!(
            policy.set_max_fee_pct(4),
            Err(LedgerError::InvalidConfig(ConfigError::FeeAboveCeiling { .. }))
        ));
        assert!(matches!(
            policy.set_max_fee_pct(150),
            Err(LedgerError::InvalidConfig(ConfigError::CeilingAboveHundred(150)))
        ));
        assert_eq!(policy.set_max_fee_pct(20), Ok(10));
        assert_eq!(policy.set_fee_pct(20), Ok(5));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn net_plus_fee_is_requested(
                requested in 0u128..u128::MAX / 2,
                fee_pct in 0u32..=100,
            ) {
                let quote = check_and_compute(u128::MAX, requested, 0, 0, 0, u128::MAX, fee_pct).unwrap();
                prop_assert_eq!(quote.net + quote.fee, requested);
                prop_assert!(quote.fee <= requested);
            }

            #[test]
            fn locked_iff_before_unlock(
                anchor in 0i64..2_000_000_000,
                lock in 0i64..10_000_000,
                offset in -20_000_000i64..20_000_000,
            ) {
                let now = anchor + offset;
                let result = check_and_compute(10, 1, anchor, now, lock, 10, 0);
                let locked = matches!(result, Err(LedgerError::FundsLocked { .. }));
                prop_assert_eq!(locked, now < anchor + lock);
            }
        }
    }
}
