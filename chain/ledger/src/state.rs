//! Mutable ledger state and per-operation checkpoints
//!
//! Everything a transition can change lives in [`LedgerState`], behind the
//! engine's single mutex. Before a transition mutates anything it takes a
//! [`Checkpoint`] of exactly the entries it may touch; if the external
//! transfer then fails, restoring the checkpoint puts those entries back.

use ledger_types::ids::{AssetId, UserId};
use ledger_types::numeric::UsdAmount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::capacity::CapacityGuard;
use crate::config::LedgerConfig;
use crate::errors::{ConfigError, LedgerError};
use crate::ledger::{AccountLedger, AccountRecord, Balance};
use crate::policy::WithdrawalPolicy;
use crate::registry::AssetRegistry;
use crate::security::PauseGuard;

/// Ledger-wide monotonic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalCounters {
    pub deposits: u64,
    pub withdrawals: u64,
    /// Sequence number of the last emitted event.
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub(crate) registry: AssetRegistry,
    pub(crate) accounts: AccountLedger,
    pub(crate) capacity: CapacityGuard,
    pub(crate) policy: WithdrawalPolicy,
    pub(crate) counters: GlobalCounters,
    pub(crate) fees: BTreeMap<AssetId, u128>,
    pub(crate) pause: PauseGuard,
}

impl LedgerState {
    pub fn new(config: &LedgerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            registry: AssetRegistry::new(config.native_usd_source.clone()),
            accounts: AccountLedger::new(),
            capacity: CapacityGuard::new(config.bank_cap_usd),
            policy: config.withdrawal_policy()?,
            counters: GlobalCounters::default(),
            fees: BTreeMap::new(),
            pause: PauseGuard::new(),
        })
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn accounts(&self) -> &AccountLedger {
        &self.accounts
    }

    pub fn capacity(&self) -> &CapacityGuard {
        &self.capacity
    }

    pub fn policy(&self) -> &WithdrawalPolicy {
        &self.policy
    }

    pub fn counters(&self) -> GlobalCounters {
        self.counters
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn accumulated_fees(&self, asset: &AssetId) -> u128 {
        self.fees.get(asset).copied().unwrap_or(0)
    }

    pub fn total_deposits_usd(&self) -> UsdAmount {
        self.capacity.total()
    }

    // ───────────────────────── Counters & fees ─────────────────────────

    pub(crate) fn count_deposit(&mut self) -> Result<(), LedgerError> {
        self.counters.deposits = self
            .counters
            .deposits
            .checked_add(1)
            .ok_or(LedgerError::Overflow {
                context: "global deposit counter",
            })?;
        Ok(())
    }

    pub(crate) fn count_withdrawal(&mut self) -> Result<(), LedgerError> {
        self.counters.withdrawals =
            self.counters
                .withdrawals
                .checked_add(1)
                .ok_or(LedgerError::Overflow {
                    context: "global withdrawal counter",
                })?;
        Ok(())
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.counters.sequence = self.counters.sequence.wrapping_add(1);
        self.counters.sequence
    }

    pub(crate) fn accrue_fee(&mut self, asset: &AssetId, fee: u128) -> Result<(), LedgerError> {
        if fee == 0 {
            return Ok(());
        }
        let entry = self.fees.entry(asset.clone()).or_insert(0);
        *entry = entry.checked_add(fee).ok_or(LedgerError::Overflow {
            context: "fee accumulator",
        })?;
        Ok(())
    }

    /// Reset the fee counter of `asset` and return what it held.
    pub(crate) fn take_fees(&mut self, asset: &AssetId) -> u128 {
        self.fees.remove(asset).unwrap_or(0)
    }

    // ───────────────────────── Checkpoints ─────────────────────────

    /// Snapshot the entries an operation on `(user, asset)` may touch.
    pub(crate) fn checkpoint(&self, user: &UserId, asset: &AssetId) -> Checkpoint {
        Checkpoint {
            account: self
                .accounts
                .account(user)
                .ok()
                .map(|record| (user.clone(), *record)),
            balance: (
                (user.clone(), asset.clone()),
                self.accounts.raw_balance(user, asset),
            ),
            capacity: self.capacity,
            counters: self.counters,
            fee: (asset.clone(), self.fees.get(asset).copied()),
        }
    }

    /// Put back everything captured by `checkpoint`.
    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) {
        let Checkpoint {
            account,
            balance: ((user, asset), balance),
            capacity,
            counters,
            fee: (fee_asset, fee),
        } = checkpoint;

        if let Some((owner, record)) = account {
            self.accounts.restore_account(owner, record);
        }
        self.accounts.restore_balance(user, asset, balance);
        self.capacity = capacity;
        self.counters = counters;
        match fee {
            Some(amount) => {
                self.fees.insert(fee_asset, amount);
            }
            None => {
                self.fees.remove(&fee_asset);
            }
        }
    }
}

/// Pre-mutation copy of the entries touched by one operation.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    account: Option<(UserId, AccountRecord)>,
    balance: ((UserId, AssetId), Option<Balance>),
    capacity: CapacityGuard,
    counters: GlobalCounters,
    fee: (AssetId, Option<u128>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> LedgerState {
        LedgerState::new(&LedgerConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = LedgerConfig {
            bank_cap_usd: UsdAmount::ZERO,
            ..Default::default()
        };
        assert_eq!(LedgerState::new(&config), Err(ConfigError::ZeroCap));
    }

    #[test]
    fn test_checkpoint_restore_round_trip() {
        let mut state = state();
        let alice = UserId::new("0xa11ce");
        state.accounts.create_account(&alice, 0).unwrap();
        state.accounts.credit(&alice, &AssetId::Native, 100, 0).unwrap();
        let before = state.clone();

        let checkpoint = state.checkpoint(&alice, &AssetId::Native);
        state.accounts.debit(&alice, &AssetId::Native, 40).unwrap();
        state.capacity.reserve(UsdAmount::from_dollars(5)).unwrap();
        state.accrue_fee(&AssetId::Native, 3).unwrap();
        state.count_withdrawal().unwrap();
        assert_ne!(state, before);

        state.restore(checkpoint);
        assert_eq!(state, before);
    }

    #[test]
    fn test_restore_removes_first_balance() {
        let mut state = state();
        let alice = UserId::new("0xa11ce");
        state.accounts.create_account(&alice, 0).unwrap();
        let before = state.clone();

        let checkpoint = state.checkpoint(&alice, &AssetId::Native);
        state.accounts.credit(&alice, &AssetId::Native, 100, 10).unwrap();
        state.count_deposit().unwrap();
        state.restore(checkpoint);

        assert_eq!(state, before);
        assert!(state.accounts.balances_of(&alice).unwrap().is_empty());
    }

    #[test]
    fn test_take_fees_resets() {
        let mut state = state();
        state.accrue_fee(&AssetId::Native, 7).unwrap();
        state.accrue_fee(&AssetId::Native, 0).unwrap();
        assert_eq!(state.accumulated_fees(&AssetId::Native), 7);
        assert_eq!(state.take_fees(&AssetId::Native), 7);
        assert_eq!(state.accumulated_fees(&AssetId::Native), 0);
    }

    #[test]
    fn test_state_bincode_round_trip() {
        let mut state = state();
        let alice = UserId::new("0xa11ce");
        state.accounts.create_account(&alice, 0).unwrap();
        state.accounts.credit(&alice, &AssetId::token("0xusdc"), 5, 1).unwrap();
        state.pause.pause();

        let bytes = bincode::serialize(&state).unwrap();
        let decoded: LedgerState = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, state);
    }
}
