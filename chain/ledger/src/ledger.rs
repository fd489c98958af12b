//! Account ledger: per-(user, asset) balances and per-user counters
//!
//! Accounts are created once and never deleted. Balances appear implicitly on
//! first credit and are zeroed in place, never removed, so the key set only
//! grows. Keys are a flat `(UserId, AssetId)` pair in an ordered map, which
//! keeps iteration and snapshots deterministic.

use ledger_types::ids::{AssetId, UserId};
use ledger_types::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::LedgerError;

/// Holding of one asset by one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Native units of the asset.
    pub amount: u128,
    /// Lock anchor; every deposit resets it.
    pub last_deposit_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub created_at: Timestamp,
    pub deposit_count: u64,
    pub withdrawal_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLedger {
    accounts: BTreeMap<UserId, AccountRecord>,
    balances: BTreeMap<(UserId, AssetId), Balance>,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // ───────────────────────── Accounts ─────────────────────────

    pub fn create_account(&mut self, user: &UserId, now: Timestamp) -> Result<(), LedgerError> {
        if user.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        if self.accounts.contains_key(user) {
            return Err(LedgerError::AccountAlreadyExists { user: user.clone() });
        }
        self.accounts.insert(
            user.clone(),
            AccountRecord {
                created_at: now,
                deposit_count: 0,
                withdrawal_count: 0,
            },
        );
        Ok(())
    }

    pub fn ensure_exists(&self, user: &UserId) -> Result<(), LedgerError> {
        self.account(user).map(|_| ())
    }

    pub fn account(&self, user: &UserId) -> Result<&AccountRecord, LedgerError> {
        self.accounts
            .get(user)
            .ok_or_else(|| LedgerError::AccountDoesNotExist { user: user.clone() })
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    // ───────────────────────── Balances ─────────────────────────

    /// Balance of `asset`, zero if the account never held it.
    pub fn get_balance(&self, user: &UserId, asset: &AssetId) -> Result<u128, LedgerError> {
        self.balance_record(user, asset).map(|b| b.amount)
    }

    /// Full balance record, including the lock anchor.
    pub fn balance_record(&self, user: &UserId, asset: &AssetId) -> Result<Balance, LedgerError> {
        self.ensure_exists(user)?;
        Ok(self
            .balances
            .get(&(user.clone(), asset.clone()))
            .copied()
            .unwrap_or_default())
    }

    /// Every (asset, balance) pair held by `user`, in asset order.
    pub fn balances_of(&self, user: &UserId) -> Result<Vec<(AssetId, Balance)>, LedgerError> {
        self.ensure_exists(user)?;
        Ok(self
            .balances
            .iter()
            .filter(|((owner, _), _)| owner == user)
            .map(|((_, asset), balance)| (asset.clone(), *balance))
            .collect())
    }

    // ───────────────────────── Mutations ─────────────────────────

    /// Add `amount`, stamp the lock anchor and bump the deposit counter.
    ///
    /// Returns the new balance.
    pub fn credit(
        &mut self,
        user: &UserId,
        asset: &AssetId,
        amount: u128,
        now: Timestamp,
    ) -> Result<u128, LedgerError> {
        let record = self
            .accounts
            .get_mut(user)
            .ok_or_else(|| LedgerError::AccountDoesNotExist { user: user.clone() })?;
        let deposit_count = record
            .deposit_count
            .checked_add(1)
            .ok_or(LedgerError::Overflow {
                context: "deposit counter",
            })?;

        let balance = self
            .balances
            .entry((user.clone(), asset.clone()))
            .or_default();
        let new_amount = balance.amount.checked_add(amount).ok_or(LedgerError::Overflow {
            context: "balance credit",
        })?;

        balance.amount = new_amount;
        balance.last_deposit_at = now;
        record.deposit_count = deposit_count;
        Ok(new_amount)
    }

    /// Subtract `amount` and bump the withdrawal counter.
    ///
    /// Returns the new balance.
    pub fn debit(
        &mut self,
        user: &UserId,
        asset: &AssetId,
        amount: u128,
    ) -> Result<u128, LedgerError> {
        let record = self
            .accounts
            .get_mut(user)
            .ok_or_else(|| LedgerError::AccountDoesNotExist { user: user.clone() })?;
        let key = (user.clone(), asset.clone());
        let available = self.balances.get(&key).map_or(0, |b| b.amount);
        if amount > available {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        let withdrawal_count =
            record
                .withdrawal_count
                .checked_add(1)
                .ok_or(LedgerError::Overflow {
                    context: "withdrawal counter",
                })?;

        let remaining = available - amount;
        if let Some(balance) = self.balances.get_mut(&key) {
            balance.amount = remaining;
        }
        record.withdrawal_count = withdrawal_count;
        Ok(remaining)
    }

    /// Read the balance, clear it in place and return what was read.
    ///
    /// Counters and the lock anchor are left untouched.
    pub fn zero_out(&mut self, user: &UserId, asset: &AssetId) -> Result<u128, LedgerError> {
        self.ensure_exists(user)?;
        Ok(self
            .balances
            .get_mut(&(user.clone(), asset.clone()))
            .map_or(0, |balance| std::mem::take(&mut balance.amount)))
    }

    // ───────────────────────── Checkpoint support ─────────────────────────

    pub(crate) fn raw_balance(&self, user: &UserId, asset: &AssetId) -> Option<Balance> {
        self.balances.get(&(user.clone(), asset.clone())).copied()
    }

    pub(crate) fn restore_account(&mut self, user: UserId, record: AccountRecord) {
        self.accounts.insert(user, record);
    }

    pub(crate) fn restore_balance(&mut self, user: UserId, asset: AssetId, balance: Option<Balance>) {
        match balance {
            Some(balance) => {
                self.balances.insert((user, asset), balance);
            }
            None => {
                self.balances.remove(&(user, asset));
            }
        }
    }
}
