//! Asset transfer collaborator
//!
//! The ledger never moves value itself. Each operation calls the collaborator
//! at most once and treats any error as "nothing moved".

use ledger_types::ids::{AssetId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::errors::TransferError;

pub trait AssetTransfer: Send + Sync {
    /// Pull `amount` of `asset` from `from` into custody.
    fn transfer_in(&self, from: &UserId, asset: &AssetId, amount: u128) -> Result<(), TransferError>;

    /// Push `amount` of `asset` out of custody to `to`.
    fn transfer_out(&self, to: &UserId, asset: &AssetId, amount: u128) -> Result<(), TransferError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
}

/// A transfer the collaborator accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub direction: Direction,
    pub counterparty: UserId,
    pub asset: AssetId,
    pub amount: u128,
}

/// In-process transfer collaborator that records accepted transfers and can
/// be told to reject either direction.
#[derive(Debug, Default)]
pub struct InMemoryTransfer {
    records: Mutex<Vec<TransferRecord>>,
    reject_in: AtomicBool,
    reject_out: AtomicBool,
}

impl InMemoryTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reject_in(&self, reject: bool) {
        self.reject_in.store(reject, Ordering::SeqCst);
    }

    pub fn set_reject_out(&self, reject: bool) {
        self.reject_out.store(reject, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<TransferRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Net amount of `asset` currently in custody according to accepted transfers.
    pub fn custody_balance(&self, asset: &AssetId) -> i128 {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| &r.asset == asset)
            .fold(0i128, |acc, r| {
                let amount = i128::try_from(r.amount).unwrap_or(i128::MAX);
                match r.direction {
                    Direction::In => acc.saturating_add(amount),
                    Direction::Out => acc.saturating_sub(amount),
                }
            })
    }

    fn record(
        &self,
        direction: Direction,
        counterparty: &UserId,
        asset: &AssetId,
        amount: u128,
    ) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TransferRecord {
                direction,
                counterparty: counterparty.clone(),
                asset: asset.clone(),
                amount,
            });
    }
}

impl AssetTransfer for InMemoryTransfer {
    fn transfer_in(&self, from: &UserId, asset: &AssetId, amount: u128) -> Result<(), TransferError> {
        if self.reject_in.load(Ordering::SeqCst) {
            return Err(TransferError::Rejected {
                reason: format!("inbound transfer from {from} refused"),
            });
        }
        self.record(Direction::In, from, asset, amount);
        Ok(())
    }

    fn transfer_out(&self, to: &UserId, asset: &AssetId, amount: u128) -> Result<(), TransferError> {
        if self.reject_out.load(Ordering::SeqCst) {
            return Err(TransferError::Rejected {
                reason: format!("outbound transfer to {to} refused"),
            });
        }
        self.record(Direction::Out, to, asset, amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_accepted_transfers() {
        let transfer = InMemoryTransfer::new();
        let alice = UserId::new("0xa11ce");
        transfer.transfer_in(&alice, &AssetId::Native, 100).unwrap();
        transfer.transfer_out(&alice, &AssetId::Native, 30).unwrap();

        assert_eq!(transfer.records().len(), 2);
        assert_eq!(transfer.custody_balance(&AssetId::Native), 70);
        assert_eq!(transfer.custody_balance(&AssetId::token("0xusdc")), 0);
    }

    #[test]
    fn test_rejection_toggles() {
        let transfer = InMemoryTransfer::new();
        let alice = UserId::new("0xa11ce");
        transfer.set_reject_out(true);
        assert!(matches!(
            transfer.transfer_out(&alice, &AssetId::Native, 1),
            Err(TransferError::Rejected { .. })
        ));
        assert!(transfer.transfer_in(&alice, &AssetId::Native, 1).is_ok());

        transfer.set_reject_in(true);
        assert!(transfer.transfer_in(&alice, &AssetId::Native, 1).is_err());
        assert_eq!(transfer.records().len(), 1);
    }
}
