//! Ledger events
//!
//! Immutable records of completed state transitions. Events are emitted only
//! after an operation has fully succeeded, never for rejected or rolled back
//! operations.

use ledger_types::ids::{AssetId, EventId, PriceSourceId, UserId};
use ledger_types::numeric::UsdAmount;
use ledger_types::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Account opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreated {
    pub user: UserId,
}

/// Funds credited after a successful transfer-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposited {
    pub user: UserId,
    pub asset: AssetId,
    pub amount: u128,
    pub usd_value: UsdAmount,
    pub new_balance: u128,
}

/// Regular withdrawal paid out net of fee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawn {
    pub user: UserId,
    pub asset: AssetId,
    pub requested: u128,
    pub net: u128,
    pub fee: u128,
    pub usd_value: UsdAmount,
}

/// Whole balance returned, bypassing lock, limit and fee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyWithdrawn {
    pub user: UserId,
    pub asset: AssetId,
    pub amount: u128,
    pub usd_value: UsdAmount,
    pub initiated_by: UserId,
}

/// Accumulated fees sent to a recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeesSwept {
    pub asset: AssetId,
    pub to: UserId,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRegistered {
    pub asset: AssetId,
    pub decimals: u8,
    pub price_source: Option<PriceSourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUnregistered {
    pub asset: AssetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSourceRotated {
    pub asset: AssetId,
    pub previous: Option<PriceSourceId>,
    pub current: PriceSourceId,
}

/// Fee percentage or fee ceiling changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeUpdated {
    pub previous_pct: u32,
    pub current_pct: u32,
}

/// Enum wrapper for all ledger events, enabling uniform handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    AccountCreated(AccountCreated),
    Deposited(Deposited),
    Withdrawn(Withdrawn),
    EmergencyWithdrawn(EmergencyWithdrawn),
    FeesSwept(FeesSwept),
    AssetRegistered(AssetRegistered),
    AssetUnregistered(AssetUnregistered),
    PriceSourceRotated(PriceSourceRotated),
    WithdrawalFeeUpdated(FeeUpdated),
    MaxWithdrawalFeeUpdated(FeeUpdated),
    Paused { by: UserId },
    Unpaused { by: UserId },
}

/// An event stamped with its id, ledger sequence number and emission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub sequence: u64,
    pub emitted_at: Timestamp,
    pub event: LedgerEvent,
}

/// Fire-and-forget event consumer.
///
/// Sinks are called while the ledger lock is held and must not call back
/// into the ledger.
pub trait EventSink: Send + Sync {
    fn emit(&self, envelope: &EventEnvelope);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _envelope: &EventEnvelope) {}
}

/// Append-only in-memory event log.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Mutex<Vec<EventEnvelope>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every recorded envelope, oldest first.
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take every recorded envelope, leaving the log empty.
    pub fn drain(&self) -> Vec<EventEnvelope> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for EventLog {
    fn emit(&self, envelope: &EventEnvelope) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(sequence: u64, event: LedgerEvent) -> EventEnvelope {
        EventEnvelope {
            id: EventId::new(),
            sequence,
            emitted_at: 1_700_000_000,
            event,
        }
    }

    #[test]
    fn test_deposited_serialization() {
        let event = LedgerEvent::Deposited(Deposited {
            user: UserId::new("0xa11ce"),
            asset: AssetId::Native,
            amount: 5_000_000_000_000_000_000,
            usd_value: UsdAmount::from_dollars(10_000),
            new_balance: 5_000_000_000_000_000_000,
        });
        let json = serde_json::to_string(&envelope(1, event)).unwrap();
        let deser: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert!(matches!(deser.event, LedgerEvent::Deposited(ref d) if d.amount == 5_000_000_000_000_000_000));
    }

    #[test]
    fn test_withdrawn_serialization() {
        let event = Withdrawn {
            user: UserId::new("0xa11ce"),
            asset: AssetId::token("0xusdc"),
            requested: 150,
            net: 143,
            fee: 7,
            usd_value: UsdAmount::from_raw(150),
        };
        let json = serde_json::to_string(&event).unwrap();
        let deser: Withdrawn = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deser);
    }

    #[test]
    fn test_event_log_append_and_drain() {
        let log = EventLog::new();
        assert!(log.is_empty());
        log.emit(&envelope(1, LedgerEvent::Paused { by: UserId::new("ops") }));
        log.emit(&envelope(2, LedgerEvent::Unpaused { by: UserId::new("admin") }));
        assert_eq!(log.len(), 2);
        assert_eq!(log.events()[0].sequence, 1);

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_null_sink_accepts_events() {
        NullSink.emit(&envelope(1, LedgerEvent::Paused { by: UserId::new("ops") }));
    }
}
