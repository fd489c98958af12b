//! Identifier types for ledger entities
//!
//! Participants and tokens are identified by opaque address strings, the way
//! they arrive from the custody layer. Events use UUID v7 so audit trails sort
//! chronologically.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Returns true for the empty string and for all-zero addresses (`0x0000…`).
fn is_zero_identifier(raw: &str) -> bool {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    digits.chars().all(|c| c == '0')
}

/// Identity of a ledger participant (account owner, administrator, fee recipient).
///
/// The zero address is reserved: it can never own an account or receive funds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty identity and the all-zero address.
    pub fn is_zero(&self) -> bool {
        is_zero_identifier(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Asset identifier
///
/// `Native` is the sentinel for the chain's base asset; every other asset is a
/// fungible token identified by its contract address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetId {
    Native,
    Token(String),
}

impl AssetId {
    pub fn token(address: impl Into<String>) -> Self {
        Self::Token(address.into())
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }

    /// A token whose address is empty or all zeroes, i.e. the native
    /// sentinel smuggled in through the token variant.
    pub fn is_zero_token(&self) -> bool {
        match self {
            Self::Native => false,
            Self::Token(address) => is_zero_identifier(address),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "NATIVE"),
            Self::Token(address) => write!(f, "{}", address),
        }
    }
}

/// Reference to an external price feed (e.g. "ETH/USD", "USDC/ETH").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceSourceId(String);

impl PriceSourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PriceSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PriceSourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for an emitted ledger event
///
/// Uses UUID v7 for time-based sorting of the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
