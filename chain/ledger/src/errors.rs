//! Ledger error taxonomy
//!
//! Validation, business-rule, external-dependency and authorization failures.
//! Every error is reported synchronously and leaves no state change behind.

use ledger_types::ids::{AssetId, PriceSourceId, UserId};
use ledger_types::numeric::UsdAmount;
use thiserror::Error;

use crate::security::Role;

/// Engine-level errors returned by every ledger operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Unauthorized: {caller} lacks role {required:?}")]
    Unauthorized { caller: UserId, required: Role },

    #[error("Unauthorized: {caller} does not own account {owner}")]
    NotOwner { caller: UserId, owner: UserId },

    #[error("Ledger is paused")]
    Paused,

    #[error("Reentrant call rejected")]
    Reentrancy,

    #[error("Zero address is not a valid identity")]
    ZeroAddress,

    #[error("Amount must be positive")]
    ZeroAmount,

    #[error("Invalid asset: {asset}")]
    InvalidAsset { asset: AssetId },

    #[error("Unsupported asset: {asset}")]
    UnsupportedAsset { asset: AssetId },

    #[error("Account already exists: {user}")]
    AccountAlreadyExists { user: UserId },

    #[error("Account does not exist: {user}")]
    AccountDoesNotExist { user: UserId },

    #[error("Deposit of {amount} {asset} below minimum {minimum}")]
    BelowMinimumDeposit {
        asset: AssetId,
        amount: u128,
        minimum: u128,
    },

    #[error("Capacity exceeded: {requested} requested, {total} of {cap} in use")]
    CapacityExceeded {
        requested: UsdAmount,
        total: UsdAmount,
        cap: UsdAmount,
    },

    #[error("Funds locked until {unlock_time}")]
    FundsLocked { unlock_time: i64 },

    #[error("Withdrawal of {requested} exceeds per-transaction limit {limit}")]
    WithdrawalLimitExceeded { requested: u128, limit: u128 },

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u128, available: u128 },

    #[error("Withdrawal fee {fee}% exceeds ceiling {max}%")]
    FeeTooHigh { fee: u32, max: u32 },

    #[error("Invalid price: {0}")]
    InvalidPrice(#[from] OracleError),

    #[error("Transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Arithmetic overflow in {context}")]
    Overflow { context: &'static str },
}

/// Price rejections raised by the oracle adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("non-positive answer {answer} from {feed}")]
    NonPositive { feed: PriceSourceId, answer: i128 },

    #[error("stale answer from {feed}: updated at {updated_at}, now {now}, max age {max_age}s")]
    Stale {
        feed: PriceSourceId,
        updated_at: i64,
        now: i64,
        max_age: i64,
    },

    #[error("answer from {feed} is timestamped in the future ({updated_at} > {now})")]
    FromFuture {
        feed: PriceSourceId,
        updated_at: i64,
        now: i64,
    },

    #[error("unsupported precision {decimals} reported by {feed}")]
    UnsupportedDecimals { feed: PriceSourceId, decimals: u8 },

    #[error("no price source configured for {asset}")]
    MissingSource { asset: AssetId },

    #[error("feed {feed} failed: {reason}")]
    Feed { feed: PriceSourceId, reason: FeedError },
}

/// Failures reported by the external price feed collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("unknown price source")]
    UnknownSource,

    #[error("feed unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by the asset transfer collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("transfer rejected: {reason}")]
    Rejected { reason: String },

    #[error("transfer collaborator unavailable")]
    Unavailable,
}

/// Configuration validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bank cap must be positive")]
    ZeroCap,

    #[error("minimum deposit {minimum} exceeds bank cap {cap}")]
    MinimumAboveCap { minimum: UsdAmount, cap: UsdAmount },

    #[error("lock period must be non-negative, got {0}s")]
    NegativeLockPeriod(i64),

    #[error("withdrawal fee {fee}% exceeds ceiling {max}%")]
    FeeAboveCeiling { fee: u32, max: u32 },

    #[error("fee ceiling {0}% exceeds 100%")]
    CeilingAboveHundred(u32),

    #[error("maximum price age must be positive, got {0}s")]
    NonPositivePriceAge(i64),

    #[error("configured bank cap {configured} differs from persisted cap {persisted}")]
    CapMismatch {
        configured: UsdAmount,
        persisted: UsdAmount,
    },
}
