//! Multi-Asset Custodial Ledger
//!
//! Accepts deposits of the native asset and registered tokens, keeps
//! per-user, per-asset balances, values them in a common 6-decimal USD unit
//! through price oracles, caps the total value held and gates withdrawals
//! behind a time lock, a per-transaction ceiling and a proportional fee.
//!
//! # Modules
//! - `registry`: Accepted assets, their precision and price sources
//! - `oracle`: Price feed adapter with freshness and positivity checks
//! - `converter`: Fixed-point conversion to and from the USD unit
//! - `ledger`: Per-(user, asset) balances and per-user counters
//! - `capacity`: Global USD capacity cap
//! - `policy`: Withdrawal lock, limit and fee
//! - `engine`: Orchestrator for deposits, withdrawals, administration and queries
//! - `state`: Mutable state and per-operation checkpoints
//! - `snapshot`: Durable, checksummed state snapshots
//! - `security`: Caller context, roles, pause switch, re-entry detection
//! - `transfer`: Asset transfer collaborator
//! - `events`: Ledger events and sinks
//! - `config`: Engine configuration
//! - `errors`: Error types
//!
//! # Version
//! v0.1.0

pub mod capacity;
pub mod config;
pub mod converter;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod oracle;
pub mod policy;
pub mod registry;
pub mod security;
pub mod snapshot;
pub mod state;
pub mod transfer;

pub use config::LedgerConfig;
pub use engine::{Collaborators, LedgerEngine};
pub use errors::{ConfigError, FeedError, LedgerError, OracleError, TransferError};
pub use security::{AccessControl, Caller, Role};

/// Snapshot wire format and event schema version, bumped on breaking change
pub const LEDGER_FORMAT_VERSION: &str = "1.0.0";
