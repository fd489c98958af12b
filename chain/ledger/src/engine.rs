//! Ledger engine: orchestrates deposits, withdrawals and administration
//!
//! Every operation follows the same shape:
//! 1. authorization, before anything else
//! 2. enter the critical section (same-thread re-entry fails with `Reentrancy`)
//! 3. validation and valuation, read-only
//! 4. checkpoint, mutate, then call the transfer collaborator
//! 5. on transfer failure restore the checkpoint; on success emit the event
//!
//! All mutable state sits behind one mutex, so transitions are serialized
//! across threads.

use ledger_types::ids::{AssetId, EventId, PriceSourceId, UserId};
use ledger_types::numeric::UsdAmount;
use ledger_types::time::{Clock, SystemClock, Timestamp};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::converter::{from_canonical_usd, scale_from_canonical, to_canonical_usd};
use crate::errors::{ConfigError, LedgerError, TransferError};
use crate::events::{
    AccountCreated, AssetRegistered, AssetUnregistered, Deposited, EmergencyWithdrawn,
    EventEnvelope, EventSink, FeeUpdated, FeesSwept, LedgerEvent, NullSink, PriceSourceRotated,
    Withdrawn,
};
use crate::ledger::Balance;
use crate::oracle::{PriceFeed, PriceOracleAdapter};
use crate::registry::{AssetConfig, Registration};
use crate::security::{next_engine_id, Caller, ReentrancyGuard, Role};
use crate::snapshot::{LedgerSnapshot, SnapshotError};
use crate::state::{Checkpoint, GlobalCounters, LedgerState};
use crate::transfer::AssetTransfer;

/// External collaborators the engine is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub feed: Arc<dyn PriceFeed>,
    pub transfer: Arc<dyn AssetTransfer>,
    pub events: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Price feed and transfer collaborator, no event sink, wall clock.
    pub fn new(feed: Arc<dyn PriceFeed>, transfer: Arc<dyn AssetTransfer>) -> Self {
        Self {
            feed,
            transfer,
            events: Arc::new(NullSink),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Exclusive access to the state for one operation.
struct Session<'a> {
    state: MutexGuard<'a, LedgerState>,
    _reentry: ReentrancyGuard,
}

impl Deref for Session<'_> {
    type Target = LedgerState;

    fn deref(&self) -> &LedgerState {
        &self.state
    }
}

impl DerefMut for Session<'_> {
    fn deref_mut(&mut self) -> &mut LedgerState {
        &mut self.state
    }
}

/// Apply `mutate`, then `transfer`; restore `checkpoint` if either fails.
fn commit<T>(
    state: &mut LedgerState,
    checkpoint: Checkpoint,
    mutate: impl FnOnce(&mut LedgerState) -> Result<T, LedgerError>,
    transfer: impl FnOnce() -> Result<(), TransferError>,
) -> Result<T, LedgerError> {
    let outcome = mutate(state).and_then(|value| {
        transfer()?;
        Ok(value)
    });
    if outcome.is_err() {
        state.restore(checkpoint);
    }
    outcome
}

pub struct LedgerEngine {
    id: u64,
    config: LedgerConfig,
    state: Mutex<LedgerState>,
    oracle: PriceOracleAdapter,
    transfer: Arc<dyn AssetTransfer>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl LedgerEngine {
    pub fn new(config: LedgerConfig, collaborators: Collaborators) -> Result<Self, LedgerError> {
        let state = LedgerState::new(&config)?;
        info!(
            cap = %config.bank_cap_usd,
            min_deposit = %config.min_deposit_usd,
            fee_pct = config.withdrawal_fee_pct,
            "ledger engine created"
        );
        Ok(Self::assemble(config, collaborators, state))
    }

    /// Rebuild an engine from a verified snapshot.
    ///
    /// The bank cap is fixed for a ledger's lifetime and must match the
    /// configuration. Withdrawal policy parameters come from the snapshot.
    pub fn from_snapshot(
        config: LedgerConfig,
        collaborators: Collaborators,
        snapshot: LedgerSnapshot,
    ) -> Result<Self, SnapshotError> {
        snapshot.verify()?;
        config.validate()?;

        let sequence = snapshot.sequence;
        let mut state = snapshot.state;
        if state.capacity.cap() != config.bank_cap_usd {
            return Err(ConfigError::CapMismatch {
                configured: config.bank_cap_usd,
                persisted: state.capacity.cap(),
            }
            .into());
        }
        if state.registry.native_usd_source() != &config.native_usd_source {
            info!(
                persisted = %state.registry.native_usd_source(),
                configured = %config.native_usd_source,
                "native price source replaced from configuration"
            );
            state
                .registry
                .set_native_usd_source(config.native_usd_source.clone());
        }

        info!(
            sequence,
            total = %state.capacity.total(),
            accounts = state.accounts.account_count(),
            "ledger engine restored from snapshot"
        );
        Ok(Self::assemble(config, collaborators, state))
    }

    fn assemble(config: LedgerConfig, collaborators: Collaborators, state: LedgerState) -> Self {
        let oracle = PriceOracleAdapter::new(
            collaborators.feed,
            config.native_usd_source.clone(),
            config.max_price_age_secs,
        );
        Self {
            id: next_engine_id(),
            config,
            state: Mutex::new(state),
            oracle,
            transfer: collaborators.transfer,
            events: collaborators.events,
            clock: collaborators.clock,
        }
    }

    /// Capture the full state.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, SnapshotError> {
        let state = self.session()?.clone();
        LedgerSnapshot::new(state, self.clock.now())
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ───────────────────────── Internals ─────────────────────────

    fn session(&self) -> Result<Session<'_>, LedgerError> {
        let reentry = ReentrancyGuard::enter(self.id)?;
        // Transitions restore their checkpoint before returning an error, so
        // state behind a poisoned lock is still consistent.
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Session {
            state,
            _reentry: reentry,
        })
    }

    fn read<T>(&self, f: impl FnOnce(&LedgerState) -> Result<T, LedgerError>) -> Result<T, LedgerError> {
        let session = self.session()?;
        f(&session)
    }

    fn value(&self, config: &AssetConfig, amount: u128, now: Timestamp) -> Result<UsdAmount, LedgerError> {
        to_canonical_usd(&self.oracle, config, amount, now).map_err(|err| {
            if let LedgerError::InvalidPrice(reason) = &err {
                warn!(asset = %config.asset, amount, %reason, "price rejected");
            }
            err
        })
    }

    fn emit(&self, state: &mut LedgerState, now: Timestamp, event: LedgerEvent) {
        let envelope = EventEnvelope {
            id: EventId::new(),
            sequence: state.next_sequence(),
            emitted_at: now,
            event,
        };
        self.events.emit(&envelope);
    }

    fn log_rollback(operation: &'static str, user: &UserId, asset: &AssetId, err: &LedgerError) {
        if let LedgerError::TransferFailed(reason) = err {
            warn!(operation, user = %user, asset = %asset, %reason, "transfer failed, state rolled back");
        }
    }

    // ───────────────────────── Accounts ─────────────────────────

    /// Open an account for `user`. Callable by the user or an Admin.
    pub fn create_account(&self, caller: &Caller, user: &UserId) -> Result<(), LedgerError> {
        caller.require_owner_or(user, Role::Admin)?;
        let mut session = self.session()?;
        let state = &mut *session;
        let now = self.clock.now();

        state.accounts.create_account(user, now)?;
        info!(user = %user, "account created");
        self.emit(
            state,
            now,
            LedgerEvent::AccountCreated(AccountCreated { user: user.clone() }),
        );
        Ok(())
    }

    // ───────────────────────── Deposit ─────────────────────────

    /// Credit `amount` of `asset` to `user` after pulling it into custody.
    pub fn deposit(
        &self,
        caller: &Caller,
        user: &UserId,
        asset: &AssetId,
        amount: u128,
    ) -> Result<Deposited, LedgerError> {
        caller.require_owner(user)?;
        let mut session = self.session()?;
        let state = &mut *session;

        state.pause.ensure_not_paused()?;
        state.accounts.ensure_exists(user)?;
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let config = state.registry.resolve(asset)?;
        let minimum = scale_from_canonical(self.config.min_deposit_usd, config.decimals)?;
        if amount < minimum {
            return Err(LedgerError::BelowMinimumDeposit {
                asset: asset.clone(),
                amount,
                minimum,
            });
        }

        let now = self.clock.now();
        let usd_value = self.value(&config, amount, now)?;

        let checkpoint = state.checkpoint(user, asset);
        let new_balance = commit(
            state,
            checkpoint,
            |s| {
                s.capacity.reserve(usd_value)?;
                let balance = s.accounts.credit(user, asset, amount, now)?;
                s.count_deposit()?;
                Ok(balance)
            },
            || self.transfer.transfer_in(user, asset, amount),
        )
        .map_err(|err| {
            Self::log_rollback("deposit", user, asset, &err);
            err
        })?;

        info!(
            user = %user,
            asset = %asset,
            amount,
            usd = %usd_value,
            total = %state.capacity.total(),
            "deposit credited"
        );
        let event = Deposited {
            user: user.clone(),
            asset: asset.clone(),
            amount,
            usd_value,
            new_balance,
        };
        self.emit(state, now, LedgerEvent::Deposited(event.clone()));
        Ok(event)
    }

    // ───────────────────────── Withdrawal ─────────────────────────

    /// Withdraw `amount` of `asset`, paying out the amount net of fee.
    pub fn withdraw(
        &self,
        caller: &Caller,
        user: &UserId,
        asset: &AssetId,
        amount: u128,
    ) -> Result<Withdrawn, LedgerError> {
        caller.require_owner(user)?;
        let mut session = self.session()?;
        let state = &mut *session;

        state.pause.ensure_not_paused()?;
        let balance = state.accounts.balance_record(user, asset)?;
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let config = state.registry.lookup(asset)?;
        let now = self.clock.now();
        let quote = state
            .policy
            .quote(balance.amount, amount, balance.last_deposit_at, now)?;
        let usd_value = self.value(&config, amount, now)?;

        let checkpoint = state.checkpoint(user, asset);
        commit(
            state,
            checkpoint,
            |s| {
                s.accounts.debit(user, asset, amount)?;
                s.capacity.release(usd_value);
                s.accrue_fee(asset, quote.fee)?;
                s.count_withdrawal()
            },
            || self.transfer.transfer_out(user, asset, quote.net),
        )
        .map_err(|err| {
            Self::log_rollback("withdraw", user, asset, &err);
            err
        })?;

        info!(
            user = %user,
            asset = %asset,
            requested = amount,
            net = quote.net,
            fee = quote.fee,
            usd = %usd_value,
            "withdrawal paid"
        );
        let event = Withdrawn {
            user: user.clone(),
            asset: asset.clone(),
            requested: amount,
            net: quote.net,
            fee: quote.fee,
            usd_value,
        };
        self.emit(state, now, LedgerEvent::Withdrawn(event.clone()));
        Ok(event)
    }

    /// Return the whole balance of `asset` to `user`, bypassing lock, limit
    /// and fee. Available to the owner or an Emergency operator, also while
    /// paused. A zero balance is a no-op.
    pub fn emergency_withdraw(
        &self,
        caller: &Caller,
        user: &UserId,
        asset: &AssetId,
    ) -> Result<Option<EmergencyWithdrawn>, LedgerError> {
        caller.require_owner_or(user, Role::Emergency)?;
        let mut session = self.session()?;
        let state = &mut *session;

        let balance = state.accounts.get_balance(user, asset)?;
        if balance == 0 {
            debug!(user = %user, asset = %asset, "emergency withdrawal of empty balance ignored");
            return Ok(None);
        }
        let config = state.registry.lookup(asset)?;
        let now = self.clock.now();
        let usd_value = self.value(&config, balance, now)?;

        let checkpoint = state.checkpoint(user, asset);
        let amount = commit(
            state,
            checkpoint,
            |s| {
                let amount = s.accounts.zero_out(user, asset)?;
                s.capacity.release(usd_value);
                Ok(amount)
            },
            || self.transfer.transfer_out(user, asset, balance),
        )
        .map_err(|err| {
            Self::log_rollback("emergency_withdraw", user, asset, &err);
            err
        })?;

        info!(
            user = %user,
            asset = %asset,
            amount,
            usd = %usd_value,
            initiated_by = %caller.id(),
            "emergency withdrawal paid"
        );
        let event = EmergencyWithdrawn {
            user: user.clone(),
            asset: asset.clone(),
            amount,
            usd_value,
            initiated_by: caller.id().clone(),
        };
        self.emit(state, now, LedgerEvent::EmergencyWithdrawn(event.clone()));
        Ok(Some(event))
    }

    // ───────────────────────── Administration ─────────────────────────

    pub fn register_asset(
        &self,
        caller: &Caller,
        asset: AssetId,
        decimals: u8,
        is_native: bool,
        price_source: Option<PriceSourceId>,
    ) -> Result<Registration, LedgerError> {
        caller.require_role(Role::Admin)?;
        let mut session = self.session()?;
        let state = &mut *session;

        let outcome = state
            .registry
            .register(asset.clone(), decimals, is_native, price_source)?;
        if outcome == Registration::AlreadyPresent {
            debug!(asset = %asset, "asset already registered");
            return Ok(outcome);
        }

        let config = state.registry.lookup(&asset)?;
        info!(asset = %asset, decimals = config.decimals, ?outcome, "asset registered");
        self.emit(
            state,
            self.clock.now(),
            LedgerEvent::AssetRegistered(AssetRegistered {
                asset,
                decimals: config.decimals,
                price_source: config.price_source,
            }),
        );
        Ok(outcome)
    }

    /// Stop accepting deposits of `asset`. Existing balances stay withdrawable.
    pub fn unregister_asset(&self, caller: &Caller, asset: &AssetId) -> Result<bool, LedgerError> {
        caller.require_role(Role::Admin)?;
        let mut session = self.session()?;
        let state = &mut *session;

        let changed = state.registry.unregister(asset)?;
        if changed {
            info!(asset = %asset, "asset unregistered");
            self.emit(
                state,
                self.clock.now(),
                LedgerEvent::AssetUnregistered(AssetUnregistered {
                    asset: asset.clone(),
                }),
            );
        }
        Ok(changed)
    }

    pub fn rotate_price_source(
        &self,
        caller: &Caller,
        asset: &AssetId,
        price_source: PriceSourceId,
    ) -> Result<Option<PriceSourceId>, LedgerError> {
        caller.require_role(Role::Admin)?;
        let mut session = self.session()?;
        let state = &mut *session;

        let previous = state
            .registry
            .rotate_price_source(asset, price_source.clone())?;
        info!(asset = %asset, source = %price_source, "price source rotated");
        self.emit(
            state,
            self.clock.now(),
            LedgerEvent::PriceSourceRotated(PriceSourceRotated {
                asset: asset.clone(),
                previous: previous.clone(),
                current: price_source,
            }),
        );
        Ok(previous)
    }

    /// Set the withdrawal fee percentage. Returns the previous value.
    pub fn set_withdrawal_fee(&self, caller: &Caller, fee_pct: u32) -> Result<u32, LedgerError> {
        caller.require_role(Role::Admin)?;
        let mut session = self.session()?;
        let state = &mut *session;

        let previous = state.policy.set_fee_pct(fee_pct)?;
        info!(previous, current = fee_pct, "withdrawal fee updated");
        self.emit(
            state,
            self.clock.now(),
            LedgerEvent::WithdrawalFeeUpdated(FeeUpdated {
                previous_pct: previous,
                current_pct: fee_pct,
            }),
        );
        Ok(previous)
    }

    /// Set the fee ceiling. Returns the previous value.
    pub fn set_max_withdrawal_fee(&self, caller: &Caller, max_fee_pct: u32) -> Result<u32, LedgerError> {
        caller.require_role(Role::Admin)?;
        let mut session = self.session()?;
        let state = &mut *session;

        let previous = state.policy.set_max_fee_pct(max_fee_pct)?;
        info!(previous, current = max_fee_pct, "withdrawal fee ceiling updated");
        self.emit(
            state,
            self.clock.now(),
            LedgerEvent::MaxWithdrawalFeeUpdated(FeeUpdated {
                previous_pct: previous,
                current_pct: max_fee_pct,
            }),
        );
        Ok(previous)
    }

    /// Send every accumulated fee of `asset` to `to`. Nothing accumulated is a no-op.
    pub fn withdraw_fees(
        &self,
        caller: &Caller,
        asset: &AssetId,
        to: &UserId,
    ) -> Result<Option<FeesSwept>, LedgerError> {
        caller.require_role(Role::Admin)?;
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let mut session = self.session()?;
        let state = &mut *session;

        let available = state.accumulated_fees(asset);
        if available == 0 {
            debug!(asset = %asset, "no fees to sweep");
            return Ok(None);
        }

        let checkpoint = state.checkpoint(to, asset);
        let amount = commit(
            state,
            checkpoint,
            |s| Ok(s.take_fees(asset)),
            || self.transfer.transfer_out(to, asset, available),
        )
        .map_err(|err| {
            Self::log_rollback("withdraw_fees", to, asset, &err);
            err
        })?;

        info!(asset = %asset, to = %to, amount, "fees swept");
        let event = FeesSwept {
            asset: asset.clone(),
            to: to.clone(),
            amount,
        };
        self.emit(state, self.clock.now(), LedgerEvent::FeesSwept(event.clone()));
        Ok(Some(event))
    }

    /// Reject deposits and regular withdrawals. Admin or Operator.
    /// Returns whether the flag changed.
    pub fn pause(&self, caller: &Caller) -> Result<bool, LedgerError> {
        if !caller.has_role(Role::Admin) {
            caller.require_role(Role::Operator)?;
        }
        let mut session = self.session()?;
        let state = &mut *session;

        if state.pause.is_paused() {
            return Ok(false);
        }
        state.pause.pause();
        warn!(by = %caller.id(), "ledger paused");
        self.emit(
            state,
            self.clock.now(),
            LedgerEvent::Paused {
                by: caller.id().clone(),
            },
        );
        Ok(true)
    }

    /// Lift the pause. Admin only. Returns whether the flag changed.
    pub fn unpause(&self, caller: &Caller) -> Result<bool, LedgerError> {
        caller.require_role(Role::Admin)?;
        let mut session = self.session()?;
        let state = &mut *session;

        if !state.pause.is_paused() {
            return Ok(false);
        }
        state.pause.unpause();
        info!(by = %caller.id(), "ledger unpaused");
        self.emit(
            state,
            self.clock.now(),
            LedgerEvent::Unpaused {
                by: caller.id().clone(),
            },
        );
        Ok(true)
    }

    // ───────────────────────── Queries ─────────────────────────

    pub fn balance(&self, user: &UserId, asset: &AssetId) -> Result<u128, LedgerError> {
        self.read(|s| s.accounts.get_balance(user, asset))
    }

    /// Balance record including the lock anchor.
    pub fn balance_record(&self, user: &UserId, asset: &AssetId) -> Result<Balance, LedgerError> {
        self.read(|s| s.accounts.balance_record(user, asset))
    }

    pub fn balances_of(&self, user: &UserId) -> Result<Vec<(AssetId, Balance)>, LedgerError> {
        self.read(|s| s.accounts.balances_of(user))
    }

    /// Current USD value of a balance at the latest price.
    pub fn balance_in_usd(&self, user: &UserId, asset: &AssetId) -> Result<UsdAmount, LedgerError> {
        self.read(|s| {
            let amount = s.accounts.get_balance(user, asset)?;
            if amount == 0 {
                return Ok(UsdAmount::ZERO);
            }
            let config = s.registry.lookup(asset)?;
            self.value(&config, amount, self.clock.now())
        })
    }

    pub fn total_deposits_usd(&self) -> Result<UsdAmount, LedgerError> {
        self.read(|s| Ok(s.total_deposits_usd()))
    }

    pub fn remaining_capacity_usd(&self) -> Result<UsdAmount, LedgerError> {
        self.read(|s| Ok(s.capacity.remaining()))
    }

    /// Remaining capacity expressed in units of `asset` at the latest price.
    pub fn remaining_capacity_in(&self, asset: &AssetId) -> Result<u128, LedgerError> {
        self.read(|s| {
            let config = s.registry.resolve(asset)?;
            from_canonical_usd(&self.oracle, &config, s.capacity.remaining(), self.clock.now())
        })
    }

    pub fn deposit_count(&self, user: &UserId) -> Result<u64, LedgerError> {
        self.read(|s| s.accounts.account(user).map(|a| a.deposit_count))
    }

    pub fn withdrawal_count(&self, user: &UserId) -> Result<u64, LedgerError> {
        self.read(|s| s.accounts.account(user).map(|a| a.withdrawal_count))
    }

    pub fn global_counters(&self) -> Result<GlobalCounters, LedgerError> {
        self.read(|s| Ok(s.counters()))
    }

    /// Registry entry for `asset`, including unregistered tokens.
    pub fn asset_config(&self, asset: &AssetId) -> Result<AssetConfig, LedgerError> {
        self.read(|s| s.registry.lookup(asset))
    }

    /// Every registered token, including unregistered ones, in identifier order.
    pub fn registered_tokens(&self) -> Result<Vec<AssetConfig>, LedgerError> {
        self.read(|s| Ok(s.registry.tokens().cloned().collect()))
    }

    pub fn is_supported(&self, asset: &AssetId) -> Result<bool, LedgerError> {
        self.read(|s| Ok(s.registry.is_supported(asset)))
    }

    pub fn accumulated_fees(&self, asset: &AssetId) -> Result<u128, LedgerError> {
        self.read(|s| Ok(s.accumulated_fees(asset)))
    }

    pub fn is_paused(&self) -> Result<bool, LedgerError> {
        self.read(|s| Ok(s.is_paused()))
    }

    pub fn withdrawal_fee_pct(&self) -> Result<u32, LedgerError> {
        self.read(|s| Ok(s.policy.fee_pct()))
    }
}

impl std::fmt::Debug for LedgerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEngine")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("oracle", &self.oracle)
            .finish_non_exhaustive()
    }
}
