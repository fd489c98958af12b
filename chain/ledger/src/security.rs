//! Shared security primitives for ledger operations
//!
//! Provides the role model, the explicit caller context handed to every
//! operation, role administration, the pause switch, and same-thread re-entry
//! detection for the engine's critical section.

use ledger_types::ids::UserId;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::LedgerError;

/// Access control roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Configuration, asset registry, price-source rotation, fee sweeps
    Admin,
    /// Operational actions (e.g. pausing)
    Operator,
    /// Emergency withdrawals on behalf of any account
    Emergency,
}

/// Authorization context for a single ledger operation.
///
/// The engine never consults ambient role state: whoever builds the `Caller`
/// vouches for its identity and roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    id: UserId,
    roles: BTreeSet<Role>,
}

impl Caller {
    /// A caller with no roles.
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.insert(role);
        self
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_owner_of(&self, user: &UserId) -> bool {
        &self.id == user
    }

    pub(crate) fn require_role(&self, role: Role) -> Result<(), LedgerError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized {
                caller: self.id.clone(),
                required: role,
            })
        }
    }

    pub(crate) fn require_owner(&self, user: &UserId) -> Result<(), LedgerError> {
        if self.is_owner_of(user) {
            Ok(())
        } else {
            Err(LedgerError::NotOwner {
                caller: self.id.clone(),
                owner: user.clone(),
            })
        }
    }

    /// Owner of `user`, or holder of `role`.
    pub(crate) fn require_owner_or(&self, user: &UserId, role: Role) -> Result<(), LedgerError> {
        if self.is_owner_of(user) || self.has_role(role) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized {
                caller: self.id.clone(),
                required: role,
            })
        }
    }
}

/// Role grants keyed by identity.
///
/// The primary admin keeps `Admin` for as long as it holds the seat; the seat
/// moves only through `transfer_admin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    grants: BTreeMap<UserId, BTreeSet<Role>>,
    primary_admin: UserId,
}

impl AccessControl {
    /// Create access control with an initial admin.
    pub fn new(admin: impl Into<UserId>) -> Self {
        let admin = admin.into();
        let mut grants = BTreeMap::new();
        grants.insert(admin.clone(), BTreeSet::from([Role::Admin]));
        Self {
            grants,
            primary_admin: admin,
        }
    }

    pub fn has_role(&self, id: &UserId, role: Role) -> bool {
        self.grants.get(id).map_or(false, |roles| roles.contains(&role))
    }

    /// Resolve the caller context for `id` from the stored grants.
    pub fn caller(&self, id: impl Into<UserId>) -> Caller {
        let id = id.into();
        let roles = self.grants.get(&id).cloned().unwrap_or_default();
        Caller { id, roles }
    }

    /// Grant a role. Admin-only.
    pub fn grant_role(
        &mut self,
        caller: &Caller,
        target: impl Into<UserId>,
        role: Role,
    ) -> Result<(), LedgerError> {
        caller.require_role(Role::Admin)?;
        let target = target.into();
        if target.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        self.grants.entry(target).or_default().insert(role);
        Ok(())
    }

    /// Revoke a role. Admin-only; the primary admin's seat cannot be revoked.
    pub fn revoke_role(
        &mut self,
        caller: &Caller,
        target: &UserId,
        role: Role,
    ) -> Result<(), LedgerError> {
        caller.require_role(Role::Admin)?;
        if role == Role::Admin && target == &self.primary_admin {
            return Err(LedgerError::Unauthorized {
                caller: caller.id().clone(),
                required: Role::Admin,
            });
        }
        if let Some(roles) = self.grants.get_mut(target) {
            roles.remove(&role);
            if roles.is_empty() {
                self.grants.remove(target);
            }
        }
        Ok(())
    }

    /// Hand the primary admin seat to another identity.
    pub fn transfer_admin(
        &mut self,
        caller: &Caller,
        new_admin: impl Into<UserId>,
    ) -> Result<(), LedgerError> {
        if !caller.is_owner_of(&self.primary_admin) {
            return Err(LedgerError::Unauthorized {
                caller: caller.id().clone(),
                required: Role::Admin,
            });
        }
        let new_admin = new_admin.into();
        if new_admin.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        if let Some(roles) = self.grants.get_mut(&self.primary_admin) {
            roles.remove(&Role::Admin);
            if roles.is_empty() {
                self.grants.remove(&self.primary_admin);
            }
        }
        self.grants
            .entry(new_admin.clone())
            .or_default()
            .insert(Role::Admin);
        self.primary_admin = new_admin;
        Ok(())
    }

    pub fn primary_admin(&self) -> &UserId {
        &self.primary_admin
    }
}

/// Composable pause switch.
///
/// When paused, deposits and regular withdrawals are rejected. Emergency
/// withdrawals stay available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseGuard {
    paused: bool,
}

impl PauseGuard {
    pub fn new() -> Self {
        Self { paused: false }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn unpause(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn ensure_not_paused(&self) -> Result<(), LedgerError> {
        if self.paused {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }
}

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Engines whose critical section is held by the current thread.
    static ACTIVE_ENGINES: RefCell<Vec<u64>> = RefCell::new(Vec::new());
}

/// Allocate a process-unique engine identifier.
pub(crate) fn next_engine_id() -> u64 {
    NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Marks an engine's critical section as entered on the current thread.
///
/// A collaborator that calls back into the same engine while an operation is
/// in flight gets `Reentrancy` instead of deadlocking on the engine mutex.
/// Other threads are unaffected and simply wait for the mutex.
#[derive(Debug)]
pub(crate) struct ReentrancyGuard {
    engine_id: u64,
}

impl ReentrancyGuard {
    pub(crate) fn enter(engine_id: u64) -> Result<Self, LedgerError> {
        ACTIVE_ENGINES.with(|active| {
            let mut active = active.borrow_mut();
            if active.contains(&engine_id) {
                return Err(LedgerError::Reentrancy);
            }
            active.push(engine_id);
            Ok(Self { engine_id })
        })
    }

    #[cfg(test)]
    pub(crate) fn is_active(engine_id: u64) -> bool {
        ACTIVE_ENGINES.with(|active| active.borrow().contains(&engine_id))
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        ACTIVE_ENGINES.with(|active| active.borrow_mut().retain(|id| *id != self.engine_id));
    }
}
