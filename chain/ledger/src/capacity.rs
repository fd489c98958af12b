//! Capacity guard: global deposit ceiling over a running USD total
//!
//! The cap is fixed at construction. The running total only grows through
//! `reserve`, which refuses to cross the cap, and shrinks through `release`,
//! which saturates at zero: conversion rounding can make a withdrawal's
//! valuation exceed what its deposit added.

use ledger_types::numeric::UsdAmount;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityGuard {
    cap: UsdAmount,
    total: UsdAmount,
}

impl CapacityGuard {
    pub fn new(cap: UsdAmount) -> Self {
        Self {
            cap,
            total: UsdAmount::ZERO,
        }
    }

    /// Add `usd` to the running total, or fail without changing it.
    pub fn reserve(&mut self, usd: UsdAmount) -> Result<UsdAmount, LedgerError> {
        let exceeded = || LedgerError::CapacityExceeded {
            requested: usd,
            total: self.total,
            cap: self.cap,
        };
        let next = self.total.checked_add(usd).ok_or_else(exceeded)?;
        if next > self.cap {
            return Err(exceeded());
        }
        self.total = next;
        debug!(reserved = usd.raw(), total = next.raw(), "capacity reserved");
        Ok(next)
    }

    /// Subtract `usd`, clamping at zero.
    pub fn release(&mut self, usd: UsdAmount) -> UsdAmount {
        if usd > self.total {
            warn!(
                released = usd.raw(),
                total = self.total.raw(),
                "capacity release exceeds running total, clamping to zero"
            );
        }
        self.total = self.total.saturating_sub(usd);
        debug!(released = usd.raw(), total = self.total.raw(), "capacity released");
        self.total
    }

    pub fn remaining(&self) -> UsdAmount {
        self.cap.saturating_sub(self.total)
    }

    pub fn total(&self) -> UsdAmount {
        self.total
    }

    pub fn cap(&self) -> UsdAmount {
        self.cap
    }
}
