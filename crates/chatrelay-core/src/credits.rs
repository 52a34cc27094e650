//! Send-budget accounting
//!
//! The ledger tracks a consumable send budget. A credit is a proxy for one
//! confirmed delivery: the balance moves only after the provider acknowledges
//! a send, never on submission and never on failure. Callers check
//! availability before attempting a send and commit the spend afterwards.

use std::sync::atomic::{AtomicU32, Ordering};

/// Atomic send-budget counter owned by one relay manager
pub struct CreditLedger {
    balance: AtomicU32,
}

impl CreditLedger {
    /// Create a ledger with an initial budget
    pub fn new(initial: u32) -> Self {
        Self { balance: AtomicU32::new(initial) }
    }

    /// Current balance
    pub fn balance(&self) -> u32 {
        self.balance.load(Ordering::Acquire)
    }

    /// True when at least one credit remains
    pub fn has_credit(&self) -> bool {
        self.balance() > 0
    }

    /// Add credits to the budget, saturating at `u32::MAX`. Returns the new
    /// balance.
    pub fn grant(&self, amount: u32) -> u32 {
        let previous = self
            .balance
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |balance| {
                Some(balance.saturating_add(amount))
            })
            .unwrap_or(u32::MAX);
        previous.saturating_add(amount)
    }

    /// Record one confirmed delivery, decrementing the balance by exactly 1.
    /// Returns the new balance. The balance can never go below zero; a spend
    /// against an empty ledger is logged and clamped.
    pub fn commit_spend(&self) -> u32 {
        match self
            .balance
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |balance| balance.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => {
                tracing::warn!("confirmed delivery with an empty ledger; balance stays at 0");
                0
            }
        }
    }
}
