//! Credit accounting
//!
//! Each analysis costs a fixed number of credits, deducted at submission.
//! A submission rejected for insufficient balance never reaches the
//! pipeline. Credits are not refunded when an analysis fails; the failure
//! result is still a full model call in the common case.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// Per-user credit balances. Unknown users start at the configured initial
/// balance on first contact.
#[derive(Debug)]
pub struct CreditLedger {
    balances: RwLock<HashMap<String, u32>>,
    initial_balance: u32,
}

impl CreditLedger {
    pub fn new(initial_balance: u32) -> Self {
        Self {
            balances: RwLock::new(HashMap::new()),
            initial_balance,
        }
    }

    pub async fn balance(&self, user: &str) -> u32 {
        let mut balances = self.balances.write().await;
        *balances
            .entry(user.to_string())
            .or_insert(self.initial_balance)
    }

    /// Deduct `cost` credits. Returns the remaining balance, or `None` when
    /// the balance is insufficient (in which case nothing is deducted).
    pub async fn deduct(&self, user: &str, cost: u32) -> Option<u32> {
        let mut balances = self.balances.write().await;
        let balance = balances
            .entry(user.to_string())
            .or_insert(self.initial_balance);
        if *balance < cost {
            return None;
        }
        *balance -= cost;
        Some(*balance)
    }

    /// Add purchased credits. Returns the new balance.
    pub async fn add(&self, user: &str, amount: u32) -> u32 {
        let mut balances = self.balances.write().await;
        let balance = balances
            .entry(user.to_string())
            .or_insert(self.initial_balance);
        *balance = balance.saturating_add(amount);
        *balance
    }
}
