//! Per-account rolling history and the keyed store that owns it.
//!
//! RULE: Account history is the only shared mutable state in the engine.
//! Every access goes through HistoryStore, one lock per account.
//! Two transactions of the same account are never scored concurrently.

use crate::{
    transaction::{LocationKey, Transaction},
    types::{AccountId, Timestamp},
};
use chrono::Timelike;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountHistory {
    pub account_id: AccountId,
    pub window: usize,
    /// Bounded, newest last.
    pub recent_transactions: VecDeque<Transaction>,
    pub average_amount: f64,
    pub typical_locations: BTreeSet<LocationKey>,
    pub typical_hours: BTreeSet<u32>,
}

impl AccountHistory {
    pub fn new(account_id: impl Into<AccountId>, window: usize) -> Self {
        Self {
            account_id: account_id.into(),
            window: window.max(1),
            recent_transactions: VecDeque::new(),
            average_amount: 0.0,
            typical_locations: BTreeSet::new(),
            typical_hours: BTreeSet::new(),
        }
    }

    /// Build a history by replaying transactions in the given order.
    pub fn from_transactions<'a>(
        account_id: impl Into<AccountId>,
        window: usize,
        transactions: impl IntoIterator<Item = &'a Transaction>,
    ) -> Self {
        let mut history = Self::new(account_id, window);
        for txn in transactions {
            history.record(txn);
        }
        history
    }

    pub fn contains(&self, transaction_id: &str) -> bool {
        self.recent_transactions.iter().any(|t| t.id == transaction_id)
    }

    pub fn is_empty(&self) -> bool {
        self.recent_transactions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.recent_transactions.len()
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.recent_transactions.back().map(|t| t.timestamp)
    }

    /// Append a scored transaction, evicting the oldest beyond the window.
    pub fn record(&mut self, txn: &Transaction) {
        self.recent_transactions.push_back(txn.clone());
        while self.recent_transactions.len() > self.window {
            self.recent_transactions.pop_front();
        }
        self.recompute();
    }

    // Aggregates are rebuilt from the window so eviction can never leave
    // a stale location or hour behind.
    fn recompute(&mut self) {
        let n = self.recent_transactions.len();
        self.average_amount = if n == 0 {
            0.0
        } else {
            self.recent_transactions.iter().map(|t| t.amount.abs()).sum::<f64>() / n as f64
        };
        self.typical_locations = self
            .recent_transactions
            .iter()
            .map(|t| t.origin_location.key())
            .collect();
        self.typical_hours = self
            .recent_transactions
            .iter()
            .map(|t| t.timestamp.hour())
            .collect();
    }
}

/// Keyed store of account histories with per-account serialized access.
pub struct HistoryStore {
    window: usize,
    accounts: DashMap<AccountId, Arc<Mutex<AccountHistory>>>,
}

impl HistoryStore {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            accounts: DashMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Lock handle for one account, created empty on first use.
    /// The DashMap shard lock is released before the caller locks the account.
    pub fn handle(&self, account_id: &str) -> Arc<Mutex<AccountHistory>> {
        if let Some(existing) = self.accounts.get(account_id) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .accounts
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(AccountHistory::new(account_id, self.window))));
        Arc::clone(entry.value())
    }

    /// Install history loaded by a persistence collaborator.
    /// An existing account keeps its lock; only the contents are replaced,
    /// so scorers already holding the handle see the seeded history.
    pub fn seed(&self, history: AccountHistory) {
        let handle = self.handle(&history.account_id);
        *handle.lock() = history;
    }

    /// Copy of the current history, if the account has been seen.
    pub fn snapshot(&self, account_id: &str) -> Option<AccountHistory> {
        let handle = self.accounts.get(account_id).map(|h| Arc::clone(h.value()))?;
        let history = handle.lock().clone();
        Some(history)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}
