//! Where finished transaction milestones are published.

use crate::error::{Error, Result};
use crate::transaction::Transaction;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Default capacity of an [`InMemoryCollector`].
pub const DEFAULT_COLLECTOR_CAPACITY: usize = 1000;

/// Receives a snapshot of a transaction at each milestone.
///
/// Called once when the request is sent, once when the response is
/// received, or once on failure. The returned id is the store's identity
/// for the record; later updates carry it in [`Transaction::id`].
pub trait TransactionCollector: Send + Sync + 'static {
    /// Store or update `transaction`, returning its id.
    fn on_transaction_update(&self, transaction: &Transaction) -> Result<u64>;
}

impl<C: TransactionCollector + ?Sized> TransactionCollector for std::sync::Arc<C> {
    fn on_transaction_update(&self, transaction: &Transaction) -> Result<u64> {
        (**self).on_transaction_update(transaction)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCollector;

impl TransactionCollector for NullCollector {
    fn on_transaction_update(&self, transaction: &Transaction) -> Result<u64> {
        Ok(transaction.id())
    }
}

#[derive(Debug)]
struct CollectorState {
    next_id: u64,
    entries: VecDeque<Transaction>,
}

/// Bounded in-memory store, oldest entries evicted first.
#[derive(Debug)]
pub struct InMemoryCollector {
    capacity: usize,
    state: Mutex<CollectorState>,
}

impl Default for InMemoryCollector {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTOR_CAPACITY)
    }
}

impl InMemoryCollector {
    /// Create a collector holding at most `capacity` transactions.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CollectorState {
                next_id: 1,
                entries: VecDeque::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CollectorState>> {
        self.state
            .lock()
            .map_err(|_| Error::collector("Lock poisoned"))
    }

    /// Look up a stored transaction.
    pub fn get(&self, id: u64) -> Option<Transaction> {
        let state = self.lock().ok()?;
        state.entries.iter().find(|t| t.id() == id).cloned()
    }

    /// Up to `limit` transactions, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Transaction> {
        match self.lock() {
            Ok(state) => state.entries.iter().rev().take(limit).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every stored transaction.
    pub fn clear(&self) {
        if let Ok(mut state) = self.lock() {
            state.entries.clear();
        }
    }
}

impl TransactionCollector for InMemoryCollector {
    fn on_transaction_update(&self, transaction: &Transaction) -> Result<u64> {
        let mut state = self.lock()?;

        let id = transaction.id();
        if id != 0 {
            if let Some(existing) = state.entries.iter_mut().find(|t| t.id() == id) {
                *existing = transaction.clone();
                return Ok(id);
            }
            // evicted or unknown: store again under the same id
        }

        let id = if id == 0 {
            let id = state.next_id;
            state.next_id += 1;
            id
        } else {
            id
        };

        let mut stored = transaction.clone();
        stored.set_id(id);
        while state.entries.len() >= self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(stored);

        Ok(id)
    }
}
