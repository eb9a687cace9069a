//! A process-wide ledger limiting the number of concurrent policy bindings.
//!
//! Adjustments are applied to the ledger as soon as they are reserved, under a
//! single lock, so that concurrent reviews can never jointly exceed the
//! capacity. The returned [`Transaction`] must then be committed, or rolled
//! back if a later step of the review fails.

use ahash::AHashMap as HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, warn};


/// A shared handle to the binding ledger.
#[derive(Clone, Debug)]
pub struct Ledger(Arc<Mutex<State>>);

#[derive(Debug)]
struct State {
    capacity: u32,
    total: u32,
    by_id: HashMap<String, u32>,
    open: usize,
    leaked: usize,
}

/// A pending adjustment of the ledger.
#[derive(Debug)]
#[must_use = "transactions must be committed or rolled back"]
pub struct Transaction {
    ledger: Ledger,
    id: String,
    /// The adjustment actually applied, after clamping releases.
    applied: i64,
    state: TxState,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TxState {
    Reserved,
    Committed,
    RolledBack,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("access control policy quota exceeded: cannot bind {id} (capacity {capacity})")]
pub struct QuotaExceeded {
    pub id: String,
    pub capacity: u32,
}

// === impl Ledger ===

impl Ledger {
    pub fn new(capacity: u32) -> Self {
        Self(Arc::new(Mutex::new(State {
            capacity,
            total: 0,
            by_id: HashMap::default(),
            open: 0,
            leaked: 0,
        })))
    }

    /// Adjusts the reservations held by `id`.
    ///
    /// A positive amount fails if it would exceed the ledger's capacity. A
    /// negative amount releases reservations and never fails; releasing more
    /// than `id` holds is clamped, so releasing an unbound resource is a no-op.
    pub fn reserve(&self, id: &str, amount: i64) -> Result<Transaction, QuotaExceeded> {
        if amount < 0 {
            return Ok(self.release(id, amount.unsigned_abs()));
        }

        let mut state = self.0.lock();
        let requested = u32::try_from(amount).unwrap_or(u32::MAX);
        if state.total.saturating_add(requested) > state.capacity {
            debug!(%id, total = state.total, capacity = state.capacity, "Quota exceeded");
            return Err(QuotaExceeded {
                id: id.to_string(),
                capacity: state.capacity,
            });
        }
        state.add(id, requested);
        state.open += 1;
        debug!(%id, amount, total = state.total, "Reserved");
        drop(state);

        Ok(self.transaction(id, amount))
    }

    /// Releases up to `amount` reservations held by `id`.
    pub fn release(&self, id: &str, amount: u64) -> Transaction {
        let mut state = self.0.lock();
        let requested = u32::try_from(amount).unwrap_or(u32::MAX);
        let removed = state.sub(id, requested);
        state.open += 1;
        debug!(%id, amount, removed, total = state.total, "Released");
        drop(state);

        self.transaction(id, -i64::from(removed))
    }

    fn transaction(&self, id: &str, applied: i64) -> Transaction {
        Transaction {
            ledger: self.clone(),
            id: id.to_string(),
            applied,
            state: TxState::Reserved,
        }
    }

    /// Records an existing binding, e.g. one observed when the controller
    /// starts.
    pub fn seed(&self, id: &str) -> Result<(), QuotaExceeded> {
        self.reserve(id, 1)?.commit();
        Ok(())
    }

    pub fn capacity(&self) -> u32 {
        self.0.lock().capacity
    }

    /// The total number of reservations held.
    pub fn total(&self) -> u32 {
        self.0.lock().total
    }

    /// The number of reservations held by `id`.
    pub fn count(&self, id: &str) -> u32 {
        self.0.lock().by_id.get(id).copied().unwrap_or(0)
    }

    /// The number of transactions neither committed nor rolled back yet.
    pub fn open_transactions(&self) -> usize {
        self.0.lock().open
    }

    /// The number of transactions dropped without being committed or rolled
    /// back. Any non-zero value indicates a bug.
    pub fn leaked_transactions(&self) -> usize {
        self.0.lock().leaked
    }
}

// === impl State ===

impl State {
    fn add(&mut self, id: &str, amount: u32) {
        if amount == 0 {
            return;
        }
        *self.by_id.entry(id.to_string()).or_default() += amount;
        self.total += amount;
    }

    /// Removes up to `amount` reservations from `id`, returning the number
    /// actually removed.
    fn sub(&mut self, id: &str, amount: u32) -> u32 {
        let Some(count) = self.by_id.get_mut(id) else {
            return 0;
        };
        let removed = amount.min(*count);
        *count -= removed;
        if *count == 0 {
            self.by_id.remove(id);
        }
        self.total -= removed;
        removed
    }
}

// === impl Transaction ===

impl Transaction {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The adjustment applied to the ledger when this transaction was
    /// reserved.
    pub fn applied(&self) -> i64 {
        self.applied
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Finalizes the adjustment.
    pub fn commit(mut self) {
        self.close(TxState::Committed);
        debug!(id = %self.id, applied = self.applied, "Committed");
    }

    /// Reverts the adjustment.
    pub fn rollback(mut self) {
        {
            let mut state = self.ledger.0.lock();
            if self.applied > 0 {
                let amount = u32::try_from(self.applied).unwrap_or(u32::MAX);
                state.sub(&self.id, amount);
            } else if self.applied < 0 {
                let amount = u32::try_from(self.applied.unsigned_abs()).unwrap_or(u32::MAX);
                if state.total.saturating_add(amount) <= state.capacity {
                    state.add(&self.id, amount);
                } else {
                    warn!(id = %self.id, "Released quota was claimed concurrently; not restoring it");
                }
            }
        }
        self.close(TxState::RolledBack);
        debug!(id = %self.id, applied = self.applied, "Rolled back");
    }

    fn close(&mut self, next: TxState) {
        debug_assert_eq!(self.state, TxState::Reserved);
        self.state = next;
        self.ledger.0.lock().open -= 1;
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TxState::Reserved {
            return;
        }

        let mut state = self.ledger.0.lock();
        state.open -= 1;
        state.leaked += 1;
        drop(state);
        error!(id = %self.id, applied = self.applied, "Quota transaction dropped while open");
    }
}
