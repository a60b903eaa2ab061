//! Per-entity lock table.
//!
//! Mutating operations that touch a given account, loan, fund, or invoice
//! line are serialized per entity. A single operation claims every key it
//! needs in one deterministic, all-or-nothing step, so two operations can
//! never hold partial, conflicting key sets (no lock-ordering deadlocks).

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use coopledger_core::{
    AccountId, FundId, InvoiceLineId, LedgerError, LedgerResult, LoanId,
};

/// One lockable entity. `Ord` gives the fixed acquisition order: variant
/// first, then ascending id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Account(AccountId),
    Loan(LoanId),
    Fund(FundId),
    InvoiceLine(InvoiceLineId),
}

#[derive(Debug, Default)]
struct Shared {
    held: Mutex<HashSet<LockKey>>,
    freed: Condvar,
}

/// In-process equivalent of database row-level locks, keyed by entity id.
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    shared: Arc<Shared>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every key or none.
    ///
    /// Keys are sorted and deduplicated, then claimed in one step once all
    /// are free. Waiting past `timeout` fails with the retryable `Busy`.
    pub fn acquire(&self, mut keys: Vec<LockKey>, timeout: Duration) -> LedgerResult<LockGuard> {
        keys.sort_unstable();
        keys.dedup();

        let deadline = Instant::now() + timeout;
        let mut held = self
            .shared
            .held
            .lock()
            .map_err(|_| LedgerError::validation("lock table poisoned"))?;

        loop {
            if keys.iter().all(|key| !held.contains(key)) {
                held.extend(keys.iter().copied());
                return Ok(LockGuard {
                    shared: Arc::clone(&self.shared),
                    keys,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LedgerError::Busy(timeout));
            }
            let (reacquired, _timed_out) = self
                .shared
                .freed
                .wait_timeout(held, deadline - now)
                .map_err(|_| LedgerError::validation("lock table poisoned"))?;
            held = reacquired;
        }
    }
}

/// Holds the claimed keys; releases them all (and wakes waiters) on drop.
#[derive(Debug)]
pub struct LockGuard {
    shared: Arc<Shared>,
    keys: Vec<LockKey>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.shared.held.lock() {
            for key in &self.keys {
                held.remove(key);
            }
        }
        self.shared.freed.notify_all();
    }
}
