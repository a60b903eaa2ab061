//! Ledger error taxonomy.
//!
//! Keep this focused on deterministic, domain-rule failures. Every variant is
//! detected before any write: a returned error means the ledger is exactly as
//! it was before the call.

use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::{AccountId, ScheduleLineId};

/// Result type used across the ledger crates.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Domain-level ledger error.
///
/// Only `StaleBalance` and `Busy` are retryable; everything else indicates a
/// caller/business-logic mistake and must not be retried blindly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A candidate entry's legs do not net to zero.
    #[error("entry does not balance: debits {debits} != credits {credits}")]
    Unbalanced { debits: Decimal, credits: Decimal },

    /// A leg references an account that does not exist.
    #[error("unknown account: {0}")]
    UnknownAccount(AccountId),

    /// A leg references a deactivated account.
    #[error("inactive account: {0}")]
    InactiveAccount(AccountId),

    /// A principal repayment exceeds the loan's outstanding principal.
    #[error("repayment exceeds outstanding principal: paid {paid}, outstanding {outstanding}")]
    Overpayment { paid: Decimal, outstanding: Decimal },

    /// A payment allocation exceeds what the invoice line still owes.
    #[error("allocation exceeds amount owed: cumulative {cumulative}, owed {owed}")]
    OverAllocation { cumulative: Decimal, owed: Decimal },

    /// Double-settlement attempt against an already-paid schedule line.
    #[error("schedule line already paid: {0}")]
    AlreadyPaid(ScheduleLineId),

    /// A withdrawal exceeds the fund's posted balance.
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    /// Lost-update detection: the balance read by the caller is no longer
    /// current. Retry with a fresh read.
    #[error("stale balance: expected {expected}, found {actual}")]
    StaleBalance { expected: Decimal, actual: Decimal },

    /// Per-entity lock acquisition timed out. Retryable.
    #[error("ledger busy: lock not acquired within {0:?}")]
    Busy(Duration),

    /// A requested row was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A value failed validation (e.g. malformed input, non-positive amount).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// True only for errors the caller may retry after a fresh read.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleBalance { .. } | Self::Busy(_))
    }
}
