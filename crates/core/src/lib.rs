//! `coopledger-core` — shared domain primitives for the ledger engine.
//!
//! This crate contains **pure domain** building blocks (no infrastructure
//! concerns): strongly-typed identifiers, the ledger error taxonomy, and the
//! fixed-point `Amount` money type.

pub mod amount;
pub mod error;
pub mod id;

pub use amount::Amount;
pub use error::{LedgerError, LedgerResult};
pub use id::{
    AccountGroupId, AccountId, DividendId, FundId, FundTransactionId, InvoiceLineId,
    JournalEntryId, LoanId, MemberId, PaymentId, ScheduleLineId,
};
