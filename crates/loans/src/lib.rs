//! Loan ledger domain model: loan lifecycle, amortization schedules,
//! repayment decisions.
//!
//! Pure business rules; the posting engine owns storage, locking, and the
//! journal entries each decision triggers.

pub mod loan;
pub mod schedule;

pub use loan::{Loan, LoanStatus, LoanTerms, LoanType, RepaymentDecision};
pub use schedule::{generate_schedule, ScheduleLine};
