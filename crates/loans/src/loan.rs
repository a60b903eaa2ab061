use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use coopledger_core::{
    Amount, FundId, JournalEntryId, LedgerError, LedgerResult, LoanId, MemberId,
};

use crate::schedule::ScheduleLine;

/// Loan lifecycle. Transitions are monotone: `Active -> Closed` (outstanding
/// principal reaches zero) or `Active -> Renewed` (a child loan supersedes
/// this one). Nothing leaves `Closed` or `Renewed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Closed,
    Renewed,
}

/// Repayment policy; determines installment count and principal/interest
/// split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoanType {
    Weekly,
    Monthly,
    Yearly,
    Diminishing,
    EndOfTerm,
}

/// Commercial terms of a loan to be disbursed or renewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub loan_type: LoanType,
    pub principal: Amount,
    /// Per-annum rate as a fraction (0.12 = 12%).
    pub annual_rate: Decimal,
    pub term_months: u32,
    pub start_date: NaiveDate,
}

/// Longest acceptable term: 50 years. Keeps schedule generation (installment
/// counts, due-date offsets) well inside integer and calendar range.
pub const MAX_TERM_MONTHS: u32 = 600;

impl LoanTerms {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.principal.is_zero() {
            return Err(LedgerError::validation("loan principal must be positive"));
        }
        if self.annual_rate < Decimal::ZERO {
            return Err(LedgerError::validation("loan rate cannot be negative"));
        }
        if self.term_months == 0 {
            return Err(LedgerError::validation("loan term must be at least one month"));
        }
        if self.term_months > MAX_TERM_MONTHS {
            return Err(LedgerError::validation(format!(
                "loan term cannot exceed {MAX_TERM_MONTHS} months"
            )));
        }
        Ok(())
    }
}

/// What a successful repayment changes, decided before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepaymentDecision {
    pub new_outstanding: Amount,
    /// True when the repayment drives outstanding principal to exactly zero;
    /// the loan closes in the same commit.
    pub closes_loan: bool,
}

/// A disbursed loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower: MemberId,
    /// Fund whose cash account financed the disbursement.
    pub source_fund: FundId,
    pub loan_type: LoanType,
    pub principal: Amount,
    pub annual_rate: Decimal,
    pub term_months: u32,
    pub status: LoanStatus,
    pub outstanding_principal: Amount,
    /// Back-reference by id for renewal chains; never a live reference.
    pub parent_loan: Option<LoanId>,
    /// Disbursement entry, set once the loan is posted to the ledger.
    pub journal_entry: Option<JournalEntryId>,
}

impl Loan {
    pub fn issue(
        id: LoanId,
        borrower: MemberId,
        source_fund: FundId,
        terms: &LoanTerms,
        parent_loan: Option<LoanId>,
    ) -> LedgerResult<Self> {
        terms.validate()?;
        Ok(Self {
            id,
            borrower,
            source_fund,
            loan_type: terms.loan_type,
            principal: terms.principal,
            annual_rate: terms.annual_rate,
            term_months: terms.term_months,
            status: LoanStatus::Active,
            outstanding_principal: terms.principal,
            parent_loan,
            journal_entry: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    /// Decide a repayment against one schedule line. No mutation; the engine
    /// applies the decision atomically with the journal entry.
    pub fn decide_repayment(
        &self,
        line: &ScheduleLine,
        principal_paid: Amount,
        interest_paid: Amount,
    ) -> LedgerResult<RepaymentDecision> {
        if line.loan_id != self.id {
            return Err(LedgerError::validation(
                "schedule line does not belong to this loan",
            ));
        }
        if line.paid_date.is_some() {
            return Err(LedgerError::AlreadyPaid(line.id));
        }
        if !self.is_active() {
            return Err(LedgerError::validation("loan is not active"));
        }
        if principal_paid.is_zero() && interest_paid.is_zero() {
            return Err(LedgerError::validation("repayment must be positive"));
        }
        let new_outstanding = self
            .outstanding_principal
            .checked_sub(principal_paid)
            .ok_or(LedgerError::Overpayment {
                paid: principal_paid.value(),
                outstanding: self.outstanding_principal.value(),
            })?;
        Ok(RepaymentDecision {
            new_outstanding,
            closes_loan: new_outstanding.is_zero(),
        })
    }

    /// Apply a previously decided repayment.
    pub fn apply_repayment(&mut self, decision: RepaymentDecision) {
        self.outstanding_principal = decision.new_outstanding;
        if decision.closes_loan {
            self.status = LoanStatus::Closed;
        }
    }

    /// Renewal is only valid while the source loan is active.
    pub fn ensure_renewable(&self) -> LedgerResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(LedgerError::validation(
                "only an active loan can be renewed",
            ))
        }
    }

    /// Terminal transition taken when a child loan supersedes this one.
    pub fn mark_renewed(&mut self) {
        self.status = LoanStatus::Renewed;
        self.outstanding_principal = Amount::ZERO;
    }
}
