//! Amortization schedule generation.
//!
//! Every policy must reconcile to the last unit of currency: the principal
//! parts of a schedule sum exactly to the loan principal, and any rounding
//! residue is absorbed into the final installment.

use chrono::{Days, Months, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use coopledger_core::{Amount, JournalEntryId, LedgerError, LedgerResult, LoanId, ScheduleLineId};

use crate::loan::{LoanTerms, LoanType};

/// One scheduled (and later, actual) repayment.
///
/// Until paid, `principal` and `interest` carry the scheduled split. Posting
/// the repayment sets them to the amounts actually paid along with
/// `paid_date` and `journal_entry`, so a paid line's principal + interest
/// always equal the journal lines it triggered. Paid fields are set once,
/// never revised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleLine {
    pub id: ScheduleLineId,
    pub loan_id: LoanId,
    /// 1-based installment number.
    pub seq: u32,
    pub due_date: NaiveDate,
    pub principal: Amount,
    pub interest: Amount,
    pub paid_date: Option<NaiveDate>,
    pub journal_entry: Option<JournalEntryId>,
}

impl ScheduleLine {
    /// Installment amount: principal + interest (scheduled, or actual once
    /// paid).
    pub fn installment(&self) -> Decimal {
        self.principal.value() + self.interest.value()
    }

    /// Mark the line paid with the amounts actually posted.
    ///
    /// Callers (the posting engine) guard against double settlement before
    /// committing; the paid fields are written exactly once.
    pub fn record_payment(
        &mut self,
        principal_paid: Amount,
        interest_paid: Amount,
        paid_date: NaiveDate,
        journal_entry: JournalEntryId,
    ) {
        self.principal = principal_paid;
        self.interest = interest_paid;
        self.paid_date = Some(paid_date);
        self.journal_entry = Some(journal_entry);
    }
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn floor2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Split `total` into `n` parts: n-1 equal floored parts, with the rounding
/// residue absorbed into the last part. The parts sum to `total` exactly.
fn split_even(total: Decimal, n: u32) -> Vec<Decimal> {
    let per = floor2(total / Decimal::from(n));
    let mut parts = vec![per; n as usize];
    let last = total - per * Decimal::from(n - 1);
    parts[n as usize - 1] = last;
    parts
}

fn due_in_months(start: NaiveDate, months: u32) -> LedgerResult<NaiveDate> {
    start
        .checked_add_months(Months::new(months))
        .ok_or_else(|| LedgerError::validation("schedule due date out of range"))
}

fn due_in_weeks(start: NaiveDate, weeks: u32) -> LedgerResult<NaiveDate> {
    start
        .checked_add_days(Days::new(7 * u64::from(weeks)))
        .ok_or_else(|| LedgerError::validation("schedule due date out of range"))
}

/// Number of installments a policy produces for a given term.
fn installment_count(loan_type: LoanType, term_months: u32) -> u32 {
    match loan_type {
        LoanType::Weekly => term_months * 4,
        LoanType::Monthly | LoanType::Diminishing => term_months,
        LoanType::Yearly => term_months.div_ceil(12),
        LoanType::EndOfTerm => 1,
    }
}

fn due_date(
    loan_type: LoanType,
    start: NaiveDate,
    seq: u32,
    term_months: u32,
    count: u32,
) -> LedgerResult<NaiveDate> {
    match loan_type {
        LoanType::Weekly => due_in_weeks(start, seq),
        LoanType::Monthly | LoanType::Diminishing => due_in_months(start, seq),
        // Yearly spacing, with the final installment landing on the term end
        // when the term is not a whole number of years.
        LoanType::Yearly => {
            let months = if seq == count {
                term_months
            } else {
                seq * 12
            };
            due_in_months(start, months)
        }
        LoanType::EndOfTerm => due_in_months(start, term_months),
    }
}

/// Principal/interest split per installment, in order.
fn installments(terms: &LoanTerms, count: u32) -> Vec<(Decimal, Decimal)> {
    let principal = terms.principal.value();
    let term_years = Decimal::from(terms.term_months) / Decimal::from(12u32);
    let principal_parts = split_even(principal, count);

    match terms.loan_type {
        // Flat interest: computed once on the full principal for the full
        // term, split across installments like the principal.
        LoanType::Weekly | LoanType::Monthly | LoanType::Yearly | LoanType::EndOfTerm => {
            let total_interest = round2(principal * terms.annual_rate * term_years);
            let interest_parts = split_even(total_interest, count);
            principal_parts.into_iter().zip(interest_parts).collect()
        }
        // Declining balance: each period's interest accrues on the
        // outstanding principal at that period.
        LoanType::Diminishing => {
            let monthly_rate = terms.annual_rate / Decimal::from(12u32);
            let mut outstanding = principal;
            principal_parts
                .into_iter()
                .map(|p| {
                    let interest = round2(outstanding * monthly_rate);
                    outstanding -= p;
                    (p, interest)
                })
                .collect()
        }
    }
}

/// Generate the full amortization schedule for a loan.
pub fn generate_schedule(loan_id: LoanId, terms: &LoanTerms) -> LedgerResult<Vec<ScheduleLine>> {
    terms.validate()?;
    let count = installment_count(terms.loan_type, terms.term_months);
    debug_assert!(count >= 1);

    let mut lines = Vec::with_capacity(count as usize);
    for (idx, (principal, interest)) in installments(terms, count).into_iter().enumerate() {
        let seq = idx as u32 + 1;
        lines.push(ScheduleLine {
            id: ScheduleLineId::new(),
            loan_id,
            seq,
            due_date: due_date(terms.loan_type, terms.start_date, seq, terms.term_months, count)?,
            principal: Amount::new(principal)?,
            interest: Amount::new(interest)?,
            paid_date: None,
            journal_entry: None,
        });
    }
    Ok(lines)
}
