use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use coopledger_chart::Side;
use coopledger_core::{
    AccountId, Amount, DividendId, FundTransactionId, JournalEntryId, LedgerError, LedgerResult,
    LoanId, PaymentId, ScheduleLineId,
};

/// What financial event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "id")]
pub enum Reference {
    LoanDisbursement(LoanId),
    LoanRepayment(ScheduleLineId),
    FundTransaction(FundTransactionId),
    InvoicePayment(PaymentId),
    Dividend(DividendId),
    Reversal(JournalEntryId),
    Manual,
}

/// One candidate debit or credit leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLeg {
    pub account_id: AccountId,
    pub side: Side,
    pub amount: Amount,
}

impl DraftLeg {
    pub fn debit(account_id: AccountId, amount: Amount) -> Self {
        Self {
            account_id,
            side: Side::Debit,
            amount,
        }
    }

    pub fn credit(account_id: AccountId, amount: Amount) -> Self {
        Self {
            account_id,
            side: Side::Credit,
            amount,
        }
    }
}

/// A candidate journal entry, not yet validated or committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub date: NaiveDate,
    pub reference: Reference,
    pub memo: Option<String>,
    pub legs: Vec<DraftLeg>,
}

impl EntryDraft {
    pub fn new(date: NaiveDate, reference: Reference, legs: Vec<DraftLeg>) -> Self {
        Self {
            date,
            reference,
            memo: None,
            legs,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// (total debits, total credits).
    pub fn totals(&self) -> (Decimal, Decimal) {
        let mut debits = Decimal::ZERO;
        let mut credits = Decimal::ZERO;
        for leg in &self.legs {
            match leg.side {
                Side::Debit => debits += leg.amount.value(),
                Side::Credit => credits += leg.amount.value(),
            }
        }
        (debits, credits)
    }

    /// Validate the draft's shape and balance.
    ///
    /// Checks: at least two legs, every leg strictly positive, and exact
    /// decimal equality of debit and credit totals (no rounding tolerance).
    /// Account existence/activity is the posting engine's check, since it
    /// owns the chart rows.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.legs.len() < 2 {
            return Err(LedgerError::validation(
                "journal entry must have at least two legs",
            ));
        }
        for leg in &self.legs {
            if leg.amount.is_zero() {
                return Err(LedgerError::validation(
                    "journal leg amount must be positive",
                ));
            }
        }
        let (debits, credits) = self.totals();
        if debits != credits {
            return Err(LedgerError::Unbalanced { debits, credits });
        }
        Ok(())
    }
}

/// One committed debit or credit leg. Immutable.
///
/// Exactly one of `debit`/`credit` is non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub entry_id: JournalEntryId,
    pub account_id: AccountId,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl JournalLine {
    pub fn from_leg(entry_id: JournalEntryId, leg: &DraftLeg) -> Self {
        let (debit, credit) = match leg.side {
            Side::Debit => (leg.amount.value(), Decimal::ZERO),
            Side::Credit => (Decimal::ZERO, leg.amount.value()),
        };
        Self {
            entry_id,
            account_id: leg.account_id,
            debit,
            credit,
        }
    }

    pub fn side(&self) -> Side {
        if self.debit.is_zero() {
            Side::Credit
        } else {
            Side::Debit
        }
    }

    pub fn amount(&self) -> Decimal {
        self.debit + self.credit
    }
}

/// A committed, immutable journal entry.
///
/// Corrections are reversing entries, never edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub date: NaiveDate,
    pub reference: Reference,
    pub memo: Option<String>,
    /// Set when this entry reverses a prior one.
    pub reverses: Option<JournalEntryId>,
    pub posted_at: DateTime<Utc>,
}

/// Build the mirror-image draft of a committed entry: every leg's side
/// swapped, linked back to the original via `Reference::Reversal`.
pub fn reversal_draft(entry: &JournalEntry, lines: &[JournalLine], date: NaiveDate) -> EntryDraft {
    let legs = lines
        .iter()
        .map(|line| DraftLeg {
            account_id: line.account_id,
            side: line.side().opposite(),
            // Committed lines always carry a valid non-negative amount.
            amount: Amount::new(line.amount()).unwrap_or(Amount::ZERO),
        })
        .collect();
    EntryDraft::new(date, Reference::Reversal(entry.id), legs)
}
