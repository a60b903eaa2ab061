use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use coopledger_core::{
    Amount, InvoiceLineId, JournalEntryId, LedgerError, LedgerResult, MemberId, PaymentId,
};

/// An open invoice line owed by a member.
///
/// Invariant: `is_totally_paid` is true iff cumulative principal paid equals
/// `principal_price * quantity`. The flag flips once and never reverts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: InvoiceLineId,
    pub member: MemberId,
    pub description: String,
    /// Principal (cost) price per unit.
    pub principal_price: Amount,
    /// Trade markup per unit; settled as interest/markup income.
    pub trade_markup: Amount,
    pub quantity: u32,
    pub principal_paid_total: Amount,
    pub is_totally_paid: bool,
}

impl InvoiceLine {
    pub fn new(
        id: InvoiceLineId,
        member: MemberId,
        description: impl Into<String>,
        principal_price: Amount,
        trade_markup: Amount,
        quantity: u32,
    ) -> LedgerResult<Self> {
        if quantity == 0 {
            return Err(LedgerError::validation(
                "invoice line quantity must be positive",
            ));
        }
        if principal_price.is_zero() {
            return Err(LedgerError::validation(
                "invoice line principal price must be positive",
            ));
        }
        Ok(Self {
            id,
            member,
            description: description.into(),
            principal_price,
            trade_markup,
            quantity,
            principal_paid_total: Amount::ZERO,
            is_totally_paid: false,
        })
    }

    /// Total principal owed: `principal_price * quantity`.
    pub fn total_owed(&self) -> Decimal {
        self.principal_price.value() * Decimal::from(self.quantity)
    }

    /// Decide one payment allocation. No mutation; the posting engine applies
    /// the decision atomically with its journal entry.
    pub fn decide_allocation(
        &self,
        principal_paid: Amount,
        interest_paid: Amount,
    ) -> LedgerResult<AllocationDecision> {
        if principal_paid.is_zero() && interest_paid.is_zero() {
            return Err(LedgerError::validation("payment must be positive"));
        }
        let owed = self.total_owed();
        let cumulative = self.principal_paid_total.value() + principal_paid.value();
        if cumulative > owed {
            return Err(LedgerError::OverAllocation { cumulative, owed });
        }
        Ok(AllocationDecision {
            principal_paid,
            interest_paid,
            new_principal_paid_total: Amount::new(cumulative)?,
            fully_paid: cumulative == owed,
        })
    }

    /// Apply a previously decided allocation.
    pub fn apply_allocation(&mut self, decision: &AllocationDecision) {
        self.principal_paid_total = decision.new_principal_paid_total;
        if decision.fully_paid {
            self.is_totally_paid = true;
        }
    }
}

/// What a successful allocation changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationDecision {
    pub principal_paid: Amount,
    pub interest_paid: Amount,
    pub new_principal_paid_total: Amount,
    pub fully_paid: bool,
}

/// One payment allocated against an invoice line. Immutable.
///
/// The journal lines behind `journal_entry` sum to
/// `principal_paid + interest_paid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePayment {
    pub id: PaymentId,
    pub invoice_line_id: InvoiceLineId,
    pub principal_paid: Amount,
    pub interest_paid: Amount,
    pub journal_entry: Option<JournalEntryId>,
    pub paid_at: DateTime<Utc>,
}
