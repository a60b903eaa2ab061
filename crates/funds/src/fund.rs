use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use coopledger_core::{
    Amount, FundId, FundTransactionId, JournalEntryId, LedgerError, LedgerResult, MemberId,
};

/// Which of the member's two positions a transaction touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FundKind {
    Savings,
    ShareCapital,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundDirection {
    Deposit,
    Withdrawal,
}

/// A member's savings/share-capital position.
///
/// Invariant: each balance equals its opening value plus the sum of all
/// applied transactions of that kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundAccount {
    pub id: FundId,
    pub member: MemberId,
    pub savings_balance: Amount,
    pub share_capital_balance: Amount,
    pub updated_at: DateTime<Utc>,
}

impl FundAccount {
    pub fn open(id: FundId, member: MemberId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            member,
            savings_balance: Amount::ZERO,
            share_capital_balance: Amount::ZERO,
            updated_at: now,
        }
    }

    pub fn balance(&self, kind: FundKind) -> Amount {
        match kind {
            FundKind::Savings => self.savings_balance,
            FundKind::ShareCapital => self.share_capital_balance,
        }
    }

    /// Decide a deposit/withdrawal. No mutation; the posting engine applies
    /// the decision atomically with its journal entry.
    ///
    /// `expected_posted` is the optimistic-concurrency check: when the caller
    /// captured the balance outside the engine's critical section, a mismatch
    /// fails `StaleBalance` and must be retried with a fresh read, never
    /// silently overwritten.
    pub fn decide(
        &self,
        kind: FundKind,
        direction: FundDirection,
        amount: Amount,
        expected_posted: Option<Decimal>,
    ) -> LedgerResult<FundDecision> {
        if amount.is_zero() {
            return Err(LedgerError::validation(
                "fund transaction amount must be positive",
            ));
        }
        let posted = self.balance(kind);
        if let Some(expected) = expected_posted {
            if expected != posted.value() {
                return Err(LedgerError::StaleBalance {
                    expected,
                    actual: posted.value(),
                });
            }
        }
        let new_balance = match direction {
            FundDirection::Deposit => {
                posted
                    .checked_add(amount)
                    .ok_or_else(|| LedgerError::validation("fund balance overflow"))?
            }
            FundDirection::Withdrawal => {
                posted
                    .checked_sub(amount)
                    .ok_or(LedgerError::InsufficientFunds {
                        requested: amount.value(),
                        available: posted.value(),
                    })?
            }
        };
        Ok(FundDecision {
            kind,
            direction,
            amount,
            posted_balance: posted,
            new_balance,
        })
    }

    /// Apply a previously decided transaction.
    pub fn apply(&mut self, decision: &FundDecision, now: DateTime<Utc>) {
        match decision.kind {
            FundKind::Savings => self.savings_balance = decision.new_balance,
            FundKind::ShareCapital => self.share_capital_balance = decision.new_balance,
        }
        self.updated_at = now;
    }
}

/// What a successful deposit/withdrawal changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundDecision {
    pub kind: FundKind,
    pub direction: FundDirection,
    pub amount: Amount,
    /// Balance at submission time (the "pre" side of the reconciliation).
    pub posted_balance: Amount,
    /// `posted_balance ± amount`.
    pub new_balance: Amount,
}

/// One applied deposit/withdrawal. Immutable once applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundTransaction {
    pub id: FundTransactionId,
    pub fund_id: FundId,
    pub kind: FundKind,
    pub direction: FundDirection,
    pub amount: Amount,
    pub posted_balance: Amount,
    pub new_balance: Amount,
    pub journal_entry: Option<JournalEntryId>,
    pub created_at: DateTime<Utc>,
}

impl FundTransaction {
    pub fn from_decision(
        id: FundTransactionId,
        fund_id: FundId,
        decision: &FundDecision,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            fund_id,
            kind: decision.kind,
            direction: decision.direction,
            amount: decision.amount,
            posted_balance: decision.posted_balance,
            new_balance: decision.new_balance,
            journal_entry: None,
            created_at: now,
        }
    }
}
