//! Dividend poster domain model: one-shot equity credits against a member's
//! share. Declaring twice for the same member/account/date is a caller error,
//! not silently deduplicated; the engine exposes a lookup for callers to
//! check first.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use coopledger_core::{
    AccountId, Amount, DividendId, JournalEntryId, LedgerError, LedgerResult, MemberId,
};

/// A declared dividend. Created once; immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dividend {
    pub id: DividendId,
    pub member: MemberId,
    /// Equity account the dividend is credited against.
    pub account_id: AccountId,
    pub amount: Amount,
    pub date: NaiveDate,
    pub journal_entry: Option<JournalEntryId>,
}

impl Dividend {
    pub fn declare(
        id: DividendId,
        member: MemberId,
        account_id: AccountId,
        amount: Amount,
        date: NaiveDate,
    ) -> LedgerResult<Self> {
        if amount.is_zero() {
            return Err(LedgerError::validation("dividend amount must be positive"));
        }
        Ok(Self {
            id,
            member,
            account_id,
            amount,
            date,
            journal_entry: None,
        })
    }

    /// True when this row matches a prospective duplicate declaration.
    pub fn matches(&self, member: MemberId, account_id: AccountId, date: NaiveDate) -> bool {
        self.member == member && self.account_id == account_id && self.date == date
    }
}
