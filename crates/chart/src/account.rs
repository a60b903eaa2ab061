use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use coopledger_core::{AccountGroupId, AccountId, Amount, LedgerError, LedgerResult};

/// Debit or credit side of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Debit,
    Credit,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Debit => Side::Credit,
            Side::Credit => Side::Debit,
        }
    }
}

/// Top-level account classification (determines normal balance side).
///
/// The type is immutable once postings exist: changing an account's
/// normal-balance side would silently invalidate historical balances, so no
/// mutation API exists at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountType {
    Assets,
    ContraAssets,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// The side on which accounts of this type increase.
    ///
    /// Contra-assets invert the asset convention.
    pub fn normal_side(self) -> Side {
        match self {
            AccountType::Assets | AccountType::Expense => Side::Debit,
            AccountType::ContraAssets
            | AccountType::Liability
            | AccountType::Equity
            | AccountType::Revenue => Side::Credit,
        }
    }
}

/// Top-level grouping in the chart (e.g. "Current Assets").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountGroup {
    pub id: AccountGroupId,
    pub account_type: AccountType,
    pub name: String,
}

/// A posting-eligible ledger account.
///
/// `running_balance` is oriented toward the account's normal side: a
/// debit-normal account with more credits than debits carries a negative
/// running balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub group_id: AccountGroupId,
    pub name: String,
    pub account_type: AccountType,
    pub opening_balance: Decimal,
    pub running_balance: Decimal,
    pub active: bool,
}

impl Account {
    pub fn new(
        id: AccountId,
        group: &AccountGroup,
        name: impl Into<String>,
        opening_balance: Decimal,
    ) -> Self {
        Self {
            id,
            group_id: group.id,
            name: name.into(),
            account_type: group.account_type,
            opening_balance,
            running_balance: opening_balance,
            active: true,
        }
    }

    pub fn normal_side(&self) -> Side {
        self.account_type.normal_side()
    }

    /// Fails `InactiveAccount` when the account is deactivated.
    pub fn ensure_postable(&self) -> LedgerResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(LedgerError::InactiveAccount(self.id))
        }
    }

    /// Signed effect of one leg on this account's running balance.
    pub fn signed_delta(&self, side: Side, amount: Amount) -> Decimal {
        if side == self.normal_side() {
            amount.value()
        } else {
            -amount.value()
        }
    }

    /// Apply one leg to the running balance.
    ///
    /// Called only by the posting engine, inside a committed entry.
    pub fn apply_leg(&mut self, side: Side, amount: Amount) {
        self.running_balance += self.signed_delta(side, amount);
    }
}
