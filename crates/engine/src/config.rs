//! Engine configuration: well-known posting accounts and lock policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use coopledger_core::AccountId;

/// The chart accounts engine operations post against.
///
/// These are ordinary accounts created through the chart API; the engine only
/// needs to know which account plays which role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingAccounts {
    /// Cash/bank asset account money moves through.
    pub cash: AccountId,
    /// Asset account carrying outstanding loan principal.
    pub loans_receivable: AccountId,
    /// Revenue account for loan interest.
    pub interest_income: AccountId,
    /// Liability account backing member savings.
    pub savings_liability: AccountId,
    /// Liability account backing member share capital.
    pub share_capital_liability: AccountId,
    /// Asset account carrying unpaid invoice principal.
    pub trade_receivable: AccountId,
    /// Revenue account for invoice trade markup.
    pub markup_income: AccountId,
    /// Equity account dividends are declared out of.
    pub retained_earnings: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub accounts: PostingAccounts,
    /// Per-entity lock acquisition timeout; expiry surfaces a retryable
    /// `Busy` instead of deadlocking.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: Duration,
}

impl EngineConfig {
    pub fn new(accounts: PostingAccounts) -> Self {
        Self {
            accounts,
            lock_timeout: default_lock_timeout(),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(2)
}
