//! Strongly-typed identifiers used across the ledger.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

macro_rules! impl_uuid_newtype {
    ($(#[$doc:meta])* $t:ident, $name:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in
            /// tests for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| LedgerError::validation(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(
    /// Identifier of a cooperative member.
    MemberId,
    "MemberId"
);
impl_uuid_newtype!(
    /// Identifier of a top-level account group (Assets, Liability, ...).
    AccountGroupId,
    "AccountGroupId"
);
impl_uuid_newtype!(
    /// Identifier of a posting-eligible ledger account.
    ///
    /// `Ord` matters here: entry legs are locked in ascending account-id
    /// order before any balance is mutated.
    AccountId,
    "AccountId"
);
impl_uuid_newtype!(
    /// Identifier of a committed journal entry.
    JournalEntryId,
    "JournalEntryId"
);
impl_uuid_newtype!(
    /// Identifier of a loan.
    LoanId,
    "LoanId"
);
impl_uuid_newtype!(
    /// Identifier of one repayment schedule line.
    ScheduleLineId,
    "ScheduleLineId"
);
impl_uuid_newtype!(
    /// Identifier of a member's fund account (savings + share capital).
    FundId,
    "FundId"
);
impl_uuid_newtype!(
    /// Identifier of one applied fund transaction.
    FundTransactionId,
    "FundTransactionId"
);
impl_uuid_newtype!(
    /// Identifier of an invoice line.
    InvoiceLineId,
    "InvoiceLineId"
);
impl_uuid_newtype!(
    /// Identifier of one payment allocated against an invoice line.
    PaymentId,
    "PaymentId"
);
impl_uuid_newtype!(
    /// Identifier of a declared dividend.
    DividendId,
    "DividendId"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display_and_parse_round_trip() {
        let id = AccountId::new();
        let parsed: AccountId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn malformed_id_is_rejected() {
        let err = "not-a-uuid".parse::<LoanId>().unwrap_err();
        match err {
            LedgerError::Validation(msg) if msg.contains("LoanId") => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn serde_is_transparent() {
        let id = MemberId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
