//! Fund ledger domain model: per-member savings/share-capital positions and
//! deposit/withdrawal decisions with before/after balance reconciliation.

pub mod fund;

pub use fund::{FundAccount, FundDecision, FundDirection, FundKind, FundTransaction};
