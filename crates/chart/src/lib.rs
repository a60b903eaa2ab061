//! Chart of accounts: account groups, posting accounts, normal-balance sides.
//!
//! This crate contains business rules only (no IO, no storage). Running
//! balances are mutated exclusively by the posting engine.

pub mod account;

pub use account::{Account, AccountGroup, AccountType, Side};
