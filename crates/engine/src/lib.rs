//! Posting engine: the single writer for all ledger state.
//!
//! Domain crates decide; this crate stores, locks, and commits. Every
//! mutating operation acquires per-entity locks, validates against a
//! snapshot, and applies its row changes in one atomic section, so no
//! partial state is ever observable.

pub mod config;
pub mod engine;
pub mod lock;
pub mod state;

#[cfg(test)]
mod integration_tests;

pub use config::{EngineConfig, PostingAccounts};
pub use engine::PostingEngine;
pub use lock::{LockKey, LockTable};
