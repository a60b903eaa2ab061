//! Journal engine domain model: entry drafts, balance validation, committed
//! entries and lines, reversing entries.
//!
//! This crate decides; it never writes. The posting engine resolves accounts,
//! serializes per-account updates, and commits the rows this crate produces.

pub mod entry;

pub use entry::{reversal_draft, DraftLeg, EntryDraft, JournalEntry, JournalLine, Reference};
