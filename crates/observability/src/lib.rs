//! Shared tracing setup for ledger binaries and test harnesses.

pub mod tracing;

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}
