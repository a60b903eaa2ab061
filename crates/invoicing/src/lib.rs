//! Invoice settlement domain model: allocating payments received against
//! open invoice lines, split into principal and trade-markup portions.

pub mod settlement;

pub use settlement::{AllocationDecision, InvoiceLine, LinePayment};
