//! Balance rules and the transaction pipeline built on them.

pub mod ledger;
pub mod terminal;
