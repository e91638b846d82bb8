//! Domain models shared across the terminal.

pub mod balance;
pub mod transaction;

pub use balance::{Balance, Identity};
pub use transaction::{AmountError, Transaction, TransactionKind, TransactionRequest};
