//! # models::transaction
//!
//! Transient transaction input. A [`TransactionRequest`] arrives from the
//! client with a raw amount (number or text field contents); validation turns
//! it into a [`Transaction`] whose amount is guaranteed positive and finite.
//! Nothing here is ever persisted.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Kind ─────────────────────────────────────────────────────────────────────

/// The four operations the terminal offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Add USD cash. Amount in USD.
    Deposit,
    /// Remove USD cash. Amount in USD.
    Withdraw,
    /// Spend USD on BTC at market. Amount in BTC.
    Buy,
    /// Turn BTC into USD at market. Amount in BTC.
    Sell,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionKind::Deposit  => "deposit",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::Buy      => "buy",
            TransactionKind::Sell     => "sell",
        };
        f.write_str(s)
    }
}

// ─── Amount ───────────────────────────────────────────────────────────────────

/// Why an amount was refused before reaching the ledger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AmountError {
    #[error("amount is required")]
    Empty,

    #[error("amount '{0}' is not a number")]
    NotANumber(String),

    #[error("amount must be a finite number")]
    NotFinite,

    #[error("amount must be greater than zero (got {0})")]
    NotPositive(f64),
}

/// Raw amount as the client sent it: a JSON number or the text of an input box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

impl AmountInput {
    /// Parse into a positive finite `f64`.
    pub fn parse(&self) -> Result<f64, AmountError> {
        let value = match self {
            AmountInput::Number(n) => *n,
            AmountInput::Text(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(AmountError::Empty);
                }
                trimmed
                    .parse::<f64>()
                    .map_err(|_| AmountError::NotANumber(trimmed.to_string()))?
            }
        };
        check_amount(value)
    }
}

fn check_amount(value: f64) -> Result<f64, AmountError> {
    if !value.is_finite() {
        return Err(AmountError::NotFinite);
    }
    if value <= 0.0 {
        return Err(AmountError::NotPositive(value));
    }
    Ok(value)
}

// ─── Request / Validated Transaction ──────────────────────────────────────────

/// Body of `POST /api/transactions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub kind:   TransactionKind,
    pub amount: AmountInput,
}

impl TransactionRequest {
    pub fn validate(&self) -> Result<Transaction, AmountError> {
        Transaction::new(self.kind, self.amount.parse()?)
    }
}

/// A request whose amount passed input validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transaction {
    pub kind:   TransactionKind,
    pub amount: f64,
}

impl Transaction {
    pub fn new(kind: TransactionKind, amount: f64) -> Result<Self, AmountError> {
        Ok(Self { kind, amount: check_amount(amount)? })
    }
}
