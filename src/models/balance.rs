//! # models::balance
//!
//! Defines [`Balance`] — the only persistent entity in the terminal: a USD
//! cash amount and a BTC holding, keyed 1:1 by an [`Identity`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// USD credited to an identity the first time it is seen.
pub const DEFAULT_USD: f64 = 1000.0;

/// BTC credited to an identity the first time it is seen.
pub const DEFAULT_BTC: f64 = 0.0;

// ─── Identity ─────────────────────────────────────────────────────────────────

/// Opaque key of a balance record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Key used for the in-memory record when no backend identity exists.
    pub const LOCAL: &'static str = "local";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn local() -> Self {
        Self(Self::LOCAL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Balance ──────────────────────────────────────────────────────────────────

/// Cash and coin held by one identity.
///
/// Both fields stay `>= 0` after every accepted transaction; the ledger
/// rejects anything that would break that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// USD cash.
    pub usd: f64,
    /// Bitcoin held, in BTC.
    pub btc: f64,
}

impl Balance {
    pub fn new(usd: f64, btc: f64) -> Self {
        Self { usd, btc }
    }

    /// Mark-to-market value in USD: `usd + btc * price`.
    #[inline]
    pub fn portfolio_value(&self, price: f64) -> f64 {
        self.usd + self.btc * price
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self { usd: DEFAULT_USD, btc: DEFAULT_BTC }
    }
}
