//! # engine::ledger
//!
//! **Transaction Validator/Applier** — pure balance arithmetic.
//!
//! | kind     | precondition     | effect                                   |
//! |----------|------------------|------------------------------------------|
//! | deposit  | —                | `usd += a`                               |
//! | withdraw | `a <= usd`       | `usd -= a`                               |
//! | buy      | `a * p <= usd`   | `usd -= a * p`, `btc += a`               |
//! | sell     | `a <= btc`       | `usd += a * p`, `btc -= a`               |
//!
//! A transaction is applied in full or not at all; the input balance is never
//! touched, callers swap in the returned value.

use serde::Serialize;
use thiserror::Error;

use crate::models::{Balance, Transaction, TransactionKind};

/// Which side of the balance could not cover a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Usd,
    Btc,
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Usd => f.write_str("USD"),
            Asset::Btc => f.write_str("BTC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradeError {
    #[error("Insufficient {side} balance: need {required}, have {available}")]
    InsufficientBalance {
        side:      Asset,
        required:  f64,
        available: f64,
    },

    #[error("Market price {0} is not usable")]
    InvalidPrice(f64),

    #[error("Resulting balance is out of range")]
    Overflow,
}

/// Compute the balance after `tx` at market price `price`.
pub fn apply(balance: &Balance, price: f64, tx: &Transaction) -> Result<Balance, TradeError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(TradeError::InvalidPrice(price));
    }

    let a = tx.amount;
    let next = match tx.kind {
        TransactionKind::Deposit => Balance::new(balance.usd + a, balance.btc),

        TransactionKind::Withdraw => {
            require(Asset::Usd, a, balance.usd)?;
            Balance::new(balance.usd - a, balance.btc)
        }

        TransactionKind::Buy => {
            let cost = a * price;
            require(Asset::Usd, cost, balance.usd)?;
            Balance::new(balance.usd - cost, balance.btc + a)
        }

        TransactionKind::Sell => {
            require(Asset::Btc, a, balance.btc)?;
            Balance::new(balance.usd + a * price, balance.btc - a)
        }
    };

    // Both sides stay finite; inf - inf would turn the next step into NaN.
    if !next.usd.is_finite() || !next.btc.is_finite() {
        return Err(TradeError::Overflow);
    }
    Ok(next)
}

/// USD value moved by `tx` at `price` (the cost of a buy, proceeds of a sell).
#[inline]
pub fn notional(tx: &Transaction, price: f64) -> f64 {
    match tx.kind {
        TransactionKind::Buy | TransactionKind::Sell => tx.amount * price,
        TransactionKind::Deposit | TransactionKind::Withdraw => tx.amount,
    }
}

#[inline]
fn require(side: Asset, required: f64, available: f64) -> Result<(), TradeError> {
    if required <= available {
        Ok(())
    } else {
        Err(TradeError::InsufficientBalance { side, required, available })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const PRICE: f64 = 68500.0;

    fn tx(kind: TransactionKind, amount: f64) -> Transaction {
        Transaction::new(kind, amount).unwrap()
    }

    fn assert_close(actual: Balance, usd: f64, btc: f64) {
        assert!((actual.usd - usd).abs() < 1e-9, "usd {} != {}", actual.usd, usd);
        assert!((actual.btc - btc).abs() < 1e-12, "btc {} != {}", actual.btc, btc);
    }

    #[test]
    fn test_walkthrough_scenario() {
        let start = Balance::default();

        let b = apply(&start, PRICE, &tx(TransactionKind::Deposit, 500.0)).unwrap();
        assert_close(b, 1500.0, 0.0);

        let b = apply(&b, PRICE, &tx(TransactionKind::Buy, 0.01)).unwrap();
        assert_close(b, 815.0, 0.01);

        let b = apply(&b, PRICE, &tx(TransactionKind::Sell, 0.01)).unwrap();
        assert_close(b, 1500.0, 0.0);

        let err = apply(&b, PRICE, &tx(TransactionKind::Withdraw, 2000.0)).unwrap_err();
        assert_eq!(err, TradeError::InsufficientBalance {
            side: Asset::Usd, required: 2000.0, available: 1500.0,
        });
        assert_close(b, 1500.0, 0.0);
    }

    #[test]
    fn test_buy_beyond_cash_names_usd() {
        let err = apply(&Balance::default(), PRICE, &tx(TransactionKind::Buy, 1.0)).unwrap_err();
        assert!(matches!(err, TradeError::InsufficientBalance { side: Asset::Usd, .. }));
    }

    #[test]
    fn test_sell_beyond_holding_names_btc() {
        let err = apply(&Balance::new(0.0, 0.5), PRICE, &tx(TransactionKind::Sell, 0.6)).unwrap_err();
        assert!(matches!(err, TradeError::InsufficientBalance { side: Asset::Btc, .. }));
    }

    #[test]
    fn test_exact_amounts_drain_to_zero() {
        let b = apply(&Balance::new(100.0, 0.0), PRICE, &tx(TransactionKind::Withdraw, 100.0)).unwrap();
        assert_close(b, 0.0, 0.0);

        let b = apply(&Balance::new(685.0, 0.0), PRICE, &tx(TransactionKind::Buy, 0.01)).unwrap();
        assert!(b.usd >= 0.0);
        assert_close(b, 0.0, 0.01);

        let b = apply(&Balance::new(0.0, 0.25), PRICE, &tx(TransactionKind::Sell, 0.25)).unwrap();
        assert_close(b, 17125.0, 0.0);
    }

    #[test]
    fn test_never_negative() {
        let balances = [Balance::new(0.0, 0.0), Balance::new(10.0, 0.001), Balance::default()];
        let amounts  = [0.0001, 0.01, 1.0, 10.0, 999.99, 1000.0, 1000.01];
        let kinds    = [
            TransactionKind::Deposit, TransactionKind::Withdraw,
            TransactionKind::Buy, TransactionKind::Sell,
        ];

        for balance in balances {
            for amount in amounts {
                for kind in kinds {
                    match apply(&balance, PRICE, &tx(kind, amount)) {
                        Ok(next) => assert!(next.usd >= 0.0 && next.btc >= 0.0, "{kind} {amount} on {balance:?}"),
                        Err(TradeError::InsufficientBalance { .. }) => {}
                        Err(e) => panic!("unexpected {e}"),
                    }
                }
            }
        }
    }

    #[test]
    fn test_deposit_withdraw_round_trip() {
        let start = Balance::new(1234.5, 0.3);
        let b = apply(&start, PRICE, &tx(TransactionKind::Deposit, 250.25)).unwrap();
        let b = apply(&b, PRICE, &tx(TransactionKind::Withdraw, 250.25)).unwrap();
        assert_close(b, start.usd, start.btc);
    }

    #[test]
    fn test_buy_sell_round_trip_restores_usd() {
        let start = Balance::new(5000.0, 0.0);
        let b = apply(&start, 61234.56, &tx(TransactionKind::Buy, 0.05)).unwrap();
        let b = apply(&b, 61234.56, &tx(TransactionKind::Sell, 0.05)).unwrap();
        assert_close(b, 5000.0, 0.0);
    }

    #[test]
    fn test_rejects_unusable_price() {
        let result = apply(&Balance::default(), 0.0, &tx(TransactionKind::Deposit, 1.0));
        assert_eq!(result, Err(TradeError::InvalidPrice(0.0)));
    }

    #[test]
    fn test_rejects_non_finite_result() {
        let huge = Balance::new(1e308, 0.0);
        let result = apply(&huge, PRICE, &tx(TransactionKind::Deposit, 1e308));
        assert_eq!(result, Err(TradeError::Overflow));

        let rich = Balance::new(1.0, 1e308);
        let result = apply(&rich, 1e300, &tx(TransactionKind::Sell, 1e308));
        assert_eq!(result, Err(TradeError::Overflow));
    }

    #[test]
    fn test_notional() {
        assert!((notional(&tx(TransactionKind::Buy, 0.01), PRICE) - 685.0).abs() < 1e-9);
        assert_eq!(notional(&tx(TransactionKind::Deposit, 500.0), PRICE), 500.0);
    }
}
