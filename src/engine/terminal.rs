//! # engine::terminal
//!
//! **Transaction pipeline** — wires the pure ledger to the session state.
//!
//! ## ลำดับ (ทุก Transaction)
//! ```text
//! 1. Gate         — one transaction in flight, else Busy
//! 2. Validate     — amount positive + finite, else InvalidAmount (no notice, inline)
//! 3. Price        — whatever the poller holds right now
//! 4. Apply        — ledger::apply, else Rejected + error notice
//! 5. Commit       — swap cached balance, broadcast BALANCE_UPDATED
//! 6. Persist      — store.save; failure → error notice, no rollback
//! 7. Confirm      — TRANSACTION_APPLIED + success notice
//! ```

use std::sync::{atomic::Ordering, Arc};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    engine::ledger,
    error::AppError,
    events::WsEvent,
    models::{Balance, Transaction, TransactionKind, TransactionRequest},
    state::SharedState,
    store::Subscription,
};

/// What the caller gets back for an accepted transaction.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub transaction_id: Uuid,
    pub kind:           TransactionKind,
    pub amount:         f64,
    pub price:          f64,
    /// USD moved: cost of a buy, proceeds of a sell, the amount otherwise
    pub notional:       f64,
    pub balance:        Balance,
    /// `false` when the store write failed (in-memory balance kept anyway)
    pub persisted:      bool,
}

pub async fn submit(state: &SharedState, request: &TransactionRequest) -> Result<Receipt, AppError> {
    // ── 1. Gate ───────────────────────────────────────────────────────────────
    let _gate = state.tx_gate.try_lock().map_err(|_| AppError::Busy)?;

    // ── 2. Validate ───────────────────────────────────────────────────────────
    let tx = request.validate()?;

    // ── 3. Price at submit time ───────────────────────────────────────────────
    let price = state.price.latest();

    // ── 4. Apply ──────────────────────────────────────────────────────────────
    let current = state.current_balance();
    let next = match ledger::apply(&current, price, &tx) {
        Ok(next) => next,
        Err(e) => {
            warn!(kind = %tx.kind, amount = tx.amount, price, reason = %e, "❌ Transaction rejected");
            state.notices.error(e.to_string()).await;
            return Err(e.into());
        }
    };

    // ── 5. Commit ─────────────────────────────────────────────────────────────
    state.set_balance(next);
    state.transaction_count.fetch_add(1, Ordering::Relaxed);

    // ── 6. Persist ────────────────────────────────────────────────────────────
    let persisted = match state.store.save(&state.identity, next, state.writer).await {
        Ok(()) => true,
        Err(e) => {
            error!(identity = %state.identity, error = %e, "💾 Balance save failed — keeping in-memory value");
            state.notices.error(format!("Balance could not be saved: {e}")).await;
            false
        }
    };

    // ── 7. Confirm ────────────────────────────────────────────────────────────
    let receipt = Receipt {
        transaction_id: Uuid::new_v4(),
        kind:           tx.kind,
        amount:         tx.amount,
        price,
        notional:       ledger::notional(&tx, price),
        balance:        next,
        persisted,
    };

    state.broadcast(&WsEvent::TransactionApplied {
        transaction_id: receipt.transaction_id,
        kind:           receipt.kind,
        amount:         receipt.amount,
        price,
        balance:        next,
        persisted,
    });
    state.notices.success(describe(&tx, price)).await;

    info!(
        transaction_id = %receipt.transaction_id,
        kind = %tx.kind,
        amount = tx.amount,
        price,
        usd = next.usd,
        btc = next.btc,
        persisted,
        "✅ Transaction applied"
    );

    Ok(receipt)
}

/// User-facing confirmation line.
pub fn describe(tx: &Transaction, price: f64) -> String {
    match tx.kind {
        TransactionKind::Deposit  => format!("Deposited ${:.2}", tx.amount),
        TransactionKind::Withdraw => format!("Withdrew ${:.2}", tx.amount),
        TransactionKind::Buy      => format!("Bought {:.8} BTC for ${:.2}", tx.amount, tx.amount * price),
        TransactionKind::Sell     => format!("Sold {:.8} BTC for ${:.2}", tx.amount, tx.amount * price),
    }
}

// ─── Background wiring ────────────────────────────────────────────────────────

/// Follow store changes for our identity made by other writers.
pub fn watch_balance(state: &SharedState) -> Subscription {
    let target = Arc::clone(state);
    state.store.subscribe(
        &state.identity,
        state.writer,
        Box::new(move |balance| {
            debug!(usd = balance.usd, btc = balance.btc, "balance change from store");
            target.set_balance(balance);
        }),
    )
}

/// Re-broadcast every price the poller publishes as `PRICE_UPDATED`.
pub fn spawn_price_relay(state: &SharedState) -> JoinHandle<()> {
    let state = Arc::clone(state);
    let mut rx = state.price.subscribe();

    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let quote = *rx.borrow_and_update();
            state.broadcast(&WsEvent::PriceUpdated { quote });
        }
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::{
        engine::ledger::{Asset, TradeError},
        models::{transaction::AmountInput, Identity},
        price::PriceFeed,
        session::Session,
        state::AppState,
        store::{BalanceStore, MemoryBalanceStore, OnChange, Origin, StoreError, StoreMode},
    };

    fn make_state(store: Arc<dyn BalanceStore>, balance: Balance) -> SharedState {
        Arc::new(AppState::new(
            Session::Degraded { reason: "test".into() },
            Identity::local(),
            store,
            balance,
            PriceFeed::new(68500.0),
            Duration::from_secs(5),
        ))
    }

    fn request(kind: TransactionKind, amount: &str) -> TransactionRequest {
        TransactionRequest { kind, amount: AmountInput::Text(amount.into()) }
    }

    /// Store whose writes always fail.
    struct FailingStore(MemoryBalanceStore);

    #[async_trait]
    impl BalanceStore for FailingStore {
        async fn load(&self, identity: &Identity) -> Result<Balance, StoreError> {
            self.0.load(identity).await
        }
        async fn save(&self, _: &Identity, _: Balance, _: Origin) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("write refused".into()))
        }
        fn subscribe(&self, identity: &Identity, own: Origin, on_change: OnChange) -> Subscription {
            self.0.subscribe(identity, own, on_change)
        }
        fn mode(&self) -> StoreMode {
            StoreMode::Remote
        }
    }

    #[tokio::test]
    async fn test_walkthrough_persists_each_step() {
        let store = Arc::new(MemoryBalanceStore::new());
        let state = make_state(store.clone(), Balance::default());

        submit(&state, &request(TransactionKind::Deposit, "500")).await.unwrap();
        assert_eq!(state.current_balance(), Balance::new(1500.0, 0.0));

        let receipt = submit(&state, &request(TransactionKind::Buy, "0.01")).await.unwrap();
        assert!((receipt.notional - 685.0).abs() < 1e-9);
        assert!((state.current_balance().usd - 815.0).abs() < 1e-9);

        submit(&state, &request(TransactionKind::Sell, "0.01")).await.unwrap();
        let err = submit(&state, &request(TransactionKind::Withdraw, "2000")).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Rejected(TradeError::InsufficientBalance { side: Asset::Usd, .. })
        ));

        let after = state.current_balance();
        assert!((after.usd - 1500.0).abs() < 1e-9);
        assert_eq!(after.btc, 0.0);
        assert_eq!(store.load(&Identity::local()).await.unwrap(), after);
        assert_eq!(state.transaction_count.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_invalid_amount_touches_nothing() {
        let state = make_state(Arc::new(MemoryBalanceStore::new()), Balance::default());

        for bad in ["", "abc", "0", "-5"] {
            let err = submit(&state, &request(TransactionKind::Deposit, bad)).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidAmount(_)), "{bad:?}");
        }

        assert_eq!(state.current_balance(), Balance::default());
        assert!(state.notices.active().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_posts_error_notice() {
        let state = make_state(Arc::new(MemoryBalanceStore::new()), Balance::default());

        submit(&state, &request(TransactionKind::Sell, "1")).await.unwrap_err();

        let notices = state.notices.active().await;
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains("BTC"));
        assert_eq!(state.current_balance(), Balance::default());
    }

    #[tokio::test]
    async fn test_busy_while_transaction_in_flight() {
        let state = make_state(Arc::new(MemoryBalanceStore::new()), Balance::default());
        let _held = state.tx_gate.lock().await;

        let err = submit(&state, &request(TransactionKind::Deposit, "1")).await.unwrap_err();

        assert!(matches!(err, AppError::Busy));
        assert_eq!(state.current_balance(), Balance::default());
    }

    #[tokio::test]
    async fn test_save_failure_keeps_in_memory_balance() {
        let state = make_state(Arc::new(FailingStore(MemoryBalanceStore::new())), Balance::default());

        let receipt = submit(&state, &request(TransactionKind::Deposit, "250")).await.unwrap();

        assert!(!receipt.persisted);
        assert_eq!(state.current_balance(), Balance::new(1250.0, 0.0));
        let notices = state.notices.active().await;
        assert!(notices.iter().any(|n| n.message.contains("could not be saved")));
    }

    #[tokio::test]
    async fn test_uses_price_at_submit_time() {
        let state = make_state(Arc::new(MemoryBalanceStore::new()), Balance::new(10_000.0, 0.0));

        let receipt = submit(&state, &request(TransactionKind::Buy, "0.1")).await.unwrap();

        assert_eq!(receipt.price, state.price.latest());
        assert!((receipt.balance.usd - (10_000.0 - 6850.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_store_changes_flow_into_cache() {
        let store = Arc::new(MemoryBalanceStore::new());
        let state = make_state(store.clone(), Balance::default());
        let mut rx = state.balance.subscribe();
        let _sub = watch_balance(&state);

        store.save(&Identity::local(), Balance::new(3.0, 0.5), Origin::new()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), rx.changed()).await.unwrap().unwrap();
        assert_eq!(state.current_balance(), Balance::new(3.0, 0.5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deposits_are_not_lost() {
        const SUBMITTERS: usize = 8;
        const DEPOSITS: usize = 100;

        let store = Arc::new(MemoryBalanceStore::new());
        let state = make_state(store.clone(), Balance::default());
        let _sub = watch_balance(&state);

        let mut tasks = Vec::new();
        for _ in 0..SUBMITTERS {
            let state = Arc::clone(&state);
            tasks.push(tokio::spawn(async move {
                let mut accepted = 0;
                while accepted < DEPOSITS {
                    match submit(&state, &request(TransactionKind::Deposit, "1")).await {
                        Ok(_) => accepted += 1,
                        Err(AppError::Busy) => tokio::task::yield_now().await,
                        Err(e) => panic!("unexpected rejection: {e}"),
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        // Let any stray change callbacks run before reading the cache.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let expected = Balance::new(1000.0 + (SUBMITTERS * DEPOSITS) as f64, 0.0);
        assert_eq!(state.current_balance(), expected);
        assert_eq!(store.load(&Identity::local()).await.unwrap(), expected);
        assert_eq!(state.transaction_count.load(Ordering::Relaxed), (SUBMITTERS * DEPOSITS) as u64);
    }

    #[tokio::test]
    async fn test_own_saves_do_not_reach_cache_through_store() {
        let store = Arc::new(MemoryBalanceStore::new());
        let state = make_state(store.clone(), Balance::default());
        let mut rx = state.balance.subscribe();
        let _sub = watch_balance(&state);

        store.save(&Identity::local(), Balance::new(1.0, 0.0), state.writer).await.unwrap();

        let got = tokio::time::timeout(Duration::from_millis(100), rx.changed()).await;
        assert!(got.is_err());
        assert_eq!(state.current_balance(), Balance::default());
    }

    #[tokio::test]
    async fn test_overflowing_deposit_is_rejected() {
        let store = Arc::new(MemoryBalanceStore::new());
        let state = make_state(store.clone(), Balance::default());

        submit(&state, &request(TransactionKind::Deposit, "1e308")).await.unwrap();
        let err = submit(&state, &request(TransactionKind::Deposit, "1e308")).await.unwrap_err();
        assert!(matches!(err, AppError::Rejected(TradeError::Overflow)));
        assert_eq!(err.kind(), "overflow");

        let after = state.current_balance();
        assert!(after.usd.is_finite() && after.btc.is_finite());
        assert_eq!(store.load(&Identity::local()).await.unwrap(), after);
    }

    #[test]
    fn test_describe() {
        let tx = Transaction::new(TransactionKind::Buy, 0.01).unwrap();
        assert_eq!(describe(&tx, 68500.0), "Bought 0.01000000 BTC for $685.00");
        let tx = Transaction::new(TransactionKind::Deposit, 500.0).unwrap();
        assert_eq!(describe(&tx, 68500.0), "Deposited $500.00");
    }
}
