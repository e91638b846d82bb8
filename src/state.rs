//! # state
//!
//! AppState — single source of truth for one terminal session: who we are,
//! where balances live, the cached balance, the latest price and the push
//! channel to observers.
//!
//! The cached balance sits in a `watch` channel so that both the transaction
//! path and the store's change callback (a plain sync closure) can update it
//! without an async lock.

use std::{
    sync::{atomic::AtomicU64, Arc},
    time::Duration,
};

use tokio::sync::{broadcast, watch, Mutex};
use tracing::{info, warn};

use crate::{
    config::Config,
    events::WsEvent,
    models::{Balance, Identity},
    notice::NoticeBoard,
    price::PriceFeed,
    session::{self, Session},
    store::{BalanceStore, MemoryBalanceStore, Origin, StoreMode},
};

// ─── AppState ─────────────────────────────────────────────────────────────────

/// Top-level shared state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    // ── Session ───────────────────────────────────────────────────────────────
    pub session:  Session,
    /// Key of the balance record (`local` in simulated mode)
    pub identity: Identity,
    /// Persistent warning while simulated; `None` when remote
    pub warning:  Option<String>,

    // ── Balance ───────────────────────────────────────────────────────────────
    pub store:   Arc<dyn BalanceStore>,
    /// Tags our own saves so the store subscription skips their echo
    pub writer:  Origin,
    pub balance: Arc<watch::Sender<Balance>>,
    /// One outstanding transaction at a time
    pub tx_gate: Arc<Mutex<()>>,

    // ── Market ────────────────────────────────────────────────────────────────
    pub price: PriceFeed,

    // ── Monitor / WebSocket ───────────────────────────────────────────────────
    /// Pre-serialized JSON events for `/ws/terminal`
    pub broadcast_tx: broadcast::Sender<String>,
    pub notices:      NoticeBoard,

    // ── Metrics ───────────────────────────────────────────────────────────────
    pub transaction_count: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        session:    Session,
        identity:   Identity,
        store:      Arc<dyn BalanceStore>,
        balance:    Balance,
        price:      PriceFeed,
        notice_ttl: Duration,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        let (balance_tx, _) = watch::channel(balance);

        let warning = session.warning().or_else(|| match store.mode() {
            StoreMode::Simulated => Some(
                "Running in simulated mode — balances are kept in memory only (no database)".into(),
            ),
            StoreMode::Remote => None,
        });

        Self {
            session,
            identity,
            warning,
            store,
            writer: Origin::new(),
            balance: Arc::new(balance_tx),
            tx_gate: Arc::new(Mutex::new(())),
            price,
            notices: NoticeBoard::new(notice_ttl, broadcast_tx.clone()),
            broadcast_tx,
            transaction_count: Arc::new(AtomicU64::new(0)),
        }
    }

    // ── Helper Methods ────────────────────────────────────────────────────────

    /// Broadcast WsEvent ไปยัง WebSocket clients ทั้งหมด
    /// ไม่ panic ถ้าไม่มี listener
    pub fn broadcast(&self, event: &WsEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }

    pub fn current_balance(&self) -> Balance {
        *self.balance.borrow()
    }

    pub fn mode(&self) -> StoreMode {
        self.store.mode()
    }

    /// Replace the cached balance and notify observers if it changed.
    pub fn set_balance(&self, next: Balance) {
        let changed = self.balance.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            self.broadcast(&WsEvent::BalanceUpdated {
                balance:         next,
                portfolio_value: next.portfolio_value(self.price.latest()),
            });
        }
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

// ─── Bootstrap ────────────────────────────────────────────────────────────────

/// Session → store → initial balance. Every failure degrades to simulated mode.
pub async fn build_state(config: &Config, client: &reqwest::Client) -> SharedState {
    let session = session::bootstrap(client, &config.session).await;
    let price = PriceFeed::new(config.price.fallback_price);

    if let Some(identity) = session.identity().cloned() {
        if let Some(store) = open_remote_store(config.database_url.as_deref()).await {
            match store.load(&identity).await {
                Ok(balance) => {
                    info!(%identity, usd = balance.usd, btc = balance.btc, "💰 Balance loaded from remote store");
                    return Arc::new(AppState::new(session, identity, store, balance, price, config.notice_ttl));
                }
                Err(e) => warn!(error = %e, "⚠️ Remote balance load failed — using in-memory store"),
            }
        }
    }

    let store: Arc<dyn BalanceStore> = Arc::new(MemoryBalanceStore::new());
    let identity = session.identity().cloned().unwrap_or_else(Identity::local);
    let balance = match store.load(&identity).await {
        Ok(balance) => balance,
        Err(_) => Balance::default(),
    };

    info!(%identity, usd = balance.usd, btc = balance.btc, "💰 Simulated balance initialised");
    Arc::new(AppState::new(session, identity, store, balance, price, config.notice_ttl))
}

#[cfg(feature = "postgres")]
async fn open_remote_store(database_url: Option<&str>) -> Option<Arc<dyn BalanceStore>> {
    let url = database_url?;
    match crate::store::PgBalanceStore::connect(url).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, "⚠️ Database unreachable — falling back to simulated mode");
            None
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn open_remote_store(database_url: Option<&str>) -> Option<Arc<dyn BalanceStore>> {
    if database_url.is_some() {
        warn!("DATABASE_URL set but built without the `postgres` feature — ignoring");
    }
    None
}

// ─── Tests ────────────────────────────────────────────────────────────────────
