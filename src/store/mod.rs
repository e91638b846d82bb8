//! # store — Balance Store Adapter
//!
//! One capability interface, [`BalanceStore`], with two implementations:
//!
//! * [`memory::MemoryBalanceStore`] — simulated mode, balance lives in process
//!   memory only. Never fails.
//! * `postgres::PgBalanceStore` (feature `postgres`) — remote record per
//!   identity with a LISTEN/NOTIFY change stream.
//!
//! Change notification is push based: [`BalanceStore::subscribe`] registers a
//! callback and hands back a [`Subscription`]. Dropping or calling
//! [`Subscription::unsubscribe`] stops delivery.
//!
//! Every write carries an [`Origin`]. A subscription never receives changes
//! written under its own origin, so a writer that already holds the value
//! cannot have it overwritten later by the echo of an older save.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Balance, Identity};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryBalanceStore;
#[cfg(feature = "postgres")]
pub use postgres::PgBalanceStore;

/// Capacity of the in-process change channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Callback invoked with the new balance every time the record changes.
pub type OnChange = Box<dyn Fn(Balance) + Send + Sync + 'static>;

// ─── Origin ───────────────────────────────────────────────────────────────────

/// Identifies the writer behind a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(Uuid);

impl Origin {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Origin {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ─── Errors / Mode ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("balance store unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Where balances are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Backed by the remote database.
    Remote,
    /// In-memory only, lost on exit.
    Simulated,
}

// ─── Capability Interface ─────────────────────────────────────────────────────

#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Return the record for `identity`, creating `{usd: 1000, btc: 0}` if absent.
    async fn load(&self, identity: &Identity) -> Result<Balance, StoreError>;

    /// Overwrite the whole record (last write wins) and notify subscribers.
    async fn save(&self, identity: &Identity, balance: Balance, origin: Origin) -> Result<(), StoreError>;

    /// Push every later change of `identity`'s record into `on_change`,
    /// except changes written under `own`.
    fn subscribe(&self, identity: &Identity, own: Origin, on_change: OnChange) -> Subscription;

    fn mode(&self) -> StoreMode;
}

// ─── Subscription Handle ──────────────────────────────────────────────────────

/// Live registration returned by [`BalanceStore::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivering changes.
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ─── Change Hub ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct BalanceChange {
    identity: Identity,
    balance:  Balance,
    origin:   Origin,
}

/// In-process fan-out of record changes, shared by both store variants.
#[derive(Debug, Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<BalanceChange>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, identity: &Identity, balance: Balance, origin: Origin) {
        // Err only means nobody is subscribed.
        let _ = self.tx.send(BalanceChange { identity: identity.clone(), balance, origin });
    }

    pub fn subscribe(&self, identity: &Identity, own: Origin, on_change: OnChange) -> Subscription {
        let mut rx = self.tx.subscribe();
        let identity = identity.clone();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) if change.identity == identity && change.origin != own => {
                        on_change(change.balance)
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(%identity, "balance subscriber lagged, skipped {n} changes");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Subscription { task: Some(task) }
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}
