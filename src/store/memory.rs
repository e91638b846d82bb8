//! # store::memory
//!
//! Simulated-mode store: the balance lives in a `HashMap` for the lifetime of
//! the process. Used whenever no backend identity or database is reachable.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{BalanceStore, ChangeHub, OnChange, Origin, StoreError, StoreMode, Subscription};
use crate::models::{Balance, Identity};

#[derive(Debug, Default)]
pub struct MemoryBalanceStore {
    records: RwLock<HashMap<Identity, Balance>>,
    hub:     ChangeHub,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn load(&self, identity: &Identity) -> Result<Balance, StoreError> {
        let mut records = self.records.write().await;
        let balance = *records.entry(identity.clone()).or_insert_with(|| {
            debug!(%identity, "creating default in-memory balance");
            Balance::default()
        });
        Ok(balance)
    }

    async fn save(&self, identity: &Identity, balance: Balance, origin: Origin) -> Result<(), StoreError> {
        self.records.write().await.insert(identity.clone(), balance);
        self.hub.publish(identity, balance, origin);
        Ok(())
    }

    fn subscribe(&self, identity: &Identity, own: Origin, on_change: OnChange) -> Subscription {
        self.hub.subscribe(identity, own, on_change)
    }

    fn mode(&self) -> StoreMode {
        StoreMode::Simulated
    }
}
