//! # store::postgres — Remote Balance Store
//!
//! ใช้ `sqlx` สำหรับ async PostgreSQL (runtime-checked queries)
//!
//! ## Change stream
//! Every `save` runs `pg_notify('balance_changes', <json>)`. A background
//! `PgListener` task forwards notifications written by *other* store instances
//! into the local [`ChangeHub`]; our own writes are published directly and
//! skipped on the way back in via `store`. The writer's [`Origin`] travels with
//! the notice either way.
//!
//! ## Setup
//! 1. สร้าง database และตั้ง `DATABASE_URL` ใน `.env`
//! 2. `cargo run --features postgres` — migration รันอัตโนมัติตอน connect

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::{PgListener, PgPoolOptions}, Executor, PgPool};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BalanceStore, ChangeHub, OnChange, Origin, StoreError, StoreMode, Subscription};
use crate::models::{balance::{DEFAULT_BTC, DEFAULT_USD}, Balance, Identity};

const NOTIFY_CHANNEL: &str = "balance_changes";

/// Payload carried by `pg_notify`.
#[derive(Debug, Serialize, Deserialize)]
struct ChangeNotice {
    identity: String,
    store:    Uuid,
    origin:   Origin,
    usd:      f64,
    btc:      f64,
}

pub struct PgBalanceStore {
    pool:      PgPool,
    hub:       ChangeHub,
    store_id:  Uuid,
    listener:  JoinHandle<()>,
}

impl PgBalanceStore {
    /// Connect, apply the schema and start the change listener.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        // Simple-query protocol so the file may hold several statements.
        pool.execute(include_str!("../../migrations/001_init.sql"))
            .await
            .context("Failed to run migration 001_init.sql")?;

        let mut listener = PgListener::connect_with(&pool)
            .await
            .context("Failed to open LISTEN connection")?;
        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .context("LISTEN balance_changes failed")?;

        let hub = ChangeHub::new();
        let store_id = Uuid::new_v4();
        let listener = tokio::spawn(forward_remote_changes(listener, hub.clone(), store_id));

        info!(%store_id, "✅ PostgreSQL balance store ready");
        Ok(Self { pool, hub, store_id, listener })
    }
}

async fn forward_remote_changes(mut listener: PgListener, hub: ChangeHub, store_id: Uuid) {
    loop {
        match listener.recv().await {
            Ok(notification) => {
                let notice: ChangeNotice = match serde_json::from_str(notification.payload()) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, "ignoring malformed balance notification");
                        continue;
                    }
                };
                if notice.store == store_id {
                    continue;
                }
                debug!(identity = %notice.identity, origin = %notice.origin, "remote balance change");
                hub.publish(
                    &Identity::new(notice.identity),
                    Balance::new(notice.usd, notice.btc),
                    notice.origin,
                );
            }
            // PgListener reconnects on the next recv().
            Err(e) => {
                warn!(error = %e, "balance change listener error");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

impl Drop for PgBalanceStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn load(&self, identity: &Identity) -> Result<Balance, StoreError> {
        sqlx::query(
            "INSERT INTO balances (identity, usd, btc) VALUES ($1, $2, $3) \
             ON CONFLICT (identity) DO NOTHING",
        )
        .bind(identity.as_str())
        .bind(DEFAULT_USD)
        .bind(DEFAULT_BTC)
        .execute(&self.pool)
        .await?;

        let (usd, btc) =
            sqlx::query_as::<_, (f64, f64)>("SELECT usd, btc FROM balances WHERE identity = $1")
                .bind(identity.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(Balance::new(usd, btc))
    }

    async fn save(&self, identity: &Identity, balance: Balance, origin: Origin) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO balances (identity, usd, btc, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (identity) DO UPDATE SET
              usd        = EXCLUDED.usd,
              btc        = EXCLUDED.btc,
              updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(identity.as_str())
        .bind(balance.usd)
        .bind(balance.btc)
        .execute(&self.pool)
        .await?;

        let payload = serde_json::to_string(&ChangeNotice {
            identity: identity.to_string(),
            store:    self.store_id,
            origin,
            usd:      balance.usd,
            btc:      balance.btc,
        })
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(NOTIFY_CHANNEL)
            .bind(payload)
            .execute(&self.pool)
            .await?;

        self.hub.publish(identity, balance, origin);
        Ok(())
    }

    fn subscribe(&self, identity: &Identity, own: Origin, on_change: OnChange) -> Subscription {
        self.hub.subscribe(identity, own, on_change)
    }

    fn mode(&self) -> StoreMode {
        StoreMode::Remote
    }
}
