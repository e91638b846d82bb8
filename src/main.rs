//! # bitsim — Simulated BTC/USD Trading Terminal
//!
//! ```text
//!  ┌─────────────┐  POST /v1/session/*   ┌──────────────────────────────┐
//!  │  Identity   │ ◀──────────────────── │ AppState                     │
//!  │  Service    │                       │ ├─ session / identity        │
//!  └─────────────┘                       │ ├─ store  (remote | memory)  │
//!                                        │ ├─ balance (watch)           │
//!  ┌─────────────┐  GET every 15 s       │ ├─ price   (watch) ◀── poller│
//!  │ Price Feed  │ ◀──────────────────── │ ├─ notices                   │
//!  └─────────────┘                       │ └─ broadcast_tx ───────────┐ │
//!                                        └────────────────────────────┘ │
//!  ┌─────────────┐  ws://host/ws/terminal  ◀────────────────────────────┘
//!  │  Terminal   │  GET  /api/balance · /api/price · /api/portfolio
//!  │  UI         │  POST /api/transactions
//!  └─────────────┘
//! ```
//!
//! ## Environment Variables
//!
//! | Variable              | Default                   | Description                         |
//! |-----------------------|---------------------------|-------------------------------------|
//! | `BIND_ADDR`           | `0.0.0.0:3000`            | Address Axum listens on             |
//! | `PRICE_URL`           | CoinDesk BTC endpoint     | JSON price source                   |
//! | `PRICE_INTERVAL_SECS` | `15`                      | Poll period                         |
//! | `FALLBACK_PRICE`      | `68500`                   | Used when the fetch fails           |
//! | `AUTH_URL`            | —                         | Identity service; unset = simulated |
//! | `SESSION_TOKEN`       | —                         | Pre-issued credential               |
//! | `DATABASE_URL`        | —                         | PostgreSQL (`postgres` feature)     |
//! | `NOTICE_TTL_SECS`     | `5`                       | Notice auto-dismiss delay           |
//! | `API_KEY`             | —                         | Require `X-API-Key` when set        |
//! | `RUST_LOG`            | `bitsim=debug`            | Tracing filter                      |

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod config;
mod engine;
mod error;
mod events;
mod models;
mod notice;
mod price;
mod routes;
mod session;
mod state;
mod store;

use auth::ApiKey;
use config::Config;
use engine::terminal::{spawn_price_relay, watch_balance};
use state::build_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("bitsim=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║           BITSIM — Simulated Trading Terminal         ║
  ║      Session · Balance · Price · Push Updates         ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config ─────────────────────────────────────────────────────────────
    let config = Config::from_env().context("Failed to load config")?;
    let client = reqwest::Client::new();

    // ── 4. Session + store + balance ──────────────────────────────────────────
    let state = build_state(&config, &client).await;
    info!(
        identity = %state.identity,
        mode     = ?state.mode(),
        warning  = state.warning.as_deref().unwrap_or("-"),
        "Session ready"
    );

    // ── 5. Background tasks ───────────────────────────────────────────────────
    let subscription = watch_balance(&state);
    let relay = spawn_price_relay(&state);
    let poller = state.price.spawn(client, &config.price);
    info!(balance_subscription = subscription.is_active(), "Background tasks started");

    // ── 6. Router ─────────────────────────────────────────────────────────────
    let app = routes::router(state.clone(), ApiKey::new(config.api_key.clone()));

    // ── 7. Bind & Serve ───────────────────────────────────────────────────────
    info!(addr = ?config.bind_addr, "🚀 bitsim terminal starting");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── 8. Teardown ───────────────────────────────────────────────────────────
    poller.shutdown();
    relay.abort();
    subscription.unsubscribe();
    info!("👋 bitsim terminal stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
