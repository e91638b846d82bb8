//! HTTP + WebSocket surface.

pub mod monitor;
pub mod terminal;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::{require_api_key, ApiKey, HEALTH_PATH},
    state::SharedState,
};

/// Full router with middleware applied.
pub fn router(state: SharedState, api_key: ApiKey) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Terminal ──────────────────────────────────────────────────────────
        .route(HEALTH_PATH,            get(terminal::health_check))
        .route("/api/session",         get(terminal::get_session))
        .route("/api/balance",         get(terminal::get_balance))
        .route("/api/price",           get(terminal::get_price))
        .route("/api/portfolio",       get(terminal::get_portfolio))
        .route("/api/transactions",    post(terminal::post_transaction))
        // ── Monitor ───────────────────────────────────────────────────────────
        .route("/api/notices",         get(monitor::get_notices))
        .route("/ws/terminal",         get(monitor::ws_terminal))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(middleware::from_fn_with_state(api_key, require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
