//! # routes::monitor
//!
//! Push channel for the terminal UI.
//!
//! | Method    | Path             | Description                                  |
//! |-----------|------------------|----------------------------------------------|
//! | GET (WS)  | `/ws/terminal`   | Snapshot on connect, then every `WsEvent`    |
//! | GET       | `/api/notices`   | Notices that have not been dismissed yet     |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, info};

use crate::state::SharedState;

/// Upgrade HTTP → WebSocket แล้ว subscribe broadcast channel
pub async fn ws_terminal(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 Terminal client connected");

    // ── ส่ง Snapshot ปัจจุบันทันทีที่ต่อ ─────────────────────────────────────
    let snapshot = snapshot_json(&state).await;
    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    // ── Event Loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(_) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 Terminal client disconnected");
}

/// First frame a client receives: everything needed to render the screen.
async fn snapshot_json(state: &SharedState) -> String {
    let balance = state.current_balance();
    let quote = state.price.quote();

    json!({
        "event":           "SNAPSHOT",
        "identity":        state.identity,
        "mode":            state.mode(),
        "warning":         state.warning,
        "balance":         balance,
        "quote":           quote,
        "portfolio_value": balance.portfolio_value(quote.price),
        "notices":         state.notices.active().await,
    })
    .to_string()
}

/// GET /api/notices
pub async fn get_notices(State(state): State<SharedState>) -> impl IntoResponse {
    let notices = state.notices.active().await;
    Json(json!({
        "ok":      true,
        "count":   notices.len(),
        "notices": notices,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    use crate::{
        models::{Balance, Identity},
        price::PriceFeed,
        session::Session,
        state::AppState,
        store::MemoryBalanceStore,
    };

    #[tokio::test]
    async fn test_snapshot_carries_portfolio_value() {
        let state = Arc::new(AppState::new(
            Session::Degraded { reason: "test".into() },
            Identity::local(),
            Arc::new(MemoryBalanceStore::new()),
            Balance::new(815.0, 0.01),
            PriceFeed::new(68500.0),
            Duration::from_secs(5),
        ));

        let value: serde_json::Value = serde_json::from_str(&snapshot_json(&state).await).unwrap();

        assert_eq!(value["event"], "SNAPSHOT");
        assert_eq!(value["mode"], "simulated");
        assert!((value["portfolio_value"].as_f64().unwrap() - 1500.0).abs() < 1e-9);
    }
}
