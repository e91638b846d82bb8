//! # routes::terminal
//!
//! | Method | Path                 | Description                                  |
//! |--------|----------------------|----------------------------------------------|
//! | GET    | `/api/health`        | Liveness (no API key)                        |
//! | GET    | `/api/session`       | Identity, store mode, persistent warning     |
//! | GET    | `/api/balance`       | `{usd, btc}`                                 |
//! | GET    | `/api/price`         | Latest quote                                 |
//! | GET    | `/api/portfolio`     | `usd + btc * price`                          |
//! | POST   | `/api/transactions`  | deposit / withdraw / buy / sell              |

use std::sync::atomic::Ordering;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::{
    engine::terminal,
    error::AppError,
    models::TransactionRequest,
    state::SharedState,
};

/// GET /api/health
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":                true,
        "status":            "healthy",
        "mode":              state.mode(),
        "transaction_count": state.transaction_count.load(Ordering::Relaxed),
    }))
}

/// GET /api/session
pub async fn get_session(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":       true,
        "session":  state.session,
        "identity": state.identity,
        "mode":     state.mode(),
        "warning":  state.warning,
    }))
}

/// GET /api/balance
pub async fn get_balance(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({ "ok": true, "balance": state.current_balance() }))
}

/// GET /api/price
pub async fn get_price(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":             true,
        "quote":          state.price.quote(),
        "fallback_price": state.price.fallback_price(),
    }))
}

/// GET /api/portfolio
pub async fn get_portfolio(State(state): State<SharedState>) -> impl IntoResponse {
    let balance = state.current_balance();
    let price = state.price.latest();
    Json(json!({
        "ok":    true,
        "usd":   balance.usd,
        "btc":   balance.btc,
        "price": price,
        "value": balance.portfolio_value(price),
    }))
}

/// POST /api/transactions — `{"kind": "buy", "amount": "0.01"}`
pub async fn post_transaction(
    State(state): State<SharedState>,
    Json(request): Json<TransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let receipt = terminal::submit(&state, &request).await?;
    Ok(Json(json!({ "ok": true, "receipt": receipt })))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::{
        auth::ApiKey,
        models::{Balance, Identity},
        price::PriceFeed,
        routes::router,
        session::Session,
        state::AppState,
        store::MemoryBalanceStore,
    };

    fn app(api_key: Option<&str>) -> Router {
        let state = Arc::new(AppState::new(
            Session::Degraded { reason: "test".into() },
            Identity::local(),
            Arc::new(MemoryBalanceStore::new()),
            Balance::default(),
            PriceFeed::new(68500.0),
            Duration::from_secs(5),
        ));
        router(state, ApiKey::new(api_key.map(str::to_string)))
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(path: &str) -> Request<Body> {
        Request::get(path).body(Body::empty()).unwrap()
    }

    fn transact(kind: &str, amount: Value) -> Request<Body> {
        Request::post("/api/transactions")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({ "kind": kind, "amount": amount }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_scenario_over_http() {
        let app = app(None);

        let (status, body) = call(&app, transact("deposit", "500".into())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["receipt"]["balance"]["usd"], 1500.0);

        let (status, body) = call(&app, transact("buy", 0.01.into())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["receipt"]["balance"]["btc"], 0.01);

        let (_, body) = call(&app, get("/api/portfolio")).await;
        assert!((body["value"].as_f64().unwrap() - 1500.0).abs() < 1e-9);

        let (status, _) = call(&app, transact("sell", "0.01".into())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, transact("withdraw", "2000".into())).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "insufficient_balance");

        let (_, body) = call(&app, get("/api/balance")).await;
        assert!((body["balance"]["usd"].as_f64().unwrap() - 1500.0).abs() < 1e-9);
        assert_eq!(body["balance"]["btc"], 0.0);
    }

    #[tokio::test]
    async fn test_bad_amount_is_400() {
        let app = app(None);
        let (status, body) = call(&app, transact("deposit", "-3".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_amount");
    }

    #[tokio::test]
    async fn test_session_reports_simulated_mode() {
        let app = app(None);
        let (status, body) = call(&app, get("/api/session")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "simulated");
        assert_eq!(body["identity"], "local");
        assert!(body["warning"].is_string());
    }

    #[tokio::test]
    async fn test_price_defaults_to_fallback() {
        let app = app(None);
        let (_, body) = call(&app, get("/api/price")).await;
        assert_eq!(body["quote"]["price"], 68500.0);
        assert_eq!(body["quote"]["source"], "fallback");
    }

    #[tokio::test]
    async fn test_api_key_guard() {
        let app = app(Some("s3cret"));

        let (status, _) = call(&app, get("/api/balance")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = Request::get("/api/balance").header("X-API-Key", "s3cret").body(Body::empty()).unwrap();
        let (status, _) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_key_in_query_is_decoded() {
        let app = app(Some("a+b/c=d"));

        let (status, _) = call(&app, get("/api/balance?api_key=a%2Bb%2Fc%3Dd")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, get("/api/balance?api_key=a+b/c=d")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
