//! # auth — API Key Middleware
//!
//! ป้องกัน Endpoint ด้วย `X-API-Key` header
//!
//! ## Mode
//! - no key configured → **Allow All** (Dev Mode)
//! - key configured   → ต้องส่ง `X-API-Key: <key>` ทุก Request
//!
//! `/api/health` is always open.
//!
//! The key comes from [`crate::config::Config`] and is handed to the layer via
//! `axum::middleware::from_fn_with_state`.

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

pub const HEALTH_PATH: &str = "/api/health";

/// Configured key; `None` disables the check.
#[derive(Debug, Clone, Default)]
pub struct ApiKey(pub Option<Arc<str>>);

impl ApiKey {
    pub fn new(key: Option<String>) -> Self {
        Self(key.map(Arc::from))
    }
}

pub async fn require_api_key(
    State(api_key): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // ── Dev Mode ──────────────────────────────────────────────────────────────
    let Some(expected) = api_key.0.as_deref() else {
        return next.run(request).await;
    };

    // ── ยกเว้น Health Check ───────────────────────────────────────────────────
    let path = request.uri().path();
    if path == HEALTH_PATH {
        return next.run(request).await;
    }

    // Browsers can't set headers on a WebSocket upgrade; accept ?api_key= too.
    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query_key(request.uri()));

    if provided.as_deref() == Some(expected) {
        next.run(request).await
    } else {
        warn!(path, "❌ Unauthorized request — invalid or missing X-API-Key");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok":    false,
                "kind":  "unauthorized",
                "error": "Unauthorized: invalid or missing X-API-Key header",
            })),
        )
            .into_response()
    }
}

/// `api_key` from the query string, percent-decoded.
fn query_key(uri: &Uri) -> Option<String> {
    let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params.remove("api_key")
}
