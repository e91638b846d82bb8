//! # error
//!
//! Centralised application error type.
//!
//! Every handler returns `Result<_, AppError>`. The `IntoResponse` impl turns
//! these into `{"ok": false, "kind": ..., "error": ...}` so the terminal UI
//! can tell an inline input error from a transient balance message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{engine::ledger::TradeError, models::AmountError, store::StoreError};

#[derive(Debug, Error)]
pub enum AppError {
    /// Amount failed input validation; nothing was touched.
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// Ledger refused the transaction; nothing was touched.
    #[error("{0}")]
    Rejected(#[from] TradeError),

    /// Another transaction is still being processed.
    #[error("A transaction is already in flight")]
    Busy,

    /// Balance store could not be read.
    #[error("Balance store error: {0}")]
    Store(#[from] StoreError),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidAmount(_) => "invalid_amount",
            AppError::Rejected(TradeError::InsufficientBalance { .. }) => "insufficient_balance",
            AppError::Rejected(TradeError::InvalidPrice(_)) => "invalid_price",
            AppError::Rejected(TradeError::Overflow) => "overflow",
            AppError::Busy => "busy",
            AppError::Store(_) => "store",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            AppError::Rejected(_)      => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Busy             => StatusCode::CONFLICT,
            AppError::Store(_)         => StatusCode::BAD_GATEWAY,
            AppError::Internal(_)      => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "ok":    false,
            "kind":  self.kind(),
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
