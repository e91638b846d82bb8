//! # session — Identity Bootstrap
//!
//! Establishes the identity that keys the balance record.
//!
//! ## Flow
//! ```text
//! AUTH_URL unset                  → Degraded ("no identity service configured")
//! token present                   → POST {AUTH_URL}/v1/session/token      {"token": …}
//! token absent                    → POST {AUTH_URL}/v1/session/anonymous
//! 2xx + {"uid": "<non-empty>"}    → Authenticated
//! anything else                   → Degraded (reason logged, never fatal)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::Identity;

/// Identity service settings, passed in from [`crate::config::Config`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub auth_url: Option<String>,
    /// Pre-issued credential; `None` = ask for an anonymous session
    pub token:    Option<String>,
}

/// Outcome of bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Session {
    Authenticated {
        identity:  Identity,
        anonymous: bool,
    },
    Degraded {
        reason: String,
    },
}

impl Session {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Session::Authenticated { identity, .. } => Some(identity),
            Session::Degraded { .. } => None,
        }
    }

    /// Persistent warning shown while running without an identity.
    pub fn warning(&self) -> Option<String> {
        match self {
            Session::Authenticated { .. } => None,
            Session::Degraded { reason } => Some(format!(
                "Running in simulated mode — balances are kept in memory only ({reason})"
            )),
        }
    }
}

/// Why the identity service did not hand out a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("identity service unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("identity service returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed session response: {0}")]
    Malformed(#[source] reqwest::Error),

    #[error("identity service returned an empty uid")]
    EmptyUid,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    uid: String,
}

/// Resolve the session. Never fails; problems degrade to [`Session::Degraded`].
pub async fn bootstrap(client: &reqwest::Client, config: &SessionConfig) -> Session {
    let Some(base) = config.auth_url.as_deref() else {
        warn!("AUTH_URL not set — running without identity");
        return Session::Degraded { reason: "no identity service configured".into() };
    };

    let anonymous = config.token.is_none();
    match request_session(client, base, config.token.as_deref()).await {
        Ok(uid) => {
            info!(identity = %uid, anonymous, "🔑 Session established");
            Session::Authenticated { identity: Identity::new(uid), anonymous }
        }
        Err(e) => {
            warn!(error = %e, anonymous, "⚠️ Session bootstrap failed — falling back to simulated mode");
            Session::Degraded { reason: e.to_string() }
        }
    }
}

async fn request_session(
    client: &reqwest::Client,
    base: &str,
    token: Option<&str>,
) -> Result<String, SessionError> {
    let base = base.trim_end_matches('/');
    let request = match token {
        Some(token) => client
            .post(format!("{base}/v1/session/token"))
            .json(&json!({ "token": token })),
        None => client.post(format!("{base}/v1/session/anonymous")),
    };

    let resp = request.send().await.map_err(SessionError::Unreachable)?;

    if !resp.status().is_success() {
        return Err(SessionError::Status(resp.status()));
    }

    let body: SessionResponse = resp.json().await.map_err(SessionError::Malformed)?;

    let uid = body.uid.trim();
    if uid.is_empty() {
        return Err(SessionError::EmptyUid);
    }
    Ok(uid.to_string())
}
