//! # price — Price Feed Poller
//!
//! Keeps the latest BTC/USD quote in a `tokio::sync::watch` channel.
//!
//! ```text
//! spawn ──▶ refresh_once (immediately) ──▶ sleep interval ──▶ refresh_once ──▶ …
//!                │
//!                ├─ 2xx + bpi.USD.rate_float > 0  → publish Live quote
//!                └─ anything else                 → publish Fallback quote
//! ```
//!
//! The price is always defined: before the first fetch lands the feed holds
//! the fallback value.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

// ─── Config / Quote ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PriceConfig {
    /// JSON endpoint returning `bpi.USD.rate_float`
    pub url:            String,
    /// Refresh period (15 s by default)
    pub interval:       Duration,
    /// Substituted on any fetch failure
    pub fallback_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Live,
    Fallback,
}

/// Latest USD-per-BTC value and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceQuote {
    pub price:      f64,
    pub source:     PriceSource,
    pub updated_at: DateTime<Utc>,
}

impl PriceQuote {
    fn live(price: f64) -> Self {
        Self { price, source: PriceSource::Live, updated_at: Utc::now() }
    }

    fn fallback(price: f64) -> Self {
        Self { price, source: PriceSource::Fallback, updated_at: Utc::now() }
    }
}

// ─── Fetch ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("price endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("price endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed price response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct PriceBody {
    bpi: Bpi,
}

#[derive(Debug, Deserialize)]
struct Bpi {
    #[serde(rename = "USD")]
    usd: UsdRate,
}

#[derive(Debug, Deserialize)]
struct UsdRate {
    rate_float: Option<f64>,
    /// Display form, e.g. `"68,500.1234"`.
    rate:       Option<String>,
}

/// Extract the USD rate from a price endpoint body.
pub fn parse_price_body(body: &str) -> Result<f64, PriceError> {
    let parsed: PriceBody =
        serde_json::from_str(body).map_err(|e| PriceError::Malformed(e.to_string()))?;

    let rate = match (parsed.bpi.usd.rate_float, parsed.bpi.usd.rate) {
        (Some(f), _) => f,
        (None, Some(text)) => text
            .replace(',', "")
            .trim()
            .parse::<f64>()
            .map_err(|_| PriceError::Malformed(format!("unparseable rate '{text}'")))?,
        (None, None) => return Err(PriceError::Malformed("missing USD rate".into())),
    };

    if !rate.is_finite() || rate <= 0.0 {
        return Err(PriceError::Malformed(format!("non-positive rate {rate}")));
    }
    Ok(rate)
}

/// GET the price endpoint once.
pub async fn fetch_price(client: &reqwest::Client, url: &str) -> Result<f64, PriceError> {
    let resp = client.get(url).send().await?;

    if !resp.status().is_success() {
        return Err(PriceError::Status(resp.status()));
    }

    let body = resp.text().await?;
    parse_price_body(&body)
}

// ─── Feed ─────────────────────────────────────────────────────────────────────

/// Observable latest price. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PriceFeed {
    tx:       Arc<watch::Sender<PriceQuote>>,
    fallback: f64,
}

impl PriceFeed {
    pub fn new(fallback_price: f64) -> Self {
        let (tx, _) = watch::channel(PriceQuote::fallback(fallback_price));
        Self { tx: Arc::new(tx), fallback: fallback_price }
    }

    /// Current USD-per-BTC value.
    #[inline]
    pub fn latest(&self) -> f64 {
        self.tx.borrow().price
    }

    pub fn quote(&self) -> PriceQuote {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PriceQuote> {
        self.tx.subscribe()
    }

    pub fn fallback_price(&self) -> f64 {
        self.fallback
    }

    /// Fetch once and publish the result, or the fallback on any failure.
    pub async fn refresh_once(&self, client: &reqwest::Client, url: &str) -> PriceQuote {
        let quote = match fetch_price(client, url).await {
            Ok(price) => {
                debug!(price, "BTC price refreshed");
                PriceQuote::live(price)
            }
            Err(e) => {
                warn!(error = %e, fallback = self.fallback, "⚠️ Price fetch failed — using fallback");
                PriceQuote::fallback(self.fallback)
            }
        };
        self.tx.send_replace(quote);
        quote
    }

    /// Start the periodic refresh; the first fetch happens right away.
    pub fn spawn(&self, client: reqwest::Client, config: &PriceConfig) -> PollerHandle {
        let feed = self.clone();
        let url = config.url.clone();
        let period = config.interval;

        info!(url = %url, interval = ?period, "📈 Price poller starting");

        let task = poll_every(period, move || {
            let (feed, client, url) = (feed.clone(), client.clone(), url.clone());
            async move {
                feed.refresh_once(&client, &url).await;
            }
        });

        PollerHandle { task }
    }
}

/// Run `poll` right away, then once per `period`. A slow poll delays the
/// next one instead of bunching ticks up.
fn poll_every<F, Fut>(period: Duration, mut poll: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            poll().await;
        }
    })
}

/// Running poller; aborting it leaves the last published price in place.
#[derive(Debug)]
pub struct PollerHandle {
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn shutdown(self) {
        // Drop does the abort.
        info!("📈 Price poller stopped");
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
