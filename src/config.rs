//! # config — อ่าน Config จาก Environment Variables
//!
//! Read once in `main`; everything downstream receives the pieces it needs
//! explicitly.

use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context};

use crate::{price::PriceConfig, session::SessionConfig};

/// CoinDesk current-price endpoint; the body carries `bpi.USD.rate_float`.
pub const DEFAULT_PRICE_URL: &str = "https://api.coindesk.com/v1/bpi/currentprice/BTC.json";

/// Price used whenever the live quote cannot be fetched.
pub const DEFAULT_FALLBACK_PRICE: f64 = 68500.0;

/// Everything the terminal needs at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address Axum listens on
    pub bind_addr:     SocketAddr,
    /// Price feed settings (URL, interval, fallback)
    pub price:         PriceConfig,
    /// Identity service settings (URL + optional pre-issued token)
    pub session:       SessionConfig,
    /// PostgreSQL URL; only honoured with the `postgres` feature
    pub database_url:  Option<String>,
    /// How long a transient notice stays visible
    pub notice_ttl:    Duration,
    /// `None` = ไม่มี API key → middleware ยอมให้ผ่านหมด (dev mode)
    pub api_key:       Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let env_or = |key: &str, default: &str| non_empty(key).unwrap_or_else(|| default.to_string());

        let bind_addr: SocketAddr = env_or("BIND_ADDR", "0.0.0.0:3000")
            .parse()
            .context("BIND_ADDR must be host:port")?;

        let interval_secs: u64 = env_or("PRICE_INTERVAL_SECS", "15")
            .parse()
            .context("PRICE_INTERVAL_SECS must be a number")?;
        if interval_secs == 0 {
            bail!("PRICE_INTERVAL_SECS must be greater than zero");
        }

        let fallback: f64 = match non_empty("FALLBACK_PRICE") {
            Some(v) => v.parse().context("FALLBACK_PRICE must be a number")?,
            None    => DEFAULT_FALLBACK_PRICE,
        };
        if !fallback.is_finite() || fallback <= 0.0 {
            bail!("FALLBACK_PRICE must be a positive number, got {fallback}");
        }

        let notice_secs: u64 = env_or("NOTICE_TTL_SECS", "5")
            .parse()
            .context("NOTICE_TTL_SECS must be a number")?;

        Ok(Self {
            bind_addr,
            price: PriceConfig {
                url:            env_or("PRICE_URL", DEFAULT_PRICE_URL),
                interval:       Duration::from_secs(interval_secs),
                fallback_price: fallback,
            },
            session: SessionConfig {
                auth_url: non_empty("AUTH_URL"),
                token:    non_empty("SESSION_TOKEN"),
            },
            database_url: non_empty("DATABASE_URL"),
            notice_ttl:   Duration::from_secs(notice_secs),
            api_key:      non_empty("API_KEY"),
        })
    }
}
