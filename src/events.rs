//! # events
//!
//! Defines [`WsEvent`] — every event the terminal pushes to observers over
//! `/ws/terminal`.
//!
//! Events are serialised to JSON once and sent through a
//! `tokio::sync::broadcast::Sender<String>`, which keeps the channel free of
//! Clone constraints on the payload types.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    models::{Balance, TransactionKind},
    notice::Notice,
    price::PriceQuote,
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    /// Balance changed (local transaction or a remote writer).
    BalanceUpdated {
        balance:         Balance,
        portfolio_value: f64,
    },

    /// Poller published a new quote.
    PriceUpdated {
        quote: PriceQuote,
    },

    /// A transaction was accepted.
    TransactionApplied {
        transaction_id: Uuid,
        kind:           TransactionKind,
        amount:         f64,
        price:          f64,
        balance:        Balance,
        persisted:      bool,
    },

    /// Transient message for the user.
    Notice {
        notice: Notice,
    },

    /// Notice TTL elapsed.
    NoticeDismissed {
        id: Uuid,
    },
}

impl WsEvent {
    /// แปลงเป็น JSON String สำหรับส่งผ่าน WebSocket
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}
