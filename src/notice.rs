//! # notice — Transient Notices
//!
//! Success / error messages shown to the user and dismissed automatically
//! after a TTL (5 s by default). Each post broadcasts `NOTICE`; expiry
//! broadcasts `NOTICE_DISMISSED`.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::events::WsEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub id:         Uuid,
    pub level:      NoticeLevel,
    pub message:    String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NoticeBoard {
    active:       Arc<RwLock<Vec<Notice>>>,
    ttl:          Duration,
    broadcast_tx: broadcast::Sender<String>,
}

impl NoticeBoard {
    pub fn new(ttl: Duration, broadcast_tx: broadcast::Sender<String>) -> Self {
        Self { active: Arc::new(RwLock::new(Vec::new())), ttl, broadcast_tx }
    }

    pub async fn success(&self, message: impl Into<String>) -> Notice {
        self.post(NoticeLevel::Success, message.into()).await
    }

    pub async fn error(&self, message: impl Into<String>) -> Notice {
        self.post(NoticeLevel::Error, message.into()).await
    }

    /// Notices that have not expired yet, oldest first.
    pub async fn active(&self) -> Vec<Notice> {
        self.active.read().await.clone()
    }

    async fn post(&self, level: NoticeLevel, message: String) -> Notice {
        let notice = Notice { id: Uuid::new_v4(), level, message, created_at: Utc::now() };

        self.active.write().await.push(notice.clone());
        let _ = self.broadcast_tx.send(WsEvent::Notice { notice: notice.clone() }.to_json());

        let board = self.clone();
        let id = notice.id;
        tokio::spawn(async move {
            tokio::time::sleep(board.ttl).await;
            board.dismiss(id).await;
        });

        notice
    }

    async fn dismiss(&self, id: Uuid) {
        let removed = {
            let mut active = self.active.write().await;
            let before = active.len();
            active.retain(|n| n.id != id);
            active.len() != before
        };
        if removed {
            let _ = self.broadcast_tx.send(WsEvent::NoticeDismissed { id }.to_json());
        }
    }
}
