//! Change-feed transport contract.
//!
//! A [`ChangeFeed`] opens named channels carrying one listener per watched
//! table. The subscription worker only ever talks to these traits, so the
//! Supabase transport and the scripted test feed are interchangeable.

use crate::error::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schoolsync_core::{ChangeKind, RowFilter, SubscriptionConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One table-scoped listener requested on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub table: String,
    pub event: ChangeKind,
    pub filter: Option<RowFilter>,
}

impl From<&SubscriptionConfig> for ListenerSpec {
    fn from(config: &SubscriptionConfig) -> Self {
        Self {
            table: config.table.clone(),
            event: config.event,
            filter: config.filter.clone(),
        }
    }
}

/// A row-level change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    /// Primary key of the affected row, when the payload carried one.
    pub record_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    pub fn new(table: impl Into<String>, kind: ChangeKind, record_id: Option<String>) -> Self {
        Self {
            table: table.into(),
            kind,
            record_id,
            payload: Value::Null,
            commit_timestamp: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_commit_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.commit_timestamp = Some(at);
        self
    }
}

/// Everything a channel can report, in transport delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedSignal {
    /// The server acknowledged the channel and its listeners.
    Subscribed,
    /// A change matched the listener at index `listener`.
    Change { listener: usize, event: ChangeEvent },
    /// A non-fatal error. If the channel also went down, `Closed` follows.
    Error(String),
    /// The channel is gone; no further signals will be delivered.
    Closed { reason: String },
}

/// One live channel.
#[async_trait]
pub trait FeedChannel: Send {
    /// Next signal, or `None` once the channel is finished.
    ///
    /// Must be cancel-safe: the worker polls it inside `tokio::select!`.
    async fn next_signal(&mut self) -> Option<FeedSignal>;

    fn is_open(&self) -> bool;

    /// Detach every listener and close the channel. Idempotent.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// A publish/subscribe change-feed service.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn open(
        &self,
        channel_name: &str,
        listeners: &[ListenerSpec],
    ) -> Result<Box<dyn FeedChannel>, TransportError>;
}
