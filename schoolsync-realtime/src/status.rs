//! Observable connection state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Connection state exposed for optional UI feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeStatus {
    pub is_connected: bool,
    pub last_error: Option<String>,
    /// When the router last accepted an event (not when it flushed).
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Write side of a [`RealtimeStatus`] watch channel.
///
/// Clones write to the same channel, which lets the manager keep one status
/// stream alive across subscription rebuilds.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    tx: Arc<watch::Sender<RealtimeStatus>>,
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RealtimeStatus::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<RealtimeStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> RealtimeStatus {
        self.tx.borrow().clone()
    }

    pub fn mark_connected(&self) {
        self.tx.send_modify(|status| {
            status.is_connected = true;
            status.last_error = None;
        });
    }

    pub fn mark_disconnected(&self) {
        self.tx.send_if_modified(|status| {
            let was_connected = status.is_connected;
            status.is_connected = false;
            was_connected
        });
    }

    /// Record a transport error. The connection is considered down.
    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|status| {
            status.is_connected = false;
            status.last_error = Some(message);
        });
    }

    /// Record an error the channel survived. Connectivity is left as is.
    pub fn record_warning(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|status| status.last_error = Some(message));
    }

    pub fn record_event(&self, at: DateTime<Utc>) {
        self.tx.send_modify(|status| status.last_event_at = Some(at));
    }

    /// Back to disconnected, no error, no last event.
    pub fn reset(&self) {
        self.tx.send_if_modified(|status| {
            let changed = *status != RealtimeStatus::default();
            *status = RealtimeStatus::default();
            changed
        });
    }
}
