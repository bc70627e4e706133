//! Error types for the realtime layer.

use schoolsync_core::ProfileError;
use thiserror::Error;

/// Failures reported by a change-feed transport.
///
/// These never escape the subscription worker; they are recorded into
/// [`RealtimeStatus::last_error`](crate::RealtimeStatus) instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Join rejected for channel {channel}: {reason}")]
    JoinRejected { channel: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Channel closed")]
    Closed,
}

/// Master error type for the realtime layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("Invalid subscription profile: {0}")]
    Profile(#[from] ProfileError),

    #[error("Channel {name} is already open in this process")]
    DuplicateChannel { name: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid realtime setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("Subscription worker is no longer running")]
    WorkerGone,
}

/// Result type alias for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;
