//! Error types for the watcher.

use crate::config::ConfigError;
use schoolsync_realtime::RealtimeError;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
    #[error("Failed to initialize logging: {0}")]
    Telemetry(String),
}
