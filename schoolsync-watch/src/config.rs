//! Configuration loading for schoolsync-watch.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use crate::transport::PhoenixSettings;
use schoolsync_core::{build_profile, SessionIdentity};
use schoolsync_realtime::{RealtimeError, RealtimeSettings, ReconnectConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "SCHOOLSYNC_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    /// Realtime websocket endpoint, e.g. `wss://<project>.supabase.co/realtime/v1/websocket`.
    pub endpoint: String,
    pub api_key: String,
    /// User JWT; without it the feed only sees rows visible to the anon role.
    pub access_token: Option<String>,
    pub schema: String,
    pub heartbeat_interval_ms: u64,
    /// Limit on opening a channel, handshake and join included.
    pub connect_timeout_ms: u64,
    pub dedup_window_ms: u64,
    pub log_format: LogFormat,
    pub reconnect: ReconnectConfig,
    pub session: SessionIdentity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or SCHOOLSYNC_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl WatchConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args(std::env::args().skip(1)).or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: WatchConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "endpoint",
                reason: "must not be empty".to_string(),
            });
        }
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                field: "endpoint",
                reason: "must use ws:// or wss://".to_string(),
            });
        }
        if endpoint.contains('?') {
            return Err(ConfigError::InvalidValue {
                field: "endpoint",
                reason: "must not carry a query string".to_string(),
            });
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_key",
                reason: "must not be empty".to_string(),
            });
        }
        if self
            .access_token
            .as_deref()
            .is_some_and(|token| token.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                field: "access_token",
                reason: "must not be empty when set".to_string(),
            });
        }
        if self.schema.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "schema",
                reason: "must not be empty".to_string(),
            });
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "heartbeat_interval_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connect_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.dedup_window_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dedup_window_ms",
                reason: "must be > 0".to_string(),
            });
        }
        self.reconnect.validate().map_err(|e| match e {
            RealtimeError::InvalidSetting { field, reason } => ConfigError::InvalidValue { field, reason },
            other => ConfigError::InvalidValue {
                field: "reconnect",
                reason: other.to_string(),
            },
        })?;
        build_profile(&self.session).map_err(|e| ConfigError::InvalidValue {
            field: "session",
            reason: e.to_string(),
        })?;
        Ok(())
    }

    pub fn socket_url(&self) -> String {
        format!(
            "{}?apikey={}&vsn=1.0.0",
            self.endpoint.trim().trim_end_matches('/'),
            self.api_key.trim()
        )
    }

    pub fn realtime_settings(&self) -> RealtimeSettings {
        RealtimeSettings {
            dedup_window: Duration::from_millis(self.dedup_window_ms),
            reconnect: self.reconnect.clone(),
            ..RealtimeSettings::default()
        }
    }

    pub fn phoenix_settings(&self) -> PhoenixSettings {
        PhoenixSettings {
            socket_url: self.socket_url(),
            access_token: self.access_token.clone(),
            schema: self.schema.clone(),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV).ok().map(PathBuf::from)
}

/// Value following `--config`, if any.
pub fn config_path_from_args<I>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
