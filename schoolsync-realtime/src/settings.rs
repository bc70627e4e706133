//! Tunables for the realtime layer.

use crate::backoff::ReconnectConfig;
use crate::error::{RealtimeError, RealtimeResult};
use crate::tracker::DEFAULT_DEDUP_WINDOW;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSettings {
    /// Echo-suppression window for the mutation tracker.
    pub dedup_window: Duration,
    pub reconnect: ReconnectConfig,
    /// Capacity of each subscription worker's command queue.
    pub command_buffer: usize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            dedup_window: DEFAULT_DEDUP_WINDOW,
            reconnect: ReconnectConfig::default(),
            command_buffer: 16,
        }
    }
}

impl RealtimeSettings {
    pub fn validate(&self) -> RealtimeResult<()> {
        if self.dedup_window.is_zero() {
            return Err(RealtimeError::InvalidSetting {
                field: "dedup_window",
                reason: "must be > 0".to_string(),
            });
        }
        if self.command_buffer == 0 {
            return Err(RealtimeError::InvalidSetting {
                field: "command_buffer",
                reason: "must be > 0".to_string(),
            });
        }
        self.reconnect.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = RealtimeSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.dedup_window, Duration::from_millis(2000));
    }

    #[test]
    fn test_zero_dedup_window_rejected() {
        let settings = RealtimeSettings {
            dedup_window: Duration::ZERO,
            ..RealtimeSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(RealtimeError::InvalidSetting { field: "dedup_window", .. })
        ));
    }

    #[test]
    fn test_reconnect_errors_surface() {
        let settings = RealtimeSettings {
            reconnect: ReconnectConfig {
                max_ms: 1,
                initial_ms: 10,
                ..ReconnectConfig::default()
            },
            ..RealtimeSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
