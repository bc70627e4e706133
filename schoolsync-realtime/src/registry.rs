//! Process-wide registry of live channel names.

use crate::error::{RealtimeError, RealtimeResult};
use dashmap::DashSet;
use std::sync::Arc;

/// Set of channel names currently held by a subscription.
///
/// Two live subscriptions with the same name would double every
/// invalidation, so claiming an already-held name fails.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    live: Arc<DashSet<String>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, name: &str) -> RealtimeResult<ChannelClaim> {
        if !self.live.insert(name.to_string()) {
            return Err(RealtimeError::DuplicateChannel {
                name: name.to_string(),
            });
        }
        Ok(ChannelClaim {
            name: name.to_string(),
            live: Arc::clone(&self.live),
        })
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.live.contains(name)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Holds a channel name until dropped.
#[derive(Debug)]
pub struct ChannelClaim {
    name: String,
    live: Arc<DashSet<String>>,
}

impl ChannelClaim {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ChannelClaim {
    fn drop(&mut self) {
        self.live.remove(&self.name);
    }
}
