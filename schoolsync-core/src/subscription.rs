//! Subscription declarations.
//!
//! A [`RoleSubscriptionProfile`] is the full plan for one authenticated
//! session: which tables to watch, how to scope them, which cache entries
//! each one feeds, and how long to coalesce bursts. Profiles are plain data;
//! changing any input means building a new profile.

use crate::error::{ProfileError, ProfileResult};
use crate::filter::RowFilter;
use crate::query_key::QueryKey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Mutation kinds a listener can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "*")]
    Any,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Any => "*",
        }
    }

    /// Parse the wire name used by the change-feed.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            "*" => Some(Self::Any),
            _ => None,
        }
    }

    /// Whether a listener registered for `self` wants an `actual` change.
    pub fn accepts(&self, actual: ChangeKind) -> bool {
        *self == Self::Any || *self == actual
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interest in one table's changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub table: String,
    pub event: ChangeKind,
    pub filter: Option<RowFilter>,
    /// Cache entries to invalidate when a matching event is accepted.
    pub query_keys: Vec<QueryKey>,
}

impl SubscriptionConfig {
    pub fn new(table: impl Into<String>, event: ChangeKind) -> Self {
        Self {
            table: table.into(),
            event,
            filter: None,
            query_keys: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_query_key(mut self, key: impl Into<QueryKey>) -> Self {
        self.query_keys.push(key.into());
        self
    }

    pub fn with_query_keys<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = QueryKey>,
    {
        self.query_keys.extend(keys);
        self
    }

    fn validate(&self, index: usize) -> ProfileResult<()> {
        if self.table.trim().is_empty() {
            return Err(ProfileError::EmptyTable { index });
        }
        if self.query_keys.is_empty() {
            return Err(ProfileError::NoQueryKeys {
                index,
                table: self.table.clone(),
            });
        }
        Ok(())
    }
}

/// The complete subscription plan for one authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSubscriptionProfile {
    pub channel_name: String,
    pub subscriptions: Vec<SubscriptionConfig>,
    pub debounce_ms: u64,
}

impl RoleSubscriptionProfile {
    pub fn new(
        channel_name: impl Into<String>,
        subscriptions: Vec<SubscriptionConfig>,
        debounce_ms: u64,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            subscriptions,
            debounce_ms,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// True when there is nothing to subscribe to (e.g. a parent with no
    /// linked children). No channel should be opened for such a profile.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Every distinct query key across all subscriptions, first-seen order.
    pub fn all_query_keys(&self) -> Vec<QueryKey> {
        let mut seen = HashSet::new();
        self.subscriptions
            .iter()
            .flat_map(|s| s.query_keys.iter())
            .filter(|key| seen.insert(*key))
            .cloned()
            .collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.iter().map(|s| s.table.as_str())
    }

    pub fn subscription_for(&self, table: &str) -> Option<&SubscriptionConfig> {
        self.subscriptions.iter().find(|s| s.table == table)
    }

    pub fn validate(&self) -> ProfileResult<()> {
        if self.channel_name.trim().is_empty() {
            return Err(ProfileError::EmptyChannelName);
        }
        for (index, subscription) in self.subscriptions.iter().enumerate() {
            subscription.validate(index)?;
        }
        Ok(())
    }
}
