//! Shared dependencies handed to every subscription.

use crate::cache::QueryCache;
use crate::error::RealtimeResult;
use crate::feed::ChangeFeed;
use crate::registry::ChannelRegistry;
use crate::settings::RealtimeSettings;
use crate::tracker::MutationTracker;
use std::sync::Arc;

/// Everything a subscription needs from the outside world.
///
/// Cloning is cheap. The tracker and registry are shared across clones, so
/// one context per process is the expected shape.
#[derive(Clone)]
pub struct RealtimeContext {
    feed: Arc<dyn ChangeFeed>,
    cache: Arc<dyn QueryCache>,
    tracker: MutationTracker,
    registry: ChannelRegistry,
    settings: RealtimeSettings,
}

impl std::fmt::Debug for RealtimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeContext")
            .field("tracker", &self.tracker)
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RealtimeContext {
    /// Build a context with a fresh tracker sized from `settings`.
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        cache: Arc<dyn QueryCache>,
        settings: RealtimeSettings,
    ) -> RealtimeResult<Self> {
        settings.validate()?;
        let tracker = MutationTracker::with_window(settings.dedup_window);
        Ok(Self {
            feed,
            cache,
            tracker,
            registry: ChannelRegistry::new(),
            settings,
        })
    }

    /// Swap in an existing tracker, e.g. one already wired into mutation
    /// call-sites.
    pub fn with_tracker(mut self, tracker: MutationTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn feed(&self) -> &Arc<dyn ChangeFeed> {
        &self.feed
    }

    pub fn cache(&self) -> &Arc<dyn QueryCache> {
        &self.cache
    }

    pub fn tracker(&self) -> &MutationTracker {
        &self.tracker
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &RealtimeSettings {
        &self.settings
    }
}
