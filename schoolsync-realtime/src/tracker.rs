//! Ledger of this client's recent writes.
//!
//! Every local write records `(table, record_id)` in its success path. When
//! the change-feed echoes that write back a moment later, the router asks
//! [`MutationTracker::is_duplicate`] and drops the echo instead of refetching
//! data the client already has.
//!
//! Entries are only meaningful for a short window (two seconds by default).
//! Older entries are pruned on every duplicate check, so the ledger stays
//! small without a background timer.

use crate::clock::{Clock, TokioClock};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How long a recorded write suppresses matching change notifications.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TrackedWrite {
    table: String,
    record_id: String,
}

impl TrackedWrite {
    fn new(table: &str, record_id: &str) -> Self {
        Self {
            table: table.to_string(),
            record_id: record_id.to_string(),
        }
    }
}

/// Process-wide record of recent local writes.
///
/// Cloning is cheap and clones share the same ledger: construct one tracker,
/// hand clones to every mutation call-site and to the realtime context.
/// Access is serialized per shard by `DashMap`, so concurrent `record` and
/// `is_duplicate` calls never lose updates.
#[derive(Debug, Clone)]
pub struct MutationTracker {
    entries: Arc<DashMap<TrackedWrite, Instant>>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for MutationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationTracker {
    /// Tracker on tokio's clock with the default two second window.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_DEDUP_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self::with_clock(Arc::new(TokioClock), window)
    }

    pub fn with_clock(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            window,
            clock,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Remember that this client just wrote `record_id` in `table`.
    ///
    /// Call synchronously from the write's success handler, before its own
    /// cache invalidation runs.
    pub fn record(&self, table: &str, record_id: &str) {
        let now = self.clock.now();
        self.entries.insert(TrackedWrite::new(table, record_id), now);
        tracing::trace!(table, record_id, "Recorded local mutation");
    }

    /// Record a batch write touching several rows of one table.
    pub fn record_all<I, S>(&self, table: &str, record_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for record_id in record_ids {
            self.record(table, record_id.as_ref());
        }
    }

    /// True iff `(table, record_id)` was recorded less than one window ago.
    pub fn is_duplicate(&self, table: &str, record_id: &str) -> bool {
        self.prune();
        let now = self.clock.now();
        self.entries
            .get(&TrackedWrite::new(table, record_id))
            .map(|recorded_at| self.is_fresh(*recorded_at, now))
            .unwrap_or(false)
    }

    /// Drop every entry at or beyond the window. Returns how many went.
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries
            .retain(|_, recorded_at| self.is_fresh(*recorded_at, now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, recorded_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(recorded_at) < self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_write_is_duplicate() {
        let tracker = MutationTracker::new();
        tracker.record("homework", "hw-1");
        assert!(tracker.is_duplicate("homework", "hw-1"));
        advance(Duration::from_millis(1999)).await;
        assert!(tracker.is_duplicate("homework", "hw-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_boundary_is_exclusive() {
        let tracker = MutationTracker::new();
        tracker.record("homework", "hw-1");
        advance(Duration::from_millis(2000)).await;
        assert!(!tracker.is_duplicate("homework", "hw-1"));
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_and_mismatched_keys() {
        let tracker = MutationTracker::new();
        tracker.record("homework", "hw-1");
        assert!(!tracker.is_duplicate("homework", "hw-2"));
        assert!(!tracker.is_duplicate("attendance", "hw-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerecord_restarts_window() {
        let tracker = MutationTracker::new();
        tracker.record("student_stickers", "st-1");
        advance(Duration::from_millis(1500)).await;
        tracker.record("student_stickers", "st-1");
        advance(Duration::from_millis(1500)).await;
        assert!(tracker.is_duplicate("student_stickers", "st-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_removes_only_stale() {
        let tracker = MutationTracker::new();
        tracker.record("homework", "old");
        advance(Duration::from_millis(2500)).await;
        tracker.record("homework", "new");
        assert_eq!(tracker.prune(), 1);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.is_duplicate("homework", "new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_ledger() {
        let tracker = MutationTracker::new();
        let call_site = tracker.clone();
        call_site.record_all("attendance", ["a-1", "a-2"]);
        assert!(tracker.is_duplicate("attendance", "a-1"));
        assert!(tracker.is_duplicate("attendance", "a-2"));
    }
}
