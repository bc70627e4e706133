//! Event routing: echo suppression, then debounced invalidation.

use crate::debounce::Debouncer;
use crate::feed::ChangeEvent;
use crate::tracker::MutationTracker;
use schoolsync_core::QueryKey;
use std::time::Duration;
use tokio::time::Instant;

/// What the router did with one change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Echo of a recent local write. Nothing was queued.
    Suppressed,
    /// Keys queued; they flush at `deadline` unless more events arrive.
    Queued { deadline: Instant },
}

impl RouteOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RouteOutcome::Queued { .. })
    }
}

/// Per-channel router. Owns the debounce state for one subscription.
#[derive(Debug)]
pub struct EventRouter {
    tracker: MutationTracker,
    debouncer: Debouncer,
}

impl EventRouter {
    pub fn new(tracker: MutationTracker, debounce: Duration) -> Self {
        Self {
            tracker,
            debouncer: Debouncer::new(debounce),
        }
    }

    /// Route one event carrying the owning listener's query keys.
    ///
    /// Events without a record id cannot match a tracked write and are
    /// always accepted.
    pub fn route(&mut self, event: &ChangeEvent, keys: &[QueryKey], now: Instant) -> RouteOutcome {
        if let Some(record_id) = event.record_id.as_deref() {
            if self.tracker.is_duplicate(&event.table, record_id) {
                tracing::debug!(
                    table = %event.table,
                    record_id,
                    "Suppressed echo of local mutation"
                );
                return RouteOutcome::Suppressed;
            }
        }
        let deadline = self.debouncer.push(keys, now);
        tracing::trace!(
            table = %event.table,
            kind = event.kind.as_str(),
            pending = self.debouncer.pending_len(),
            "Queued invalidation"
        );
        RouteOutcome::Queued { deadline }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Keys whose window has elapsed. Empty when nothing is due.
    pub fn flush_due(&mut self, now: Instant) -> Vec<QueryKey> {
        self.debouncer.take_due(now).unwrap_or_default()
    }

    /// Drop pending invalidations. Returns how many keys were discarded.
    pub fn cancel(&mut self) -> usize {
        self.debouncer.cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schoolsync_core::ChangeKind;

    fn router() -> EventRouter {
        EventRouter::new(MutationTracker::new(), Duration::from_millis(300))
    }

    fn keys() -> Vec<QueryKey> {
        vec![QueryKey::from(["student-homework", "s-1"])]
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_is_suppressed() {
        let mut router = router();
        router.tracker.record("homework", "hw-1");
        let event = ChangeEvent::new("homework", ChangeKind::Update, Some("hw-1".to_string()));
        let outcome = router.route(&event, &keys(), Instant::now());
        assert_eq!(outcome, RouteOutcome::Suppressed);
        assert_eq!(router.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_event_is_queued() {
        let mut router = router();
        router.tracker.record("homework", "hw-1");
        let event = ChangeEvent::new("homework", ChangeKind::Insert, Some("hw-2".to_string()));
        let now = Instant::now();
        let outcome = router.route(&event, &keys(), now);
        assert_eq!(
            outcome,
            RouteOutcome::Queued {
                deadline: now + Duration::from_millis(300)
            }
        );
        assert!(outcome.is_accepted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_record_id_is_accepted() {
        let mut router = router();
        let event = ChangeEvent::new("sessions", ChangeKind::Delete, None);
        assert!(router.route(&event, &keys(), Instant::now()).is_accepted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_waits_for_deadline() {
        let mut router = router();
        let event = ChangeEvent::new("homework", ChangeKind::Insert, Some("hw-9".to_string()));
        let now = Instant::now();
        router.route(&event, &keys(), now);
        assert!(router.flush_due(now + Duration::from_millis(299)).is_empty());
        assert_eq!(router.flush_due(now + Duration::from_millis(300)), keys());
        assert_eq!(router.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_pending() {
        let mut router = router();
        let event = ChangeEvent::new("homework", ChangeKind::Insert, Some("hw-9".to_string()));
        let now = Instant::now();
        router.route(&event, &keys(), now);
        assert_eq!(router.cancel(), 1);
        assert!(router.flush_due(now + Duration::from_secs(1)).is_empty());
    }
}
