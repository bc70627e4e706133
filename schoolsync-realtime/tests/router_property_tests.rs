//! Property-based tests for echo suppression and debounce coalescing.

use proptest::prelude::*;
use schoolsync_core::{ChangeKind, QueryKey};
use schoolsync_realtime::{ChangeEvent, EventRouter, MutationTracker, RouteOutcome};
use schoolsync_test_utils::generators::{arb_change_kind, arb_query_key};
use schoolsync_test_utils::ManualClock;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_millis(2000);

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A recorded write suppresses its echo for strictly less than the window.
    #[test]
    fn prop_dedup_window_is_half_open(offset_ms in 0u64..5_000) {
        let clock = ManualClock::new();
        let tracker = MutationTracker::with_clock(Arc::new(clock.clone()), WINDOW);
        tracker.record("homework", "hw-1");
        clock.advance(Duration::from_millis(offset_ms));
        prop_assert_eq!(tracker.is_duplicate("homework", "hw-1"), offset_ms < 2000);
    }

    /// Events closer together than the debounce window flush every distinct
    /// key exactly once, and never before the window after the last event.
    #[test]
    fn prop_burst_flushes_each_key_once(
        batches in prop::collection::vec(
            (prop::collection::vec(arb_query_key(), 1..4), 0u64..300, arb_change_kind()),
            1..12,
        ),
    ) {
        let debounce = Duration::from_millis(300);
        let mut router = EventRouter::new(MutationTracker::new(), debounce);
        let start = Instant::now();
        let mut now = start;
        let mut expected: BTreeSet<QueryKey> = BTreeSet::new();

        for (index, (keys, gap_ms, kind)) in batches.iter().enumerate() {
            now += Duration::from_millis(*gap_ms);
            prop_assert!(router.flush_due(now).is_empty());
            let event = ChangeEvent::new("sessions", *kind, Some(format!("row-{}", index)));
            let outcome = router.route(&event, keys, now);
            prop_assert_eq!(outcome, RouteOutcome::Queued { deadline: now + debounce });
            expected.extend(keys.iter().cloned());
        }

        prop_assert!(router.flush_due(now + debounce - Duration::from_millis(1)).is_empty());
        let flushed = router.flush_due(now + debounce);
        let distinct: BTreeSet<QueryKey> = flushed.iter().cloned().collect();
        prop_assert_eq!(flushed.len(), distinct.len());
        prop_assert_eq!(distinct, expected);
        prop_assert!(router.flush_due(now + debounce * 10).is_empty());
    }

    /// Suppressed echoes never reach the pending set.
    #[test]
    fn prop_echoes_never_queue(ids in prop::collection::btree_set("[a-z0-9]{1,6}", 1..8)) {
        let clock = ManualClock::new();
        let tracker = MutationTracker::with_clock(Arc::new(clock), WINDOW);
        let mut router = EventRouter::new(tracker.clone(), Duration::from_millis(500));
        let key = QueryKey::from(["student-homework", "s-1"]);
        for id in &ids {
            tracker.record("homework", id);
        }
        for id in &ids {
            let event = ChangeEvent::new("homework", ChangeKind::Update, Some(id.clone()));
            prop_assert_eq!(
                router.route(&event, std::slice::from_ref(&key), Instant::now()),
                RouteOutcome::Suppressed
            );
        }
        prop_assert_eq!(router.deadline(), None);
    }
}
