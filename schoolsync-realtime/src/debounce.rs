//! Burst coalescing for cache invalidations.

use schoolsync_core::QueryKey;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
enum DebounceState {
    Idle,
    Pending {
        deadline: Instant,
        keys: BTreeSet<QueryKey>,
    },
}

/// Per-channel debounce state machine: `Idle -> Pending -> Idle`.
///
/// Every [`push`](Self::push) moves the deadline to `now + window`, so a
/// steady stream of events keeps extending it. Once the deadline passes,
/// [`take_due`](Self::take_due) hands back each distinct key once.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    state: DebounceState,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Add keys to the pending set and restart the window. Returns the new
    /// deadline.
    pub fn push<'a, I>(&mut self, keys: I, now: Instant) -> Instant
    where
        I: IntoIterator<Item = &'a QueryKey>,
    {
        let deadline = now + self.window;
        match &mut self.state {
            DebounceState::Idle => {
                self.state = DebounceState::Pending {
                    deadline,
                    keys: keys.into_iter().cloned().collect(),
                };
            }
            DebounceState::Pending {
                deadline: pending_deadline,
                keys: pending,
            } => {
                *pending_deadline = deadline;
                pending.extend(keys.into_iter().cloned());
            }
        }
        deadline
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            DebounceState::Idle => None,
            DebounceState::Pending { deadline, .. } => Some(*deadline),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == DebounceState::Idle
    }

    pub fn pending_len(&self) -> usize {
        match &self.state {
            DebounceState::Idle => 0,
            DebounceState::Pending { keys, .. } => keys.len(),
        }
    }

    /// If the window has elapsed, return to `Idle` and yield the pending keys.
    pub fn take_due(&mut self, now: Instant) -> Option<Vec<QueryKey>> {
        match &self.state {
            DebounceState::Pending { deadline, .. } if now >= *deadline => {
                match std::mem::replace(&mut self.state, DebounceState::Idle) {
                    DebounceState::Pending { keys, .. } => Some(keys.into_iter().collect()),
                    DebounceState::Idle => None,
                }
            }
            _ => None,
        }
    }

    /// Discard pending work. Returns how many keys were dropped.
    pub fn cancel(&mut self) -> usize {
        let dropped = self.pending_len();
        self.state = DebounceState::Idle;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(root: &str) -> QueryKey {
        QueryKey::from([root, "s-1"])
    }

    #[test]
    fn test_idle_until_push() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        assert!(debouncer.is_idle());
        assert_eq!(debouncer.deadline(), None);
    }

    #[test]
    fn test_push_extends_deadline() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        debouncer.push([&key("a")], start);
        let later = start + Duration::from_millis(200);
        let deadline = debouncer.push([&key("b")], later);
        assert_eq!(deadline, later + Duration::from_millis(300));
        assert_eq!(debouncer.deadline(), Some(deadline));
        assert_eq!(debouncer.pending_len(), 2);
    }

    #[test]
    fn test_take_due_respects_deadline() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer.push([&key("a")], start);
        assert!(debouncer
            .take_due(start + Duration::from_millis(499))
            .is_none());
        let keys = debouncer
            .take_due(start + Duration::from_millis(500))
            .unwrap();
        assert_eq!(keys, vec![key("a")]);
        assert!(debouncer.is_idle());
    }

    #[test]
    fn test_overlapping_keys_flush_once() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let shared = key("student-points");
        debouncer.push([&shared, &key("student-stickers")], start);
        debouncer.push([&shared, &key("student")], start);
        let keys = debouncer.take_due(start + Duration::from_secs(1)).unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys.iter().filter(|k| **k == shared).count(), 1);
    }

    #[test]
    fn test_zero_window_is_due_immediately() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::ZERO);
        debouncer.push([&key("a")], start);
        assert!(debouncer.take_due(start).is_some());
    }

    #[test]
    fn test_cancel_drops_pending() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.push([&key("a"), &key("b")], start);
        assert_eq!(debouncer.cancel(), 2);
        assert!(debouncer.take_due(start + Duration::from_secs(5)).is_none());
    }
}
