//! schoolsync Test Utilities
//!
//! Shared test infrastructure for the schoolsync workspace:
//! - Fakes for the realtime seams (change feed, query cache, clock)
//! - Proptest generators for identities and keys
//! - Fixtures for the four roles
//! - Assertions over recorded invalidations

pub use schoolsync_core::{
    build_profile, ChangeKind, QueryKey, RoleSubscriptionProfile, SessionIdentity,
    SubscriptionConfig,
};
pub use schoolsync_realtime::{
    ChangeEvent, ChangeFeed, Clock, FeedChannel, FeedSignal, ListenerSpec, QueryCache,
    RealtimeContext, RealtimeSettings, TransportError,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Let spawned tasks run until they block, without moving a paused clock.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// MANUAL CLOCK
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.offset) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *lock(&self.offset)
    }
}

// ============================================================================
// SCRIPTED CHANGE FEED
// ============================================================================

/// Channel lifecycle as observed by the fake feed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLogEntry {
    Opened(String),
    /// Closed by the client.
    Closed(String),
    /// Closed by [`ScriptedChangeFeed::drop_connection`].
    Dropped(String),
    /// Rejected by [`ScriptedChangeFeed::fail_next_opens`].
    Refused(String),
    /// Held forever by [`ScriptedChangeFeed::stall_next_opens`].
    Stalled(String),
}

#[derive(Debug)]
struct LiveChannel {
    id: u64,
    name: String,
    listeners: Vec<ListenerSpec>,
    tx: mpsc::UnboundedSender<FeedSignal>,
    open: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct FeedState {
    next_id: u64,
    log: Vec<FeedLogEntry>,
    fail_next: usize,
    stall_next: usize,
    live: Vec<LiveChannel>,
    max_live: usize,
}

impl FeedState {
    fn release(&mut self, id: u64, entry: FeedLogEntry) {
        if let Some(index) = self.live.iter().position(|c| c.id == id) {
            let channel = self.live.remove(index);
            channel.open.store(false, Ordering::SeqCst);
            self.log.push(entry);
        }
    }
}

/// In-memory [`ChangeFeed`] driven by the test.
///
/// Every successful `open` immediately queues [`FeedSignal::Subscribed`].
/// Tests then push changes with [`emit_change`](Self::emit_change) and
/// inspect the open/close history with [`log`](Self::log).
#[derive(Debug, Clone, Default)]
pub struct ScriptedChangeFeed {
    state: Arc<Mutex<FeedState>>,
}

impl ScriptedChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `open` fail with a connect error.
    pub fn fail_next_opens(&self, count: usize) {
        lock(&self.state).fail_next = count;
    }

    /// Make the next `count` calls to `open` never resolve, like a connect to
    /// a blackholed host.
    pub fn stall_next_opens(&self, count: usize) {
        lock(&self.state).stall_next = count;
    }

    /// Deliver a raw signal to the live channel called `name`.
    pub fn emit(&self, name: &str, signal: FeedSignal) -> bool {
        let state = lock(&self.state);
        state
            .live
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.tx.send(signal).is_ok())
            .unwrap_or(false)
    }

    /// Deliver a change to the first listener on `table` that accepts `kind`.
    ///
    /// Returns false when no live channel has such a listener, which is what
    /// the server would do with a change nobody subscribed to.
    pub fn emit_change(&self, name: &str, table: &str, kind: ChangeKind, record_id: &str) -> bool {
        let state = lock(&self.state);
        let Some(channel) = state.live.iter().find(|c| c.name == name) else {
            return false;
        };
        let Some(listener) = channel
            .listeners
            .iter()
            .position(|l| l.table == table && l.event.accepts(kind))
        else {
            return false;
        };
        let event = ChangeEvent::new(table, kind, Some(record_id.to_string()))
            .with_payload(serde_json::json!({ "id": record_id }));
        channel.tx.send(FeedSignal::Change { listener, event }).is_ok()
    }

    /// Simulate the server dropping the channel.
    pub fn drop_connection(&self, name: &str, reason: &str) -> bool {
        let mut state = lock(&self.state);
        let Some(channel) = state.live.iter().find(|c| c.name == name) else {
            return false;
        };
        let id = channel.id;
        let _ = channel.tx.send(FeedSignal::Closed {
            reason: reason.to_string(),
        });
        state.release(id, FeedLogEntry::Dropped(name.to_string()));
        true
    }

    pub fn log(&self) -> Vec<FeedLogEntry> {
        lock(&self.state).log.clone()
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state)
            .log
            .iter()
            .filter(|e| matches!(e, FeedLogEntry::Opened(_)))
            .count()
    }

    pub fn live_count(&self) -> usize {
        lock(&self.state).live.len()
    }

    /// Most channels ever open at the same moment.
    pub fn max_live(&self) -> usize {
        lock(&self.state).max_live
    }

    pub fn is_live(&self, name: &str) -> bool {
        lock(&self.state).live.iter().any(|c| c.name == name)
    }

    /// Listeners attached to the live channel called `name`.
    pub fn listeners(&self, name: &str) -> Option<Vec<ListenerSpec>> {
        lock(&self.state)
            .live
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.listeners.clone())
    }
}

#[async_trait]
impl ChangeFeed for ScriptedChangeFeed {
    async fn open(
        &self,
        channel_name: &str,
        listeners: &[ListenerSpec],
    ) -> Result<Box<dyn FeedChannel>, TransportError> {
        let stall = {
            let mut state = lock(&self.state);
            let stall = state.stall_next > 0;
            if stall {
                state.stall_next -= 1;
                state.log.push(FeedLogEntry::Stalled(channel_name.to_string()));
            }
            stall
        };
        if stall {
            std::future::pending::<()>().await;
        }

        let mut state = lock(&self.state);
        if state.fail_next > 0 {
            state.fail_next -= 1;
            state.log.push(FeedLogEntry::Refused(channel_name.to_string()));
            return Err(TransportError::Connect("scripted connect failure".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(FeedSignal::Subscribed);
        let open = Arc::new(AtomicBool::new(true));
        let id = state.next_id;
        state.next_id += 1;
        state.live.push(LiveChannel {
            id,
            name: channel_name.to_string(),
            listeners: listeners.to_vec(),
            tx,
            open: Arc::clone(&open),
        });
        state.max_live = state.max_live.max(state.live.len());
        state.log.push(FeedLogEntry::Opened(channel_name.to_string()));

        Ok(Box::new(ScriptedChannel {
            id,
            name: channel_name.to_string(),
            rx,
            open,
            state: Arc::clone(&self.state),
        }))
    }
}

struct ScriptedChannel {
    id: u64,
    name: String,
    rx: mpsc::UnboundedReceiver<FeedSignal>,
    open: Arc<AtomicBool>,
    state: Arc<Mutex<FeedState>>,
}

#[async_trait]
impl FeedChannel for ScriptedChannel {
    async fn next_signal(&mut self) -> Option<FeedSignal> {
        self.rx.recv().await
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        lock(&self.state).release(self.id, FeedLogEntry::Closed(self.name.clone()));
        self.rx.close();
        Ok(())
    }
}

impl Drop for ScriptedChannel {
    fn drop(&mut self) {
        lock(&self.state).release(self.id, FeedLogEntry::Closed(self.name.clone()));
    }
}

// ============================================================================
// RECORDING CACHE
// ============================================================================

/// [`QueryCache`] that remembers every invalidation in call order.
#[derive(Debug, Clone, Default)]
pub struct RecordingCache {
    invalidations: Arc<Mutex<Vec<QueryKey>>>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidations(&self) -> Vec<QueryKey> {
        lock(&self.invalidations).clone()
    }

    pub fn count_for(&self, key: &QueryKey) -> usize {
        lock(&self.invalidations).iter().filter(|k| *k == key).count()
    }

    pub fn len(&self) -> usize {
        lock(&self.invalidations).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.invalidations).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.invalidations).clear();
    }
}

impl QueryCache for RecordingCache {
    fn invalidate(&self, key: &QueryKey) {
        lock(&self.invalidations).push(key.clone());
    }
}

/// Context wired to fresh fakes.
pub fn scripted_context(settings: RealtimeSettings) -> (RealtimeContext, ScriptedChangeFeed, RecordingCache) {
    let feed = ScriptedChangeFeed::new();
    let cache = RecordingCache::new();
    match RealtimeContext::new(Arc::new(feed.clone()), Arc::new(cache.clone()), settings) {
        Ok(ctx) => (ctx, feed, cache),
        Err(e) => panic!("invalid test settings: {}", e),
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for session identities and query keys.

    use super::*;
    use proptest::prelude::*;

    /// Short, non-empty identifier.
    pub fn arb_id() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}"
    }

    pub fn arb_ids(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_id(), 0..=max)
    }

    pub fn arb_change_kind() -> impl Strategy<Value = ChangeKind> {
        prop_oneof![
            Just(ChangeKind::Insert),
            Just(ChangeKind::Update),
            Just(ChangeKind::Delete),
        ]
    }

    pub fn arb_query_key() -> impl Strategy<Value = QueryKey> {
        prop::collection::vec("[a-z-]{1,12}", 1..=3).prop_map(QueryKey::new)
    }

    pub fn arb_identity() -> impl Strategy<Value = SessionIdentity> {
        prop_oneof![
            (arb_id(), prop::option::of(arb_id())).prop_map(|(student_id, class_id)| {
                SessionIdentity::Student { student_id, class_id }
            }),
            (arb_id(), arb_id(), arb_ids(4)).prop_map(|(teacher_id, school_id, class_ids)| {
                SessionIdentity::Teacher {
                    teacher_id,
                    school_id,
                    class_ids,
                }
            }),
            (arb_id(), arb_ids(4)).prop_map(|(parent_id, child_ids)| SessionIdentity::Parent {
                parent_id,
                child_ids,
            }),
            (arb_id(), arb_id()).prop_map(|(admin_id, school_id)| SessionIdentity::Admin {
                admin_id,
                school_id,
            }),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built identities and events for common scenarios.

    use super::*;
    use uuid::Uuid;

    pub fn student() -> SessionIdentity {
        SessionIdentity::Student {
            student_id: "s-1".to_string(),
            class_id: Some("c-1".to_string()),
        }
    }

    pub fn unenrolled_student() -> SessionIdentity {
        SessionIdentity::Student {
            student_id: "s-1".to_string(),
            class_id: None,
        }
    }

    pub fn teacher(class_ids: &[&str]) -> SessionIdentity {
        SessionIdentity::Teacher {
            teacher_id: "t-1".to_string(),
            school_id: "sch-1".to_string(),
            class_ids: class_ids.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn parent(child_ids: &[&str]) -> SessionIdentity {
        SessionIdentity::Parent {
            parent_id: "p-1".to_string(),
            child_ids: child_ids.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn admin() -> SessionIdentity {
        SessionIdentity::Admin {
            admin_id: "adm-1".to_string(),
            school_id: "sch-1".to_string(),
        }
    }

    /// Settings with jitter disabled so reconnect timing is exact.
    pub fn deterministic_settings() -> RealtimeSettings {
        let mut settings = RealtimeSettings::default();
        settings.reconnect.jitter_ms = 0;
        settings
    }

    /// A change for a freshly minted row id.
    pub fn sample_change(table: &str, kind: ChangeKind) -> ChangeEvent {
        let id = Uuid::now_v7().to_string();
        ChangeEvent::new(table, kind, Some(id.clone()))
            .with_payload(serde_json::json!({ "id": id }))
    }

    pub fn profile_for(identity: &SessionIdentity) -> RoleSubscriptionProfile {
        match build_profile(identity) {
            Ok(profile) => profile,
            Err(e) => panic!("fixture identity produced invalid profile: {}", e),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over what a [`RecordingCache`] saw.

    use super::*;

    #[track_caller]
    pub fn assert_invalidated_once(cache: &RecordingCache, key: &QueryKey) {
        let count = cache.count_for(key);
        assert_eq!(
            count, 1,
            "Expected {} invalidated exactly once, got {} (all: {:?})",
            key,
            count,
            cache.invalidations()
        );
    }

    #[track_caller]
    pub fn assert_not_invalidated(cache: &RecordingCache, key: &QueryKey) {
        assert_eq!(
            cache.count_for(key),
            0,
            "Expected {} not to be invalidated (all: {:?})",
            key,
            cache.invalidations()
        );
    }

    /// Every key in `profile` was invalidated at least once.
    #[track_caller]
    pub fn assert_profile_refreshed(cache: &RecordingCache, profile: &RoleSubscriptionProfile) {
        for key in profile.all_query_keys() {
            assert!(
                cache.count_for(&key) >= 1,
                "Expected {} to be refreshed (all: {:?})",
                key,
                cache.invalidations()
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
