//! Realtime synchronization layer.
//!
//! Subscribes to database change-feeds on behalf of one authenticated
//! session and turns change notifications into cache invalidations.
//!
//! # Pipeline
//!
//! ```text
//! SessionIdentity ──► build_profile ──► RealtimeSubscription ──► ChangeFeed
//!                                            │
//!                    FeedSignal::Change ◄────┘
//!                            │
//!                            ▼
//!        EventRouter: MutationTracker (echo?) ──► Debouncer ──► QueryCache::invalidate
//! ```
//!
//! [`RealtimeManager`] follows identity and lifecycle signals, rebuilding the
//! subscription when the identity changes and refreshing everything when the
//! app returns to the foreground.

pub mod backoff;
pub mod cache;
pub mod clock;
pub mod context;
pub mod debounce;
pub mod error;
pub mod feed;
pub mod lifecycle;
pub mod manager;
pub mod registry;
pub mod router;
pub mod settings;
pub mod status;
pub mod subscription;
pub mod tracker;

pub use backoff::{Backoff, ReconnectConfig};
pub use cache::QueryCache;
pub use clock::{Clock, TokioClock};
pub use context::RealtimeContext;
pub use debounce::Debouncer;
pub use error::{RealtimeError, RealtimeResult, TransportError};
pub use feed::{ChangeEvent, ChangeFeed, FeedChannel, FeedSignal, ListenerSpec};
pub use lifecycle::{AppState, LifecycleAction, LifecycleController};
pub use manager::RealtimeManager;
pub use registry::{ChannelClaim, ChannelRegistry};
pub use router::{EventRouter, RouteOutcome};
pub use settings::RealtimeSettings;
pub use status::{RealtimeStatus, StatusHandle};
pub use subscription::RealtimeSubscription;
pub use tracker::{MutationTracker, DEFAULT_DEDUP_WINDOW};
