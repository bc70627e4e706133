//! The external query cache, seen from the realtime layer.

use schoolsync_core::QueryKey;
use std::sync::Arc;

/// Key-indexed read-through cache.
///
/// The realtime layer only ever invalidates. Implementations schedule the
/// refetch and return immediately; the router never waits on it.
pub trait QueryCache: Send + Sync {
    fn invalidate(&self, key: &QueryKey);
}

impl<C: QueryCache + ?Sized> QueryCache for Arc<C> {
    fn invalidate(&self, key: &QueryKey) {
        (**self).invalidate(key)
    }
}
