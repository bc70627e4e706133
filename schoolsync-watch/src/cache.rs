//! Cache sink for the watcher: there is no real cache, so invalidations are
//! logged and counted.

use schoolsync_core::QueryKey;
use schoolsync_realtime::QueryCache;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LoggingCache {
    invalidations: AtomicU64,
}

impl LoggingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }
}

impl QueryCache for LoggingCache {
    fn invalidate(&self, key: &QueryKey) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::info!(key = %key, "Invalidate query");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_invalidations() {
        let cache = LoggingCache::new();
        cache.invalidate(&QueryKey::from(["student", "s-1"]));
        cache.invalidate(&QueryKey::from(["student-points", "s-1"]));
        assert_eq!(cache.invalidations(), 2);
    }
}
