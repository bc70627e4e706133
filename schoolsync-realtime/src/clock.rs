//! Time source abstraction.

use tokio::time::Instant;

/// Monotonic time source.
///
/// The mutation tracker reads time through this trait so tests can drive it
/// deterministically. [`TokioClock`] follows tokio's clock, which means
/// `tokio::time::pause()` and `advance()` also apply to it.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
