use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Source of time for the readiness loop.
///
/// The loop never calls `tokio::time` directly, so tests can drive any
/// number of failed probes without real delays.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Block the bootstrap for `duration`. Nothing else runs meanwhile.
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}
