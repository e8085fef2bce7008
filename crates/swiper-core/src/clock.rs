//! Wall-clock sources for window scheduling.
//!
//! Window boundaries come from wall time, but waiting is done on tokio's
//! timer. `AnchoredClock` ties the two together so tests running with paused
//! tokio time see windows rotate without real delay.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall time.
    fn now(&self) -> SystemTime;

    /// Sleep until the wall clock reaches `deadline`. Returns immediately if
    /// it already has.
    async fn sleep_until(&self, deadline: SystemTime) {
        let remaining = deadline
            .duration_since(self.now())
            .unwrap_or(Duration::ZERO);
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
    }
}

/// The host's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Wall time pinned at construction, advanced by tokio's monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    wall: SystemTime,
    base: tokio::time::Instant,
}

impl AnchoredClock {
    /// Anchor `wall` to the current tokio instant.
    pub fn new(wall: SystemTime) -> Self {
        Self {
            wall,
            base: tokio::time::Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> SystemTime {
        self.wall + self.base.elapsed()
    }
}
