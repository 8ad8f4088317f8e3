//! The detection loop's tick source.
//!
//! One tick is one scheduling opportunity, analogous to one display
//! refresh. The loop performs at most one inference per tick and yields
//! between ticks, which bounds CPU/GPU load without an explicit rate
//! limiter.

use std::future::Future;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

pub trait FrameClock: Send + 'static {
    /// Wait for the next scheduling opportunity.
    fn next_frame(&mut self) -> impl Future<Output = ()> + Send;
}

/// Interval-driven clock. Missed ticks are skipped, not burst: when the
/// loop falls behind (slow inference, suspended process) the backlog is
/// dropped the way coalesced display refreshes would be.
pub struct RefreshClock {
    period: Duration,
    interval: Option<Interval>,
}

impl RefreshClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / hz.max(1) as f64))
    }
}

impl Clone for RefreshClock {
    /// Clones start with a fresh schedule; the first tick fires immediately.
    fn clone(&self) -> Self {
        Self::new(self.period)
    }
}

impl FrameClock for RefreshClock {
    async fn next_frame(&mut self) {
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        interval.tick().await;
    }
}
