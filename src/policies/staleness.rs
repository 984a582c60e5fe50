//! # Heartbeat staleness windows.
//!
//! [`StalenessPolicy`] converts the supervisor period into per-task staleness windows.
//! The consumer gets a longer window than the producer because it legitimately
//! spends up to one receive timeout without stamping.

use std::time::Duration;

use crate::host::{Tick, ticks};

/// Multipliers applied to the supervisor period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StalenessPolicy {
    /// Producer window = `producer_periods × supervisor_period`.
    pub producer_periods: u32,
    /// Consumer window = `consumer_periods × supervisor_period`.
    pub consumer_periods: u32,
}

impl Default for StalenessPolicy {
    /// Returns `3×` for the producer and `5×` for the consumer.
    fn default() -> Self {
        Self {
            producer_periods: 3,
            consumer_periods: 5,
        }
    }
}

impl StalenessPolicy {
    /// Producer staleness window in ticks.
    #[inline]
    pub fn producer_window(&self, period: Duration) -> Tick {
        ticks(period).saturating_mul(Tick::from(self.producer_periods))
    }

    /// Consumer staleness window in ticks.
    #[inline]
    pub fn consumer_window(&self, period: Duration) -> Tick {
        ticks(period).saturating_mul(Tick::from(self.consumer_periods))
    }
}

/// True when strictly more than `window` ticks elapsed since `last_seen`.
#[inline]
pub fn is_stale(now: Tick, last_seen: Tick, window: Tick) -> bool {
    now.saturating_sub(last_seen) > window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows() {
        let p = StalenessPolicy::default();
        let period = Duration::from_millis(1500);
        assert_eq!(p.producer_window(period), 4500);
        assert_eq!(p.consumer_window(period), 7500);
    }

    #[test]
    fn test_window_boundary_is_not_stale() {
        assert!(!is_stale(4500, 0, 4500));
        assert!(is_stale(4501, 0, 4500));
    }

    #[test]
    fn test_future_heartbeat_is_fresh() {
        assert!(!is_stale(100, 200, 10));
    }
}
