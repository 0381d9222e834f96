//! Interval and backoff helpers for the daemon's three periodic tasks:
//! auto-commit debounce, remote-sync, and housekeeping.

use std::time::Duration;

use beads_config::DaemonConfig;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Builds the auto-commit debounce ticker.
///
/// Fires every `auto_commit_debounce_secs`; the caller only acts on a tick
/// when [`crate::state::DaemonState::take_dirty`] returns `true`, so a quiet
/// workspace just burns empty ticks rather than missing a debounce window.
pub fn auto_commit_ticker(config: &DaemonConfig) -> Interval {
    make_interval(Duration::from_secs(config.auto_commit_debounce_secs.max(1)))
}

/// Builds the remote-sync ticker, honoring the `0` (disabled) and 5s floor
/// semantics documented on [`DaemonConfig::remote_sync_interval`].
///
/// Returns `None` when periodic remote sync is disabled, so the caller can
/// omit that branch from its `select!` entirely rather than spin on a timer
/// that must never fire.
pub fn remote_sync_ticker(config: &DaemonConfig) -> Option<Interval> {
    let period = config.remote_sync_interval();
    if period.is_zero() {
        None
    } else {
        Some(make_interval(period))
    }
}

/// Builds the housekeeping ticker (stale lock sweep, wisp TTL expiry).
pub fn housekeeping_ticker(config: &DaemonConfig) -> Interval {
    make_interval(Duration::from_secs(config.housekeeping_interval_secs.max(1)))
}

fn make_interval(period: Duration) -> Interval {
    let mut iv = interval(period);
    // A tick missed because the loop was busy elsewhere should not cause a
    // burst of catch-up ticks; skip straight to the next scheduled one.
    iv.set_missed_tick_behavior(MissedTickBehavior::Skip);
    iv
}

/// Exponential backoff for the remote-sync ticker when a cycle fails
/// (network down, remote rejected push, etc). Resets to the configured base
/// interval on the next success.
pub struct Backoff {
    base: Duration,
    cap: Duration,
    multiplier: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(config: &DaemonConfig) -> Self {
        let base = config.remote_sync_interval();
        Self {
            base,
            cap: Duration::from_secs(config.backoff_cap_secs),
            multiplier: config.backoff_multiplier.max(1.0),
            current: base,
        }
    }

    /// Returns the delay to wait before the next retry and advances state.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let scaled = self.current.mul_f64(self.multiplier);
        self.current = scaled.min(self.cap);
        delay
    }

    /// Resets the backoff to the base interval after a successful cycle.
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DaemonConfig {
        DaemonConfig {
            remote_sync_interval_secs: 10,
            backoff_multiplier: 2.0,
            backoff_cap_secs: 40,
            ..Default::default()
        }
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let mut b = Backoff::new(&config());
        assert_eq!(b.next_delay(), Duration::from_secs(10));
        assert_eq!(b.next_delay(), Duration::from_secs(20));
        assert_eq!(b.next_delay(), Duration::from_secs(40));
        assert_eq!(b.next_delay(), Duration::from_secs(40));
    }

    #[test]
    fn backoff_resets() {
        let mut b = Backoff::new(&config());
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(10));
    }
}
