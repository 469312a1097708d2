//! Time source for cache freshness, debounce deadlines and retry backoff.
//!
//! Production code uses [`SystemClock`]. Tests use [`ManualClock`], whose `sleep`
//! advances the clock instead of waiting, so TTL and debounce behaviour can be
//! checked to the millisecond without real delays.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
            slept: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Starts at a fixed instant so test output is reproducible.
    pub fn at_epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(20_000))
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now = after(*now, duration);
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }

    /// Every duration passed to `sleep`, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
        self.advance(duration);
    }
}

/// Time from `earlier` to `later`, zero when `later` is not after `earlier`.
pub fn elapsed(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or_default()
}

pub fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// `instant + duration`, saturating at the latest representable time.
pub fn after(instant: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    instant
        .checked_add_signed(to_delta(duration))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_clock_sleep_advances_time() {
        let clock = ManualClock::at_epoch();
        let start = clock.now();
        clock.sleep(Duration::from_secs(5)).await;
        assert_eq!(elapsed(start, clock.now()), Duration::from_secs(5));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn after_saturates_instead_of_overflowing() {
        let clock = ManualClock::at_epoch();
        let huge = Duration::from_millis(u64::MAX);
        assert_eq!(after(clock.now(), huge), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            after(clock.now(), Duration::from_secs(2)),
            clock.now() + TimeDelta::seconds(2)
        );
    }

    #[test]
    fn elapsed_is_zero_for_past_instants() {
        let clock = ManualClock::at_epoch();
        let now = clock.now();
        clock.advance(Duration::from_millis(10));
        assert_eq!(elapsed(clock.now(), now), Duration::ZERO);
    }
}
