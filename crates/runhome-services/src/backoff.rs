//! Exponential cooldown with jitter.
//!
//! Used by adapters that get throttled upstream, so a 429 makes the next calls fail fast
//! instead of hammering the service again.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    next_attempt_at: Instant,
    jitter_ratio: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
            next_attempt_at: Instant::now(),
            jitter_ratio: 0.2,
        }
    }

    pub fn ready(&self) -> bool {
        Instant::now() >= self.next_attempt_at
    }

    /// Time left until the next attempt is allowed.
    pub fn remaining(&self) -> Duration {
        self.next_attempt_at.saturating_duration_since(Instant::now())
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.next_attempt_at = Instant::now();
    }

    /// Record a throttled call. The first failure waits `base`, then doubles up to `max`.
    pub fn fail(&mut self) -> Duration {
        let delay = add_jitter(self.current, self.jitter_ratio);
        self.next_attempt_at = Instant::now() + delay;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    if !(0.0..=1.0).contains(&ratio) {
        return delay;
    }

    let delay_ms = delay.as_millis();
    let jitter_ms_max = ((delay_ms as f64) * ratio) as u128;
    if jitter_ms_max == 0 {
        return delay;
    }

    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    let jitter_ms = (now_nanos as u128) % (jitter_ms_max + 1);
    delay + Duration::from_millis(jitter_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cooldown_is_ready() {
        let backoff = Backoff::new(Duration::from_secs(30), Duration::from_secs(300));
        assert!(backoff.ready());
        assert_eq!(backoff.remaining(), Duration::ZERO);
    }

    #[test]
    fn throttle_blocks_until_reset() {
        let mut backoff = Backoff::new(Duration::from_secs(30), Duration::from_secs(300));
        let delay = backoff.fail();
        assert!(delay >= Duration::from_secs(30));
        assert!(delay <= Duration::from_secs(36));
        assert!(!backoff.ready());
        assert!(backoff.remaining() > Duration::from_secs(25));

        backoff.reset();
        assert!(backoff.ready());
    }

    #[test]
    fn cooldown_doubles_and_saturates() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(30));
        let first = backoff.fail();
        let second = backoff.fail();
        let third = backoff.fail();
        assert!(first <= Duration::from_millis(12));
        assert!(second >= Duration::from_millis(20) && second <= Duration::from_millis(24));
        assert!(third >= Duration::from_millis(30) && third <= Duration::from_millis(36));
    }
}
