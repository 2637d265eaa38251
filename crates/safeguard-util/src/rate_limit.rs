//! Rate limiting utilities

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Enforces a minimum spacing between attempts for the same key.
///
/// Used to keep repeated notice/escalation retries for one session from
/// spamming contacts. Time is supplied by the caller so the throttle follows
/// whatever clock the engine runs on.
#[derive(Debug)]
pub struct RetryThrottle<K> {
    min_interval: Duration,
    last_attempt: HashMap<K, DateTime<Utc>>,
}

impl<K: Eq + Hash + Clone> RetryThrottle<K> {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_attempt: HashMap::new(),
        }
    }

    /// Returns `true` and records the attempt if `key` may be attempted at `now`
    pub fn try_acquire(&mut self, key: &K, now: DateTime<Utc>) -> bool {
        if !self.is_ready(key, now) {
            return false;
        }
        self.last_attempt.insert(key.clone(), now);
        true
    }

    /// Check without recording
    pub fn is_ready(&self, key: &K, now: DateTime<Utc>) -> bool {
        match self.last_attempt.get(key) {
            Some(last) => now.signed_duration_since(*last) >= min_interval_chrono(self.min_interval),
            None => true,
        }
    }

    /// Earliest time `key` may be attempted again, if it is currently throttled
    pub fn ready_at(&self, key: &K) -> Option<DateTime<Utc>> {
        self.last_attempt
            .get(key)
            .map(|last| *last + min_interval_chrono(self.min_interval))
    }

    /// Seed the throttle with a previously recorded attempt
    pub fn record(&mut self, key: K, at: DateTime<Utc>) {
        self.last_attempt.insert(key, at);
    }

    /// Drop every key for which `keep` returns `false`
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.last_attempt.retain(|key, _| keep(key));
    }
}

fn min_interval_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

/// Simple token-bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter<K> {
    /// Maximum tokens (requests) per bucket
    max_tokens: u32,
    /// How often tokens are replenished
    refill_interval: Duration,
    buckets: HashMap<K, Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_requests` - Maximum requests allowed per interval
    /// * `interval` - Time interval for the limit
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_tokens: max_requests,
            refill_interval: interval,
            buckets: HashMap::new(),
        }
    }

    /// Returns `true` if allowed, `false` if rate limited
    pub fn check(&mut self, key: &K) -> bool {
        let now = Instant::now();

        let bucket = self.buckets.entry(key.clone()).or_insert(Bucket {
            tokens: self.max_tokens,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill);
        if elapsed >= self.refill_interval {
            let intervals = (elapsed.as_millis() / self.refill_interval.as_millis().max(1)) as u32;
            bucket.tokens = bucket
                .tokens
                .saturating_add(intervals.saturating_mul(self.max_tokens))
                .min(self.max_tokens);
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, key: &K) {
        self.buckets.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn throttle_spaces_attempts() {
        let mut throttle = RetryThrottle::new(Duration::from_secs(60));

        assert!(throttle.try_acquire(&1, t(0)));
        assert!(!throttle.try_acquire(&1, t(30)));
        assert!(!throttle.try_acquire(&1, t(59)));
        assert!(throttle.try_acquire(&1, t(60)));
        assert_eq!(throttle.ready_at(&1), Some(t(120)));
    }

    #[test]
    fn throttle_keys_are_independent() {
        let mut throttle = RetryThrottle::new(Duration::from_secs(60));
        assert!(throttle.try_acquire(&"a", t(0)));
        assert!(throttle.try_acquire(&"b", t(1)));
        throttle.retain(|key| *key != "a");
        assert!(throttle.try_acquire(&"a", t(2)));
        assert!(!throttle.try_acquire(&"b", t(2)));
    }

    #[test]
    fn recorded_attempt_throttles() {
        let mut throttle = RetryThrottle::new(Duration::from_secs(60));
        throttle.record(7, t(0));
        assert!(!throttle.try_acquire(&7, t(5)));
        assert_eq!(throttle.ready_at(&7), Some(t(60)));
        assert!(throttle.try_acquire(&7, t(60)));
    }

    #[test]
    fn rate_limiter_allows_within_limit() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));

        for _ in 0..5 {
            assert!(limiter.check(&"client"));
        }

        assert!(!limiter.check(&"client"));
        assert!(limiter.check(&"other"));
    }
}
