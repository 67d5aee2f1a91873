//! Token-bucket rate limiter for per-session inbound message throttling,
//! simplified to a single-key, synchronous bucket since each session owns
//! exactly one.

use crate::utils::clock::Clock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A single session's token bucket. `consume` never blocks: on empty bucket
/// it simply reports failure, and the caller drops the one message rather
/// than the session.
pub struct TokenBucket {
    capacity: f64,
    tokens_per_second: f64,
    clock: Arc<dyn Clock>,
    state: Mutex<Bucket>,
}

impl TokenBucket {
    /// `capacity` tokens, refilling at `refill_per_minute` tokens/minute.
    pub fn new(capacity: u32, refill_per_minute: u32, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            capacity: capacity as f64,
            tokens_per_second: refill_per_minute as f64 / 60.0,
            clock,
            state: Mutex::new(Bucket { tokens: capacity as f64, last_refill: now }),
        }
    }

    /// Attempt to consume one token. Returns `true` if a token was
    /// available and consumed.
    pub fn try_consume(&self) -> bool {
        let mut bucket = self.state.lock();
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.tokens_per_second).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::TestClock;
    use std::time::Duration;

    #[test]
    fn drains_to_empty_after_capacity_consumed() {
        let clock = Arc::new(TestClock::new());
        let bucket = TokenBucket::new(3, 60, clock);
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
    }

    #[test]
    fn refills_over_time_without_exceeding_capacity() {
        let clock = Arc::new(TestClock::new());
        let bucket = TokenBucket::new(2, 60, clock.clone());
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());

        clock.advance(Duration::from_secs(60));
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
    }
}
