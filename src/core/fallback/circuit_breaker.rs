//! Per-provider circuit breaker: closed → open → half-open → closed.

use crate::utils::clock::Clock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: State,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Configuration for a single circuit.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, cooldown: Duration::from_secs(60) }
    }
}

/// Totally-ordered (mutex-guarded) failure/success tracker for one provider.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(Inner { state: State::Closed, failure_count: 0, last_failure: None }),
        }
    }

    /// Whether a call may proceed. An `Open` circuit whose cooldown has
    /// elapsed transitions to `HalfOpen` and allows exactly one trial.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| self.clock.now().saturating_duration_since(t))
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.cooldown {
                    inner.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = State::Closed;
        inner.failure_count = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(self.clock.now());
        match inner.state {
            State::HalfOpen => {
                inner.state = State::Open;
            }
            State::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = State::Open;
                }
            }
            State::Open => {}
        }
    }

    pub fn is_open(&self) -> bool {
        !self.allow_request()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::TestClock;

    fn breaker(threshold: u32, cooldown: Duration) -> (CircuitBreaker, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig { failure_threshold: threshold, cooldown },
            clock.clone(),
        );
        (cb, clock)
    }

    #[test]
    fn opens_exactly_at_threshold() {
        let (cb, _clock) = breaker(3, Duration::from_secs(60));
        cb.record_failure();
        assert!(cb.allow_request());
        cb.record_failure();
        assert!(cb.allow_request());
        cb.record_failure();
        assert!(!cb.allow_request());
    }

    #[test]
    fn half_open_trial_failure_reopens_and_resets_cooldown() {
        let (cb, clock) = breaker(1, Duration::from_millis(1000));
        cb.record_failure();
        assert!(!cb.allow_request());
        clock.advance(Duration::from_millis(1000));
        assert!(cb.allow_request());
        cb.record_failure();
        assert!(!cb.allow_request());
    }

    #[test]
    fn half_open_trial_success_closes_and_resets_counter() {
        let (cb, clock) = breaker(1, Duration::from_millis(500));
        cb.record_failure();
        clock.advance(Duration::from_millis(500));
        assert!(cb.allow_request());
        cb.record_success();
        cb.record_failure();
        assert!(cb.allow_request());
    }

    #[test]
    fn open_circuit_blocked_until_cooldown_elapses() {
        let (cb, clock) = breaker(1, Duration::from_secs(60));
        cb.record_failure();
        assert!(!cb.allow_request());
        clock.advance(Duration::from_secs(59));
        assert!(!cb.allow_request());
        clock.advance(Duration::from_secs(1));
        assert!(cb.allow_request());
    }
}
