//! Circuit breaker guarding outbound calls to the substrate service.
//!
//! Per-process, thread-safe, mutated under a single lock — not distributed.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    half_open_requests: u32,
}

/// Three-state circuit breaker: closed → open → half-open → closed|open.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    cooldown: Duration,
    half_open_max_requests: u32,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Closed,
                failure_count: 0,
                last_failure_at: None,
                half_open_requests: 0,
            }),
            failure_threshold: config.failure_threshold,
            cooldown: config.cooldown,
            half_open_max_requests: config.half_open_max_requests,
        }
    }

    /// Whether a request may be attempted right now. Transitions open → half-open
    /// when the cooldown has elapsed.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        match inner.state {
            State::Closed => true,
            State::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|t| t.elapsed() >= self.cooldown)
                    .unwrap_or(false);
                if elapsed {
                    tracing::info!("circuit breaker: cooldown elapsed, entering half-open");
                    inner.state = State::HalfOpen;
                    inner.half_open_requests = 0;
                    true
                } else {
                    false
                }
            }
            State::HalfOpen => {
                if inner.half_open_requests < self.half_open_max_requests {
                    inner.half_open_requests += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        match inner.state {
            State::HalfOpen => {
                tracing::info!("circuit breaker: probe succeeded, closing circuit");
                inner.state = State::Closed;
                inner.failure_count = 0;
                inner.half_open_requests = 0;
            }
            State::Closed => {
                inner.failure_count = 0;
            }
            State::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            State::HalfOpen => {
                tracing::warn!("circuit breaker: probe failed, reopening circuit");
                inner.state = State::Open;
                inner.half_open_requests = 0;
            }
            State::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    tracing::error!(
                        failures = inner.failure_count,
                        "circuit breaker: opening circuit"
                    );
                    inner.state = State::Open;
                }
            }
            State::Open => {}
        }
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        matches!(self.inner.lock().unwrap().state, State::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, cooldown_secs: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(cooldown_secs),
            half_open_max_requests: 3,
        }
    }

    #[test]
    fn stays_closed_under_threshold() {
        let cb = CircuitBreaker::new(&config(5, 60));
        for _ in 0..4 {
            assert!(cb.allow_request());
            cb.record_failure();
        }
        assert!(!cb.is_open());
        assert!(cb.allow_request());
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new(&config(5, 60));
        for _ in 0..5 {
            assert!(cb.allow_request());
            cb.record_failure();
        }
        assert!(cb.is_open());
        // Sixth call fails fast, no probe consumed.
        assert!(!cb.allow_request());
    }

    #[test]
    fn success_resets_failure_count_when_closed() {
        let cb = CircuitBreaker::new(&config(3, 60));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        // Would have opened at 3 consecutive, but success reset the counter.
        assert!(!cb.is_open());
    }

    #[test]
    fn half_open_probe_success_closes_circuit() {
        let cb = CircuitBreaker::new(&config(1, 0));
        assert!(cb.allow_request());
        cb.record_failure();
        assert!(cb.is_open());
        // Cooldown is zero, so the next call is admitted as a probe.
        assert!(cb.allow_request());
        cb.record_success();
        assert!(!cb.is_open());
    }

    #[test]
    fn half_open_probe_failure_reopens_and_resets_timer() {
        let cb = CircuitBreaker::new(&config(1, 0));
        cb.allow_request();
        cb.record_failure();
        assert!(cb.allow_request()); // probe admitted
        cb.record_failure();
        assert!(cb.is_open());
    }
}
