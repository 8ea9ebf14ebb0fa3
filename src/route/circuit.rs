//! Circuit breaker state machine for one route, per §4.K.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(v: u8) -> Self {
        match v {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Error count is atomic; the open/half-open transition itself is guarded
/// by a mutex so only one thread flips the state even under a stampede of
/// concurrent failures (the "double-checked locking" note in §4.K).
pub struct CircuitBreaker {
    state: AtomicU8,
    errors: AtomicU32,
    threshold: u32,
    reset_timeout_ms: u64,
    open_since_ms: AtomicU64,
    flip_lock: Mutex<()>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_timeout_ms: u64) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            errors: AtomicU32::new(0),
            threshold,
            reset_timeout_ms,
            open_since_ms: AtomicU64::new(0),
            flip_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether a request should be allowed through right now. While open,
    /// promotes to half-open once `reset_timeout_ms` has elapsed, allowing
    /// exactly one probe.
    pub fn allow(&self, now_ms: u64) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                if now_ms.saturating_sub(self.open_since_ms.load(Ordering::Relaxed)) <= self.reset_timeout_ms {
                    return false;
                }
                let _guard = self.flip_lock.lock();
                if self.state() != CircuitState::Open {
                    return self.state() == CircuitState::Closed;
                }
                self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);
                true
            }
        }
    }

    pub fn record_success(&self) {
        let _guard = self.flip_lock.lock();
        if self.state() == CircuitState::HalfOpen {
            self.errors.store(0, Ordering::Relaxed);
            self.state.store(CircuitState::Closed as u8, Ordering::Release);
        }
    }

    pub fn record_failure(&self, now_ms: u64) {
        if self.state() == CircuitState::HalfOpen {
            let _guard = self.flip_lock.lock();
            self.open(now_ms);
            return;
        }
        let errors = self.errors.fetch_add(1, Ordering::Relaxed) + 1;
        if errors >= self.threshold {
            let _guard = self.flip_lock.lock();
            if self.state() == CircuitState::Closed {
                self.open(now_ms);
            }
        }
    }

    fn open(&self, now_ms: u64) {
        self.open_since_ms.store(now_ms, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.state.store(CircuitState::Open as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed_and_allows_requests() {
        let cb = CircuitBreaker::new(3, 1_000);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow(0));
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(3, 1_000);
        cb.record_failure(0);
        cb.record_failure(1);
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure(2);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow(2));
    }

    #[test]
    fn half_opens_after_reset_timeout_and_allows_one_probe() {
        let cb = CircuitBreaker::new(1, 100);
        cb.record_failure(0);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow(50));
        assert!(cb.allow(200));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // while half-open, further concurrent lookups are rejected until
        // the probe resolves.
        assert!(!cb.allow(200));
    }

    #[test]
    fn successful_probe_closes_the_circuit() {
        let cb = CircuitBreaker::new(1, 100);
        cb.record_failure(0);
        cb.allow(200);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow(200));
    }

    #[test]
    fn failed_probe_reopens_the_circuit() {
        let cb = CircuitBreaker::new(1, 100);
        cb.record_failure(0);
        cb.allow(200);
        cb.record_failure(200);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow(250));
        assert!(cb.allow(400));
    }
}
