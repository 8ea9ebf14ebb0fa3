//! Token-bucket rate limiter — component L.

use std::collections::HashMap;

use parking_lot::Mutex;

struct Bucket {
    tokens: f64,
    max_tokens: f64,
    tokens_per_second: f64,
    last_refill_ms: u64,
}

impl Bucket {
    fn new(max_tokens: u32, tokens_per_second: u32, now_ms: u64) -> Self {
        Self {
            tokens: max_tokens as f64,
            max_tokens: max_tokens as f64,
            tokens_per_second: tokens_per_second as f64,
            last_refill_ms: now_ms,
        }
    }

    /// Refills by `tokens_per_second * elapsed_ms / 1000`, capped at
    /// `max_tokens`, then takes one token if available.
    fn check(&mut self, now_ms: u64) -> bool {
        let elapsed_ms = now_ms.saturating_sub(self.last_refill_ms) as f64;
        self.tokens = (self.tokens + self.tokens_per_second * elapsed_ms / 1000.0).min(self.max_tokens);
        self.last_refill_ms = now_ms;

        if self.tokens > 0.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// One named bucket per route. A route with no configured limiter is
/// unrestricted (§4.L: "missing limiter ⇒ allow").
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn configure(&self, name: impl Into<String>, max_tokens: u32, tokens_per_second: u32, now_ms: u64) {
        self.buckets
            .lock()
            .insert(name.into(), Bucket::new(max_tokens, tokens_per_second, now_ms));
    }

    pub fn remove(&self, name: &str) {
        self.buckets.lock().remove(name);
    }

    pub fn check(&self, name: &str, now_ms: u64) -> bool {
        let mut buckets = self.buckets.lock();
        match buckets.get_mut(name) {
            Some(bucket) => bucket.check(now_ms),
            None => true,
        }
    }
}
