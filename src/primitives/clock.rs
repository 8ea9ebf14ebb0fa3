//! Monotonic clock handle.
//!
//! The spec's source uses a global `now_ms`. Per the "global mutable state"
//! design note, that becomes an explicit handle threaded through the
//! `Runtime` instead of a process-wide static.

use std::time::Instant;

/// A cheap-to-clone handle over a fixed epoch `Instant`.
///
/// All "now" reads in the crate (rate decay, response-time measurement,
/// health-check scheduling) go through this type rather than calling
/// `Instant::now()` directly, so tests can reason about elapsed time from a
/// single reference point.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Nanoseconds elapsed since this clock was created.
    pub fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Milliseconds elapsed since this clock was created.
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
