//! Key primitives: atomics, spinlocks, and the monotonic clock.
//!
//! Per-metric counters elsewhere in the crate are lock-free `AtomicU64`s
//! with relaxed ordering for updates and acquire ordering for reads that
//! gate a decision (e.g. backend health). Spinlocks here are reserved for
//! the short critical sections called out in the spec: hash-bucket
//! fix-up and LRU pointer fix-up.

pub mod clock;
pub mod spinlock;

pub use clock::Clock;
pub use spinlock::Spinlock;
