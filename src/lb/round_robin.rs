use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::{Backend, BackendId};

use super::{Select, SelectionContext};

/// Atomic fetch-add cursor modulo the healthy count. Ties and collisions
/// with an unhealthy slot aren't possible here since `healthy` is already
/// filtered — the sweep-on-unhealthy behavior in the spec is handled by
/// the caller re-filtering the registry before calling `select`, so this
/// implementation is a single modulo step, bounded by construction to one
/// full sweep of `healthy`.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Select for RoundRobin {
    fn select(&self, healthy: &[Arc<Backend>], _ctx: &SelectionContext<'_>) -> Option<BackendId> {
        if healthy.is_empty() {
            return None;
        }
        let pos = self.cursor.fetch_add(1, Ordering::Relaxed) % healthy.len();
        Some(healthy[pos].id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Protocol, Role};

    fn backends(n: usize) -> Vec<Arc<Backend>> {
        (0..n)
            .map(|i| {
                Arc::new(Backend::new(
                    BackendId(i as u32),
                    "127.0.0.1",
                    9000 + i as u16,
                    1,
                    Role::Generic,
                    Protocol::Tcp,
                ))
            })
            .collect()
    }

    #[test]
    fn no_healthy_backends_returns_none() {
        let rr = RoundRobin::new();
        assert!(rr.select(&[], &SelectionContext::default()).is_none());
    }

    #[test]
    fn distributes_evenly_across_n_backends() {
        let rr = RoundRobin::new();
        let backends = backends(3);
        let mut counts = [0u32; 3];
        for _ in 0..9 {
            let id = rr.select(&backends, &SelectionContext::default()).unwrap();
            counts[id.0 as usize] += 1;
        }
        assert_eq!(counts, [3, 3, 3]);
    }

    #[test]
    fn k_times_n_dispatches_distribute_within_one() {
        let rr = RoundRobin::new();
        let backends = backends(4);
        let mut counts = [0u32; 4];
        for _ in 0..(4 * 7 + 2) {
            let id = rr.select(&backends, &SelectionContext::default()).unwrap();
            counts[id.0 as usize] += 1;
        }
        let min = *counts.iter().min().unwrap();
        let max = *counts.iter().max().unwrap();
        assert!(max - min <= 1);
    }
}
