use std::sync::Arc;

use rand::Rng;

use crate::backend::{Backend, BackendId};

use super::{Select, SelectionContext};

/// Draws uniform in `[1, sum(weight_healthy)]` and walks the cumulative
/// sum, so `selection_count[i] / N -> weight[i] / sum(weight)` in the
/// limit (invariant 5).
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl Select for WeightedRandom {
    fn select(&self, healthy: &[Arc<Backend>], _ctx: &SelectionContext<'_>) -> Option<BackendId> {
        if healthy.is_empty() {
            return None;
        }
        let total: u64 = healthy.iter().map(|b| b.weight() as u64).sum();
        if total == 0 {
            return None;
        }
        let mut draw = rand::thread_rng().gen_range(1..=total);
        for b in healthy {
            let w = b.weight() as u64;
            if draw <= w {
                return Some(b.id());
            }
            draw -= w;
        }
        healthy.last().map(|b| b.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Protocol, Role};

    fn backend(id: u32, weight: u32) -> Arc<Backend> {
        Arc::new(Backend::new(BackendId(id), "127.0.0.1", 9000 + id as u16, weight, Role::Generic, Protocol::Tcp))
    }

    #[test]
    fn empty_returns_none() {
        let wr = WeightedRandom;
        assert!(wr.select(&[], &SelectionContext::default()).is_none());
    }

    #[test]
    fn converges_to_weight_ratio() {
        let backends = vec![backend(0, 1), backend(1, 3)];
        let wr = WeightedRandom;
        let mut counts = [0u32; 2];
        for _ in 0..20_000 {
            let id = wr.select(&backends, &SelectionContext::default()).unwrap();
            counts[id.0 as usize] += 1;
        }
        let ratio = counts[1] as f64 / counts[0] as f64;
        assert!((ratio - 3.0).abs() < 0.3, "ratio was {ratio}");
    }

    #[test]
    fn single_backend_always_selected() {
        let backends = vec![backend(0, 5)];
        let wr = WeightedRandom;
        for _ in 0..50 {
            assert_eq!(wr.select(&backends, &SelectionContext::default()), Some(BackendId(0)));
        }
    }
}
