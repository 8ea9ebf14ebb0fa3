use std::sync::Arc;

use crate::backend::{Backend, BackendId};

use super::{Select, SelectionContext};

/// Minimum of `response_time_ns * (active_conns + 1)` — penalizes a fast
/// but already-busy backend the same way a slow idle one would be.
#[derive(Debug, Default)]
pub struct LeastResponseTime;

fn score(b: &Backend) -> u128 {
    b.response_time_ns() as u128 * (b.active_conns() as u128 + 1)
}

impl Select for LeastResponseTime {
    fn select(&self, healthy: &[Arc<Backend>], _ctx: &SelectionContext<'_>) -> Option<BackendId> {
        healthy.iter().min_by_key(|b| (score(b), b.id().0)).map(|b| b.id())
    }
}
