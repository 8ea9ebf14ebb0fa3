use std::sync::Arc;

use crate::backend::{Backend, BackendId};

use super::{Select, SelectionContext};

/// Linear scan for the minimum load. When weights differ, load is
/// normalized as `active_conns * 256 / effective_weight` so a
/// double-weight backend is treated as having half as many connections.
/// Ties are broken by lower backend id.
#[derive(Debug, Default)]
pub struct LeastConnections;

fn normalized_load(b: &Backend) -> u64 {
    (b.active_conns() as u64 * 256) / b.weight().max(1) as u64
}

impl Select for LeastConnections {
    fn select(&self, healthy: &[Arc<Backend>], _ctx: &SelectionContext<'_>) -> Option<BackendId> {
        healthy
            .iter()
            .min_by_key(|b| (normalized_load(b), b.id().0))
            .map(|b| b.id())
    }
}
