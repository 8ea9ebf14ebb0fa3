use std::sync::Arc;

use crate::backend::{Backend, BackendId};
use crate::hash::murmur3_64;

use super::{Select, SelectionContext};

/// Rolling hash over the request URI bytes, same sweep behavior as
/// `SourceHash`.
#[derive(Debug, Default)]
pub struct UriHash;

impl Select for UriHash {
    fn select(&self, healthy: &[Arc<Backend>], ctx: &SelectionContext<'_>) -> Option<BackendId> {
        if healthy.is_empty() {
            return None;
        }
        let uri = ctx.uri?;
        let h = murmur3_64(uri, 0);
        let idx = (h as usize) % healthy.len();
        Some(healthy[idx].id())
    }
}
