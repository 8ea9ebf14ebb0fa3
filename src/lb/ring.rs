use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{Backend, BackendId};
use crate::hash::{hash_virtual_node, murmur3_64};

use super::{Select, SelectionContext};

/// Hash-space circle with `virtual_nodes` positions per backend. Insertion
/// is O(V) under the ring's lock; lookup finds the first node with
/// `hash >= request_hash`, wrapping to the start of the ring. Removal is
/// out of scope per §4.E — the ring is simply rebuilt whenever topology
/// changes (`rebuild`).
#[derive(Debug)]
pub struct ConsistentHashRing {
    virtual_nodes: u32,
    ring: RwLock<BTreeMap<u64, BackendId>>,
}

impl ConsistentHashRing {
    pub fn new(virtual_nodes: u32) -> Self {
        Self {
            virtual_nodes: virtual_nodes.max(1),
            ring: RwLock::new(BTreeMap::new()),
        }
    }

    /// Rebuilds the whole ring from the given backend set. Each backend
    /// contributes `virtual_nodes` positions keyed `"host:port#i"`.
    pub fn rebuild(&self, backends: &[Arc<Backend>]) {
        let mut ring = self.ring.write();
        ring.clear();
        for backend in backends {
            let key = backend.addr_key();
            for i in 0..self.virtual_nodes {
                let h = hash_virtual_node(&key, i);
                ring.insert(h, backend.id());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ring.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds the backend id owning `hash` on the ring, without filtering
    /// for health. Used by `select` and directly testable.
    fn lookup_raw(&self, hash: u64) -> Option<BackendId> {
        let ring = self.ring.read();
        if ring.is_empty() {
            return None;
        }
        ring.range(hash..)
            .next()
            .or_else(|| ring.iter().next())
            .map(|(_, id)| *id)
    }
}

fn request_key<'a>(ctx: &SelectionContext<'a>) -> Option<&'a [u8]> {
    ctx.hash_key.or(ctx.uri).or_else(|| None)
}

impl Select for ConsistentHashRing {
    fn select(&self, healthy: &[Arc<Backend>], ctx: &SelectionContext<'_>) -> Option<BackendId> {
        if healthy.is_empty() {
            return None;
        }
        let hash = if let Some(key) = request_key(ctx) {
            murmur3_64(key, 0)
        } else if let Some(ip) = ctx.client_ip {
            murmur3_64(ip.to_string().as_bytes(), 0)
        } else {
            return healthy.first().map(|b| b.id());
        };

        let ring = self.ring.read();
        if ring.is_empty() {
            return healthy.first().map(|b| b.id());
        }

        let healthy_ids: std::collections::HashSet<BackendId> =
            healthy.iter().map(|b| b.id()).collect();

        // Walk forward from `hash`, wrapping once, skipping unhealthy
        // owners; fall back to any healthy backend if the whole ring is
        // unhealthy owners.
        let forward = ring.range(hash..).chain(ring.iter());
        for (_, id) in forward.take(ring.len() + 1) {
            if healthy_ids.contains(id) {
                return Some(*id);
            }
        }
        healthy.first().map(|b| b.id())
    }
}
