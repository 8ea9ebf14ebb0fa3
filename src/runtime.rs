//! `[ADD 4.O]` Runtime — the single owner of process-wide state.
//!
//! Replaces the global mutable statics the spec's source uses with one
//! explicit value, constructed once in `main` and shared as `Arc<Runtime>`
//! with the forwarder, health checker, and CLI admin surface.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{BackendId, Registry};
use crate::db::pool::{Pool, PoolConfig};
use crate::primitives::Clock;
use crate::ratelimit::RateLimiter;
use crate::route::Table as RouteTable;
use crate::sticky;
use crate::stats::Counters;

pub struct Runtime {
    pub registry: Arc<Registry>,
    pub routes: Arc<RouteTable>,
    pub rate_limiter: Arc<RateLimiter>,
    pub clock: Clock,
    pub counters: Arc<Counters>,
    sticky_tables: RwLock<HashMap<String, Arc<sticky::Table>>>,
    db_pools: RwLock<HashMap<String, Arc<Pool>>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            routes: Arc::new(RouteTable::new()),
            rate_limiter: Arc::new(RateLimiter::new()),
            clock: Clock::new(),
            counters: Arc::new(Counters::new()),
            sticky_tables: RwLock::new(HashMap::new()),
            db_pools: RwLock::new(HashMap::new()),
        }
    }

    pub fn sticky_table(&self, id: &str, size: usize, default_expire_ms: u64) -> Arc<sticky::Table> {
        if let Some(t) = self.sticky_tables.read().get(id) {
            return t.clone();
        }
        let mut tables = self.sticky_tables.write();
        tables
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(sticky::Table::new(id, size, default_expire_ms)))
            .clone()
    }

    /// Db pools are keyed by backend role group (e.g. "primary-replica
    /// pair" name from config) so read/write splitting within one logical
    /// database shares a pool.
    pub fn db_pool(&self, group: &str, config: PoolConfig) -> Arc<Pool> {
        if let Some(p) = self.db_pools.read().get(group) {
            return p.clone();
        }
        let mut pools = self.db_pools.write();
        pools
            .entry(group.to_string())
            .or_insert_with(|| Arc::new(Pool::new(self.registry.clone(), config)))
            .clone()
    }

    pub fn add_backend(
        &self,
        host: impl Into<String>,
        port: u16,
        weight: u32,
        role: crate::backend::Role,
        protocol: crate::backend::Protocol,
    ) -> BackendId {
        self.registry.add(host, port, weight, role, protocol)
    }
}
