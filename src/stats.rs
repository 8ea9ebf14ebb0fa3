//! Statistics export shape — `[ADD]` per §6.
//!
//! This is the contract an external formatter (CSV/JSON/HTML/Prometheus
//! text) would consume; no renderer lives in this crate.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::Registry;
use crate::route::Table as RouteTable;

#[derive(Debug, Serialize)]
pub struct BackendSnapshot {
    pub id: u32,
    pub host: String,
    pub port: u16,
    pub healthy: bool,
    pub weight: u32,
    pub active_conns: u32,
    pub total_conns: u64,
    pub failed_conns: u64,
    pub response_time_ns: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

#[derive(Debug, Serialize)]
pub struct RouteSnapshot {
    pub name: String,
    pub requests: u64,
    pub failures: u64,
}

#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub total_requests: u64,
    pub backends: Vec<BackendSnapshot>,
    pub routes: Vec<RouteSnapshot>,
}

/// Process-wide counters that aren't naturally owned by any one component
/// (e.g. frontend-level accept/reject totals).
#[derive(Debug, Default)]
pub struct Counters {
    pub accepted: AtomicU64,
    pub rejected: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accept(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn snapshot(registry: &Registry, routes: &RouteTable) -> Snapshot {
    let backends = registry
        .iter_all()
        .iter()
        .map(|b| BackendSnapshot {
            id: b.id().0,
            host: b.host().to_string(),
            port: b.port(),
            healthy: b.is_healthy(),
            weight: b.weight(),
            active_conns: b.active_conns(),
            total_conns: b.total_conns(),
            failed_conns: b.failed_conns(),
            response_time_ns: b.response_time_ns(),
            bytes_in: b.bytes_in(),
            bytes_out: b.bytes_out(),
        })
        .collect();

    let routes_snapshot = routes
        .stats_snapshot()
        .into_iter()
        .map(|(name, requests, failures)| RouteSnapshot { name, requests, failures })
        .collect();

    Snapshot {
        total_requests: routes.total_requests(),
        backends,
        routes: routes_snapshot,
    }
}
