//! Route table — component K.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;
use rand::Rng;

use crate::backend::BackendId;
use crate::route::circuit::CircuitBreaker;
use crate::route::rule::{Rule, RequestMeta};

#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub backend_id: BackendId,
    pub weight: u32,
}

pub struct Route {
    pub name: String,
    pub priority: i32,
    rules: Vec<Rule>,
    targets: RwLock<Vec<Target>>,
    total_weight: AtomicU32,
    pub circuit: CircuitBreaker,
    requests: AtomicU64,
    failures: AtomicU64,
}

impl Route {
    pub fn new(name: impl Into<String>, priority: i32, rules: Vec<Rule>, targets: Vec<Target>, threshold: u32, reset_timeout_ms: u64) -> Self {
        let total_weight = targets.iter().map(|t| t.weight.max(1)).sum();
        Self {
            name: name.into(),
            priority,
            rules,
            targets: RwLock::new(targets),
            total_weight: AtomicU32::new(total_weight),
            circuit: CircuitBreaker::new(threshold, reset_timeout_ms),
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    fn matches(&self, req: &RequestMeta) -> bool {
        self.rules.iter().all(|r| r.matches(req))
    }

    pub fn set_targets(&self, targets: Vec<Target>) {
        let total = targets.iter().map(|t| t.weight.max(1)).sum();
        *self.targets.write() = targets;
        self.total_weight.store(total, Ordering::Relaxed);
    }

    /// Weighted-random pick over the cached target weights, or `None` if
    /// the circuit is open or there are no targets.
    pub fn select_target(&self, now_ms: u64) -> Option<BackendId> {
        if !self.circuit.allow(now_ms) {
            return None;
        }
        let targets = self.targets.read();
        if targets.is_empty() {
            return None;
        }
        let total = self.total_weight.load(Ordering::Relaxed).max(1);
        let mut pick = rand::thread_rng().gen_range(0..total);
        for t in targets.iter() {
            let w = t.weight.max(1);
            if pick < w {
                return Some(t.backend_id);
            }
            pick -= w;
        }
        targets.last().map(|t| t.backend_id)
    }

    pub fn record_result(&self, success: bool, now_ms: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.circuit.record_success();
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
            self.circuit.record_failure(now_ms);
        }
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Routes sorted by descending priority behind a reader-mostly lock —
/// additions and removals are rare compared to lookups.
pub struct Table {
    routes: RwLock<Vec<Route>>,
    total_requests: AtomicU64,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
            total_requests: AtomicU64::new(0),
        }
    }

    pub fn add(&self, route: Route) {
        let mut routes = self.routes.write();
        routes.push(route);
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Removes the route with the exact given name. Matches by name
    /// equality only; there is no prefix or wildcard removal.
    pub fn remove(&self, name: &str) -> bool {
        let mut routes = self.routes.write();
        let before = routes.len();
        routes.retain(|r| r.name != name);
        routes.len() != before
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Implements §4.K's `route_request`: increments the counter, then
    /// under a shared lock finds the first (highest-priority) matching
    /// route and asks it to pick a target. The lock is released before
    /// the caller records per-backend stats.
    pub fn route_request(&self, req: &RequestMeta, now_ms: u64) -> Option<(String, BackendId)> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let routes = self.routes.read();
        for route in routes.iter() {
            if route.matches(req) {
                if let Some(backend_id) = route.select_target(now_ms) {
                    return Some((route.name.clone(), backend_id));
                }
            }
        }
        None
    }

    /// Per-route (name, requests, failures) triples, for the statistics
    /// export shape.
    pub fn stats_snapshot(&self) -> Vec<(String, u64, u64)> {
        self.routes
            .read()
            .iter()
            .map(|r| (r.name.clone(), r.request_count(), r.failure_count()))
            .collect()
    }

    pub fn record_result(&self, name: &str, success: bool, now_ms: u64) {
        let routes = self.routes.read();
        if let Some(route) = routes.iter().find(|r| r.name == name) {
            route.record_result(success, now_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::rule::Method;
    use std::collections::HashMap;

    fn target(id: u32, weight: u32) -> Target {
        Target { backend_id: BackendId(id), weight }
    }

    #[test]
    fn higher_priority_routes_are_tried_first() {
        let table = Table::new();
        table.add(Route::new(
            "low",
            1,
            vec![Rule::PathPrefix("/".to_string())],
            vec![target(0, 1)],
            5,
            1_000,
        ));
        table.add(Route::new(
            "high",
            10,
            vec![Rule::PathPrefix("/api".to_string())],
            vec![target(1, 1)],
            5,
            1_000,
        ));

        let headers = HashMap::new();
        let req = RequestMeta::new(Method::Get, "/api/users", &headers);
        let (name, backend) = table.route_request(&req, 0).unwrap();
        assert_eq!(name, "high");
        assert_eq!(backend, BackendId(1));
    }

    #[test]
    fn no_match_returns_none() {
        let table = Table::new();
        table.add(Route::new(
            "only",
            1,
            vec![Rule::PathExact("/health".to_string())],
            vec![target(0, 1)],
            5,
            1_000,
        ));
        let headers = HashMap::new();
        let req = RequestMeta::new(Method::Get, "/other", &headers);
        assert!(table.route_request(&req, 0).is_none());
    }

    #[test]
    fn open_circuit_makes_route_return_no_target() {
        let route = Route::new(
            "flaky",
            1,
            vec![Rule::PathPrefix("/".to_string())],
            vec![target(0, 1)],
            1,
            1_000,
        );
        route.record_result(false, 0);
        assert!(route.select_target(0).is_none());
    }

    #[test]
    fn remove_matches_exact_name_only() {
        let table = Table::new();
        table.add(Route::new("api", 1, vec![Rule::PathPrefix("/".to_string())], vec![target(0, 1)], 5, 1_000));
        table.add(Route::new("api-v2", 1, vec![Rule::PathPrefix("/".to_string())], vec![target(1, 1)], 5, 1_000));
        assert!(table.remove("api"));
        assert_eq!(table.len(), 1);
        assert!(!table.remove("api"));
    }

    #[test]
    fn single_target_always_selected() {
        let route = Route::new(
            "solo",
            1,
            vec![Rule::PathPrefix("/".to_string())],
            vec![target(7, 3)],
            5,
            1_000,
        );
        for _ in 0..20 {
            assert_eq!(route.select_target(0), Some(BackendId(7)));
        }
    }
}
