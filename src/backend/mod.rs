//! Backend registry — component C.
//!
//! Backends live in a fixed-capacity `Vec<Backend>` owned by the `Runtime`;
//! a `BackendId` (a plain index) is the stable handle in place of the
//! pointer the original design used, per the "global mutable state" /
//! "cyclic pointer graphs" redesign notes — the `Vec` never reallocates
//! out from under a live index because backends are only ever appended,
//! never removed (matching "never freed while referenced by a live
//! connection").

mod registry;

pub use registry::{BackendId, Registry};

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

/// The role a backend plays, used by the DB router and by role-filtered
/// registry iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Primary,
    Replica,
    Down,
    Backup,
    Generic,
}

/// Wire protocol a backend speaks, used by the DB classifier/pool to decide
/// which probe and pool to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Http,
    Postgres,
    MySql,
    Redis,
}

/// A single backend server: identity, policy attributes, liveness, and
/// load. Mutated concurrently by the forwarder (connection accounting),
/// the health checker (liveness), and the DB pool (replication lag) —
/// every field that can be written from more than one place is atomic.
#[derive(Debug)]
pub struct Backend {
    id: BackendId,
    host: String,
    port: u16,
    ip: Option<IpAddr>,
    weight: AtomicU32,
    role: RwLock<Role>,
    protocol: Protocol,

    healthy: AtomicBool,
    consecutive_successes: AtomicU32,
    consecutive_failures: AtomicU32,
    last_check_ms: AtomicU64,
    last_change_ms: AtomicU64,

    active_conns: AtomicU32,
    max_conns: AtomicU32,
    total_conns: AtomicU64,
    failed_conns: AtomicU64,
    response_time_ns: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,

    /// Replication lag for DB replicas, in milliseconds. `u32::MAX` means
    /// "unknown" (treated as infinite lag by the read-routing policy).
    replication_lag_ms: AtomicU32,
}

impl Backend {
    pub fn new(
        id: BackendId,
        host: impl Into<String>,
        port: u16,
        weight: u32,
        role: Role,
        protocol: Protocol,
    ) -> Self {
        let host = host.into();
        let ip = host.parse::<IpAddr>().ok();
        Self {
            id,
            host,
            port,
            ip,
            weight: AtomicU32::new(weight.max(1)),
            role: RwLock::new(role),
            protocol,
            healthy: AtomicBool::new(false),
            consecutive_successes: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
            last_check_ms: AtomicU64::new(0),
            last_change_ms: AtomicU64::new(0),
            active_conns: AtomicU32::new(0),
            max_conns: AtomicU32::new(10_000),
            total_conns: AtomicU64::new(0),
            failed_conns: AtomicU64::new(0),
            response_time_ns: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            replication_lag_ms: AtomicU32::new(u32::MAX),
        }
    }

    pub fn id(&self) -> BackendId {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn role(&self) -> Role {
        *self.role.read()
    }

    pub fn set_role(&self, role: Role) {
        *self.role.write() = role;
    }

    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed)
    }

    pub fn set_weight(&self, weight: u32) {
        self.weight.store(weight.max(1), Ordering::Relaxed);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Sets the healthy bit directly, bypassing rise/fall hysteresis.
    /// Used at startup when health checking is disabled — an unchecked
    /// backend is assumed UP (HAProxy's "uncheck'd server is UP"
    /// semantics), not left in the unhealthy state it's constructed with.
    pub fn set_healthy(&self, healthy: bool, now_ms: u64) {
        self.healthy.store(healthy, Ordering::Release);
        self.last_change_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn max_conns(&self) -> u32 {
        self.max_conns.load(Ordering::Relaxed)
    }

    pub fn set_max_conns(&self, n: u32) {
        self.max_conns.store(n, Ordering::Relaxed);
    }

    pub fn active_conns(&self) -> u32 {
        self.active_conns.load(Ordering::Relaxed)
    }

    pub fn total_conns(&self) -> u64 {
        self.total_conns.load(Ordering::Relaxed)
    }

    pub fn failed_conns(&self) -> u64 {
        self.failed_conns.load(Ordering::Relaxed)
    }

    pub fn response_time_ns(&self) -> u64 {
        self.response_time_ns.load(Ordering::Relaxed)
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    pub fn replication_lag_ms(&self) -> u32 {
        self.replication_lag_ms.load(Ordering::Relaxed)
    }

    pub fn set_replication_lag_ms(&self, lag: u32) {
        self.replication_lag_ms.store(lag, Ordering::Relaxed);
    }

    pub fn last_check_ms(&self) -> u64 {
        self.last_check_ms.load(Ordering::Relaxed)
    }

    pub fn last_change_ms(&self) -> u64 {
        self.last_change_ms.load(Ordering::Relaxed)
    }

    /// Invariant: `active_conns <= max_conns`. Returns `false` (and leaves
    /// the counter untouched) when the backend is already at capacity.
    pub fn try_acquire_connection(&self) -> bool {
        loop {
            let current = self.active_conns.load(Ordering::Relaxed);
            if current >= self.max_conns.load(Ordering::Relaxed) {
                return false;
            }
            if self
                .active_conns
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.total_conns.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }
    }

    /// Decrements `active_conns` exactly once; called from the forwarder's
    /// close path. Records the final response time for the connection.
    pub fn release_connection(&self, response_time_ns: u64) {
        self.active_conns.fetch_sub(1, Ordering::AcqRel);
        self.response_time_ns.store(response_time_ns, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_conns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, in_bytes: u64, out_bytes: u64) {
        self.bytes_in.fetch_add(in_bytes, Ordering::Relaxed);
        self.bytes_out.fetch_add(out_bytes, Ordering::Relaxed);
    }

    /// Applies the result of one health probe, implementing the rise/fall
    /// hysteresis from §4.G: `rise` consecutive successes are required to
    /// flip a DOWN backend UP, `fall` consecutive failures to flip an UP
    /// backend DOWN. Returns `true` if this probe caused a state
    /// transition.
    pub fn record_probe(&self, success: bool, rise: u32, fall: u32, now_ms: u64) -> bool {
        self.last_check_ms.store(now_ms, Ordering::Relaxed);
        let was_healthy = self.is_healthy();

        if success {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
            if !was_healthy && successes >= rise {
                self.healthy.store(true, Ordering::Release);
                self.last_change_ms.store(now_ms, Ordering::Relaxed);
                return true;
            }
        } else {
            self.consecutive_successes.store(0, Ordering::Relaxed);
            let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if was_healthy && failures >= fall {
                self.healthy.store(false, Ordering::Release);
                self.last_change_ms.store(now_ms, Ordering::Relaxed);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> Backend {
        Backend::new(BackendId(0), "127.0.0.1", 9001, 1, Role::Generic, Protocol::Tcp)
    }

    #[test]
    fn starts_unhealthy_until_probed() {
        let b = backend();
        assert!(!b.is_healthy());
    }

    #[test]
    fn set_healthy_bypasses_hysteresis() {
        let b = backend();
        b.set_healthy(true, 1);
        assert!(b.is_healthy());
        assert_eq!(b.last_change_ms(), 1);
    }

    #[test]
    fn rise_requires_consecutive_successes() {
        let b = backend();
        assert!(!b.record_probe(true, 3, 2, 1));
        assert!(!b.is_healthy());
        assert!(!b.record_probe(true, 3, 2, 2));
        assert!(!b.is_healthy());
        assert!(b.record_probe(true, 3, 2, 3));
        assert!(b.is_healthy());
    }

    #[test]
    fn fall_requires_consecutive_failures() {
        let b = backend();
        b.record_probe(true, 1, 2, 1);
        assert!(b.is_healthy());
        assert!(!b.record_probe(false, 1, 2, 2));
        assert!(b.is_healthy());
        assert!(b.record_probe(false, 1, 2, 3));
        assert!(!b.is_healthy());
    }

    #[test]
    fn a_success_resets_failure_streak() {
        let b = backend();
        b.record_probe(true, 1, 2, 1);
        b.record_probe(false, 1, 2, 2);
        b.record_probe(true, 1, 2, 3);
        assert!(!b.record_probe(false, 1, 2, 4));
        assert!(b.is_healthy());
    }

    #[test]
    fn active_conns_never_exceeds_max() {
        let b = backend();
        b.set_max_conns(1);
        assert!(b.try_acquire_connection());
        assert!(!b.try_acquire_connection());
        b.release_connection(100);
        assert!(b.try_acquire_connection());
    }

    #[test]
    fn response_time_recorded_on_release() {
        let b = backend();
        b.try_acquire_connection();
        b.release_connection(4_200);
        assert_eq!(b.response_time_ns(), 4_200);
    }
}
