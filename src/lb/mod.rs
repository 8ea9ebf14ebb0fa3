//! Selection engine — component D, plus the consistent-hash ring (E).
//!
//! Each algorithm is a small struct implementing [`Select`]; all are pure
//! with respect to the healthy-backend snapshot they're given, as the spec
//! requires. `Algorithm` is the tagged-variant dispatcher from the
//! "dynamic dispatch via function pointers" redesign note — no function
//! pointer table, just an enum match.

mod least_conn;
mod least_response_time;
mod ring;
mod round_robin;
mod source_hash;
mod uri_hash;
mod weighted_random;

pub use least_conn::LeastConnections;
pub use least_response_time::LeastResponseTime;
pub use ring::ConsistentHashRing;
pub use round_robin::RoundRobin;
pub use source_hash::SourceHash;
pub use uri_hash::UriHash;
pub use weighted_random::WeightedRandom;

use std::net::IpAddr;
use std::sync::Arc;

use crate::backend::{Backend, BackendId};

/// Context a selection call may consult, beyond the healthy-backend list
/// itself. Not every algorithm uses every field.
#[derive(Debug, Clone, Default)]
pub struct SelectionContext<'a> {
    pub client_ip: Option<IpAddr>,
    pub uri: Option<&'a [u8]>,
    /// Explicit key for the consistent-hash ring, when the caller has one
    /// more specific than `uri`/`client_ip` (e.g. a DB session id). Falls
    /// back to `uri` then `client_ip` when absent.
    pub hash_key: Option<&'a [u8]>,
}

/// Common interface implemented by every selection algorithm.
pub trait Select: Send + Sync {
    /// Picks one backend out of `healthy`. Returns `None` ("no-target")
    /// when `healthy` is empty.
    fn select(&self, healthy: &[Arc<Backend>], ctx: &SelectionContext<'_>) -> Option<BackendId>;
}

/// Which policy a frontend/route uses. Config-facing name; `AlgorithmKind`
/// values map 1:1 onto a concrete `Select` implementation constructed by
/// `build`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    RoundRobin,
    LeastConnections,
    SourceHash,
    UriHash,
    WeightedRandom,
    LeastResponseTime,
    ConsistentHash,
}

impl AlgorithmKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "round-robin" | "roundrobin" => Some(Self::RoundRobin),
            "least-conn" | "least-connections" => Some(Self::LeastConnections),
            "ip-hash" | "source-hash" => Some(Self::SourceHash),
            "uri-hash" => Some(Self::UriHash),
            "weighted" | "weighted-random" => Some(Self::WeightedRandom),
            "response-time" | "least-response-time" => Some(Self::LeastResponseTime),
            "consistent-hash" | "chash" => Some(Self::ConsistentHash),
            _ => None,
        }
    }
}

/// Owns the stateful selector for one route/frontend. Cheap to construct;
/// the consistent-hash variant is the only one that owns non-trivial state
/// (the ring), rebuilt whenever the backend topology changes.
pub enum Algorithm {
    RoundRobin(RoundRobin),
    LeastConnections(LeastConnections),
    SourceHash(SourceHash),
    UriHash(UriHash),
    WeightedRandom(WeightedRandom),
    LeastResponseTime(LeastResponseTime),
    ConsistentHash(ConsistentHashRing),
}

impl Algorithm {
    pub fn new(kind: AlgorithmKind) -> Self {
        match kind {
            AlgorithmKind::RoundRobin => Algorithm::RoundRobin(RoundRobin::new()),
            AlgorithmKind::LeastConnections => Algorithm::LeastConnections(LeastConnections),
            AlgorithmKind::SourceHash => Algorithm::SourceHash(SourceHash),
            AlgorithmKind::UriHash => Algorithm::UriHash(UriHash),
            AlgorithmKind::WeightedRandom => Algorithm::WeightedRandom(WeightedRandom),
            AlgorithmKind::LeastResponseTime => Algorithm::LeastResponseTime(LeastResponseTime),
            AlgorithmKind::ConsistentHash => {
                Algorithm::ConsistentHash(ConsistentHashRing::new(150))
            }
        }
    }

    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Algorithm::RoundRobin(_) => AlgorithmKind::RoundRobin,
            Algorithm::LeastConnections(_) => AlgorithmKind::LeastConnections,
            Algorithm::SourceHash(_) => AlgorithmKind::SourceHash,
            Algorithm::UriHash(_) => AlgorithmKind::UriHash,
            Algorithm::WeightedRandom(_) => AlgorithmKind::WeightedRandom,
            Algorithm::LeastResponseTime(_) => AlgorithmKind::LeastResponseTime,
            Algorithm::ConsistentHash(_) => AlgorithmKind::ConsistentHash,
        }
    }

    /// Rebuild any internal topology-dependent state (only the ring needs
    /// this) from the current backend snapshot. Call whenever backends are
    /// added/removed.
    pub fn rebuild_topology(&self, backends: &[Arc<Backend>]) {
        if let Algorithm::ConsistentHash(ring) = self {
            ring.rebuild(backends);
        }
    }

    pub fn select(&self, healthy: &[Arc<Backend>], ctx: &SelectionContext<'_>) -> Option<BackendId> {
        match self {
            Algorithm::RoundRobin(a) => a.select(healthy, ctx),
            Algorithm::LeastConnections(a) => a.select(healthy, ctx),
            Algorithm::SourceHash(a) => a.select(healthy, ctx),
            Algorithm::UriHash(a) => a.select(healthy, ctx),
            Algorithm::WeightedRandom(a) => a.select(healthy, ctx),
            Algorithm::LeastResponseTime(a) => a.select(healthy, ctx),
            Algorithm::ConsistentHash(a) => a.select(healthy, ctx),
        }
    }
}
