//! `ultrabalancer` — an L4/L7 reverse proxy and load balancer core.
//!
//! `tokio`'s multi-threaded, per-worker epoll-backed scheduler stands in
//! for a hand-rolled reactor: each accepted connection is a `tokio::spawn`
//! task pinned (by work-stealing) to a worker for its lifetime, the same
//! "owned by exactly one reactor" model a bespoke epoll loop would give,
//! with `SO_REUSEPORT` on every listener distributing accepts across
//! workers exactly as a multi-reactor design would.

pub mod backend;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod forwarder;
pub mod hash;
pub mod health;
pub mod lb;
pub mod primitives;
pub mod ratelimit;
pub mod route;
pub mod runtime;
pub mod stats;
pub mod sticky;

pub use error::{ConfigError, Error, Result};
pub use runtime::Runtime;
