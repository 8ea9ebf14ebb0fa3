//! Crate-wide error taxonomy.
//!
//! Transient network conditions (`EAGAIN`, `EINPROGRESS`, peer-closed) are
//! *not* represented here — the forwarder treats those as normal control
//! flow (see `forwarder::connection`), not propagated failures. This enum
//! covers the fatal/config/protocol classes from the error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("no healthy backend available for this selection")]
    NoTarget,

    #[error("no pooled or free connection available")]
    NoConnection,

    #[error("session table full and all sessions are transactional")]
    SessionsExhausted,

    #[error("circuit open for route {0}")]
    CircuitOpen(String),

    #[error("unknown backend id {0}")]
    UnknownBackend(u32),

    #[error("protocol error: {0}")]
    Protocol(&'static str),

    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse classic config at line {line}: {message}")]
    Classic { line: usize, message: String },

    #[error("route '{route}' targets unknown backend '{backend}'")]
    UnknownTargetBackend { route: String, backend: String },

    #[error("invalid load balancing algorithm '{0}'")]
    InvalidAlgorithm(String),

    #[error("listener '{0}' has no bind address")]
    MissingBindAddress(String),
}

pub type Result<T> = std::result::Result<T, Error>;
