use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{Backend, BackendId, Registry};
use crate::primitives::Clock;

use super::config::ProbeKind;
use super::probes;
use super::HealthCheckConfig;

/// Drives scheduled probes for every registered backend. States per §4.G:
/// Init -> Configured -> Enabled -> Running (while not paused/stopped).
/// There is no distinct `Paused`/`Terminal` type here — the checker simply
/// stops spawning new probe cycles once `shutdown` is called, which is the
/// tokio-task equivalent of the spec's thread-per-backend model reaching
/// its terminal state.
pub struct Checker {
    registry: Arc<Registry>,
    clock: Clock,
    running: Arc<AtomicBool>,
}

impl Checker {
    pub fn new(registry: Arc<Registry>, clock: Clock) -> Self {
        Self {
            registry,
            clock,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Spawns one cooperative probe-loop task per (backend, config) pair.
    /// Returns immediately; probing happens in the background for the
    /// lifetime of the `Checker` (until `shutdown`).
    pub fn spawn_all(&self, configs: HashMap<BackendId, HealthCheckConfig>) {
        for (id, config) in configs {
            let Some(backend) = self.registry.find(id) else {
                continue;
            };
            let clock = self.clock;
            let running = self.running.clone();
            tokio::spawn(async move {
                run_probe_loop(backend, config, clock, running).await;
            });
        }
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

async fn run_probe_loop(
    backend: Arc<Backend>,
    config: HealthCheckConfig,
    clock: Clock,
    running: Arc<AtomicBool>,
) {
    let Some(addr) = resolve(&backend) else {
        return;
    };

    let mut just_transitioned = false;
    while running.load(Ordering::SeqCst) {
        let success = run_one_probe(addr, &config).await;
        let now_ms = clock.now_ms();
        let transitioned = backend.record_probe(success, config.rise, config.fall, now_ms);
        if transitioned {
            info!(
                backend = %backend.addr_key(),
                healthy = backend.is_healthy(),
                "backend health transition"
            );
        } else {
            debug!(backend = %backend.addr_key(), success, "health probe result");
        }
        just_transitioned = transitioned;

        let sleep_for = if just_transitioned {
            config.fast_interval
        } else if backend.is_healthy() {
            config.interval
        } else {
            config.down_interval
        };
        tokio::time::sleep(sleep_for).await;
    }
}

fn resolve(backend: &Backend) -> Option<SocketAddr> {
    let ip = backend.ip()?;
    Some(SocketAddr::new(ip, backend.port()))
}

async fn run_one_probe(addr: SocketAddr, config: &HealthCheckConfig) -> bool {
    match &config.kind {
        ProbeKind::Tcp => probes::tcp_probe(addr, config.timeout).await,
        ProbeKind::Http { uri, host, http_version_minor, expected } => {
            probes::http_probe(
                addr,
                uri,
                host,
                *http_version_minor,
                expected.as_deref(),
                config.timeout,
            )
            .await
        }
        ProbeKind::MySql => probes::mysql_probe(addr, config.timeout).await,
        ProbeKind::Postgres { query_lag } => {
            probes::postgres_probe(addr, *query_lag, config.timeout).await
        }
        ProbeKind::Redis => probes::redis_probe(addr, config.timeout).await,
    }
}
