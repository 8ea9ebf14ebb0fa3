use std::collections::HashMap;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use ultrabalancer::backend::{BackendId, Protocol, Role};
use ultrabalancer::cli::Cli;
use ultrabalancer::config::Config;
use ultrabalancer::forwarder::{self, Listener, ListenerOptions, ReactorMode};
use ultrabalancer::health::{Checker, HealthCheckConfig, ProbeKind};
use ultrabalancer::lb::{Algorithm, AlgorithmKind};
use ultrabalancer::route::{Method, Route, Rule, Target};
use ultrabalancer::Runtime;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.worker_count())
        .enable_all()
        .build()
        .expect("failed to start tokio runtime");

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => config_from_cli(&cli)?,
    };

    let rt = Arc::new(Runtime::new());
    let mut backend_ids: HashMap<String, BackendId> = HashMap::new();
    for b in &config.backends {
        let role = parse_role(&b.role);
        let protocol = parse_protocol(&b.protocol);
        let id = rt.add_backend(b.host.clone(), b.port, b.weight, role, protocol);
        backend_ids.insert(b.name.clone(), id);
    }

    for route_cfg in &config.routes {
        let mut rules = Vec::new();
        if let Some(p) = &route_cfg.path_exact {
            rules.push(Rule::PathExact(p.clone()));
        }
        if let Some(p) = &route_cfg.path_prefix {
            rules.push(Rule::PathPrefix(p.clone()));
        }
        if let Some(p) = &route_cfg.path_regex {
            rules.push(Rule::path_regex(p)?);
        }
        if rules.is_empty() {
            rules.push(Rule::Method(Method::Any));
        }
        let targets: Vec<Target> = route_cfg
            .targets
            .iter()
            .filter_map(|t| backend_ids.get(&t.backend).map(|id| Target { backend_id: *id, weight: t.weight }))
            .collect();
        rt.routes.add(Route::new(
            route_cfg.name.clone(),
            route_cfg.priority,
            rules,
            targets,
            route_cfg.circuit_threshold,
            route_cfg.circuit_reset_ms,
        ));
    }

    for rl in &config.rate_limits {
        rt.rate_limiter.configure(rl.route.clone(), rl.max_tokens, rl.tokens_per_second, rt.clock.now_ms());
    }

    if config.health_check.disabled {
        // An unchecked backend is assumed UP (HAProxy's "uncheck'd server is
        // UP" semantics) — otherwise every backend stays permanently
        // unhealthy and `--no-health-check` bricks the dataplane.
        let now_ms = rt.clock.now_ms();
        for id in backend_ids.values() {
            if let Some(backend) = rt.registry.find(*id) {
                backend.set_healthy(true, now_ms);
            }
        }
    } else {
        let checker = Checker::new(rt.registry.clone(), rt.clock);
        let mut probe_configs = HashMap::new();
        for (name, id) in &backend_ids {
            let backend_cfg = config.backends.iter().find(|b| &b.name == name);
            let host = backend_cfg.map(|b| b.host.clone()).unwrap_or_default();
            let kind = match backend_cfg.map(|b| parse_protocol(&b.protocol)).unwrap_or(Protocol::Tcp) {
                Protocol::Http => ProbeKind::http_default(host),
                Protocol::MySql => ProbeKind::MySql,
                Protocol::Postgres => ProbeKind::Postgres { query_lag: false },
                Protocol::Redis => ProbeKind::Redis,
                Protocol::Tcp => ProbeKind::Tcp,
            };
            let mut hc = HealthCheckConfig::default();
            hc.interval = std::time::Duration::from_millis(config.health_check.interval_ms);
            hc.fall = config.health_check.fails;
            hc.kind = kind;
            probe_configs.insert(*id, hc);
        }
        checker.spawn_all(probe_configs);
    }

    let algorithm = Arc::new(Algorithm::new(
        AlgorithmKind::parse(&config.algorithm).ok_or(format!("invalid algorithm '{}'", config.algorithm))?,
    ));
    algorithm.rebuild_topology(&rt.registry.snapshot());

    let listeners = if config.listeners.is_empty() {
        vec![format!("0.0.0.0:{}", cli.port)]
    } else {
        config.listeners.iter().map(|l| l.bind.clone()).collect()
    };

    let is_db_deployment = config
        .backends
        .iter()
        .any(|b| matches!(parse_protocol(&b.protocol), Protocol::Postgres | Protocol::MySql | Protocol::Redis));

    let mode = if is_db_deployment {
        let pool = rt.db_pool("default", ultrabalancer::db::PoolConfig::default());
        ultrabalancer::db::pool::spawn_cleanup(pool.clone(), rt.clock, std::time::Duration::from_secs(30));
        ReactorMode::Db { pool }
    } else if rt.routes.is_empty() {
        ReactorMode::L4 { registry: rt.registry.clone(), algorithm: algorithm.clone() }
    } else {
        ReactorMode::Http { registry: rt.registry.clone(), routes: rt.routes.clone(), rate_limiter: rt.rate_limiter.clone() }
    };

    let mut handles = Vec::new();
    for bind in listeners {
        let addr: SocketAddr = bind.parse().map_err(|e| format!("invalid listen address '{bind}': {e}"))?;
        let mut listener = Listener::new(addr, ListenerOptions::defaults());
        listener.bind()?;
        info!(%addr, "listening");
        let listener = Arc::new(listener);
        let mode = clone_mode(&mode);
        let clock = rt.clock;
        let counters = rt.counters.clone();
        handles.push(tokio::spawn(forwarder::run_reactor(listener, mode, clock, counters)));
    }

    for handle in handles {
        handle.await.ok();
    }
    Ok(())
}

fn clone_mode(mode: &ReactorMode) -> ReactorMode {
    match mode {
        ReactorMode::L4 { registry, algorithm } => ReactorMode::L4 { registry: registry.clone(), algorithm: algorithm.clone() },
        ReactorMode::Http { registry, routes, rate_limiter } => {
            ReactorMode::Http { registry: registry.clone(), routes: routes.clone(), rate_limiter: rate_limiter.clone() }
        }
        ReactorMode::Db { pool } => ReactorMode::Db { pool: pool.clone() },
    }
}

fn load_config_file(path: &str) -> Result<Config, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    if path.ends_with(".yaml") || path.ends_with(".yml") {
        Ok(Config::from_yaml_str(&text)?)
    } else {
        Ok(Config::from_classic_str(&text)?)
    }
}

fn config_from_cli(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    use ultrabalancer::config::{BackendConfig, ListenerConfig, RouteConfig};

    let backends: Vec<BackendConfig> = cli
        .parsed_backends()
        .into_iter()
        .enumerate()
        .map(|(i, b)| BackendConfig {
            name: format!("backend{i}"),
            host: b.host,
            port: b.port,
            weight: b.weight,
            role: String::new(),
            protocol: String::new(),
        })
        .collect();

    let config = Config {
        listeners: vec![ListenerConfig { bind: format!("0.0.0.0:{}", cli.port), tls: false, proxy_protocol: false }],
        backends,
        algorithm: cli.algorithm.clone(),
        health_check: ultrabalancer::config::HealthCheckSettings {
            interval_ms: cli.health_check_interval_ms,
            fails: cli.health_check_fails,
            disabled: cli.no_health_check,
        },
        routes: Vec::<RouteConfig>::new(),
        rate_limits: Vec::new(),
        timeouts: Default::default(),
    };
    config.validate()?;
    Ok(config)
}

fn parse_role(s: &str) -> Role {
    match s {
        "primary" => Role::Primary,
        "replica" => Role::Replica,
        "backup" => Role::Backup,
        "down" => Role::Down,
        _ => Role::Generic,
    }
}

fn parse_protocol(s: &str) -> Protocol {
    match s {
        "http" => Protocol::Http,
        "postgres" => Protocol::Postgres,
        "mysql" => Protocol::MySql,
        "redis" => Protocol::Redis,
        _ => Protocol::Tcp,
    }
}
