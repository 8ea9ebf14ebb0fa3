//! `[ADD 4.P]` Configuration — classic `.cfg` dialect and YAml, both
//! deserializing into the same `Config` shape.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    pub bind: String,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub proxy_protocol: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub protocol: String,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteTargetConfig {
    pub backend: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub path_exact: Option<String>,
    #[serde(default)]
    pub path_regex: Option<String>,
    pub targets: Vec<RouteTargetConfig>,
    #[serde(default = "default_cb_threshold")]
    pub circuit_threshold: u32,
    #[serde(default = "default_cb_reset_ms")]
    pub circuit_reset_ms: u64,
}

fn default_cb_threshold() -> u32 {
    5
}

fn default_cb_reset_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub route: String,
    pub max_tokens: u32,
    pub tokens_per_second: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_fails")]
    pub fails: u32,
    #[serde(default)]
    pub disabled: bool,
}

fn default_interval_ms() -> u64 {
    2_000
}

fn default_fails() -> u32 {
    3
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self { interval_ms: default_interval_ms(), fails: default_fails(), disabled: false }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_timeout_ms")]
    pub client_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub server_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub connect_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub check_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub queue_ms: u64,
    #[serde(default)]
    pub tarpit_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub http_request_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub http_keepalive_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            client_ms: default_timeout_ms(),
            server_ms: default_timeout_ms(),
            connect_ms: default_timeout_ms(),
            check_ms: default_timeout_ms(),
            queue_ms: default_timeout_ms(),
            tarpit_ms: 0,
            http_request_ms: default_timeout_ms(),
            http_keepalive_ms: default_timeout_ms(),
        }
    }
}

impl TimeoutsConfig {
    pub fn client(&self) -> Duration {
        Duration::from_millis(self.client_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default)]
    pub health_check: HealthCheckSettings,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub rate_limits: Vec<RateLimitConfig>,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

fn default_algorithm() -> String {
    "round-robin".to_string()
}

impl Config {
    pub fn from_yaml_str(text: &str) -> Result<Config> {
        let config: Config = serde_yaml::from_str(text).map_err(ConfigError::Yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parses the classic line-oriented dialect (haproxy-flavoured):
    /// `listen <addr>`, `backend <name> <host>:<port> [weight=N] [role=R]
    /// [protocol=P]`, `algorithm <name>`, `route <name> priority=N
    /// prefix=/p target=backend1@weight,backend2@weight`, `ratelimit
    /// <route> max=N rate=N`, `timeout <field>=<ms>`. Blank lines and lines
    /// starting with `#` are ignored.
    pub fn from_classic_str(text: &str) -> Result<Config> {
        let mut config = Config {
            listeners: Vec::new(),
            backends: Vec::new(),
            algorithm: default_algorithm(),
            health_check: HealthCheckSettings::default(),
            routes: Vec::new(),
            rate_limits: Vec::new(),
            timeouts: TimeoutsConfig::default(),
        };

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let directive = tokens.next().unwrap_or("");
            let rest: Vec<&str> = tokens.collect();
            parse_classic_directive(&mut config, directive, &rest, line_no)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let known: std::collections::HashSet<&str> = self.backends.iter().map(|b| b.name.as_str()).collect();
        for route in &self.routes {
            for target in &route.targets {
                if !known.contains(target.backend.as_str()) {
                    return Err(ConfigError::UnknownTargetBackend {
                        route: route.name.clone(),
                        backend: target.backend.clone(),
                    }
                    .into());
                }
            }
        }
        if crate::lb::AlgorithmKind::parse(&self.algorithm).is_none() {
            return Err(ConfigError::InvalidAlgorithm(self.algorithm.clone()).into());
        }
        for listener in &self.listeners {
            if listener.bind.is_empty() {
                return Err(ConfigError::MissingBindAddress(listener.bind.clone()).into());
            }
        }
        Ok(())
    }
}

fn parse_classic_directive(config: &mut Config, directive: &str, rest: &[&str], line_no: usize) -> Result<()> {
    match directive {
        "listen" => {
            let bind = rest.first().ok_or_else(|| classic_err(line_no, "listen requires a bind address"))?;
            config.listeners.push(ListenerConfig { bind: bind.to_string(), tls: false, proxy_protocol: false });
        }
        "backend" => {
            let name = rest.first().ok_or_else(|| classic_err(line_no, "backend requires a name"))?;
            let addr = rest.get(1).ok_or_else(|| classic_err(line_no, "backend requires host:port"))?;
            let (host, port) = split_host_port(addr).ok_or_else(|| classic_err(line_no, "invalid host:port"))?;
            let kv = parse_kv(&rest[2..]);
            config.backends.push(BackendConfig {
                name: name.to_string(),
                host,
                port,
                weight: kv.get("weight").and_then(|v| v.parse().ok()).unwrap_or(1),
                role: kv.get("role").cloned().unwrap_or_default(),
                protocol: kv.get("protocol").cloned().unwrap_or_default(),
            });
        }
        "algorithm" => {
            config.algorithm = rest.first().ok_or_else(|| classic_err(line_no, "algorithm requires a value"))?.to_string();
        }
        "route" => {
            let name = rest.first().ok_or_else(|| classic_err(line_no, "route requires a name"))?;
            let kv = parse_kv(&rest[1..]);
            let targets = kv
                .get("target")
                .ok_or_else(|| classic_err(line_no, "route requires target=..."))?
                .split(',')
                .map(|t| {
                    let (backend, weight) = match t.split_once('@') {
                        Some((b, w)) => (b.to_string(), w.parse().unwrap_or(1)),
                        None => (t.to_string(), 1),
                    };
                    RouteTargetConfig { backend, weight }
                })
                .collect();
            config.routes.push(RouteConfig {
                name: name.to_string(),
                priority: kv.get("priority").and_then(|v| v.parse().ok()).unwrap_or(0),
                path_prefix: kv.get("prefix").cloned(),
                path_exact: kv.get("exact").cloned(),
                path_regex: kv.get("regex").cloned(),
                targets,
                circuit_threshold: kv.get("cb_threshold").and_then(|v| v.parse().ok()).unwrap_or(5),
                circuit_reset_ms: kv.get("cb_reset_ms").and_then(|v| v.parse().ok()).unwrap_or(2_000),
            });
        }
        "ratelimit" => {
            let route = rest.first().ok_or_else(|| classic_err(line_no, "ratelimit requires a route name"))?;
            let kv = parse_kv(&rest[1..]);
            config.rate_limits.push(RateLimitConfig {
                route: route.to_string(),
                max_tokens: kv.get("max").and_then(|v| v.parse().ok()).unwrap_or(100),
                tokens_per_second: kv.get("rate").and_then(|v| v.parse().ok()).unwrap_or(10),
            });
        }
        "timeout" => {
            let kv = parse_kv(rest);
            if let Some(v) = kv.get("client").and_then(|v| v.parse().ok()) {
                config.timeouts.client_ms = v;
            }
            if let Some(v) = kv.get("server").and_then(|v| v.parse().ok()) {
                config.timeouts.server_ms = v;
            }
            if let Some(v) = kv.get("connect").and_then(|v| v.parse().ok()) {
                config.timeouts.connect_ms = v;
            }
        }
        other => {
            return Err(classic_err(line_no, &format!("unknown directive '{other}'")));
        }
    }
    Ok(())
}

fn parse_kv<'a>(tokens: &[&'a str]) -> HashMap<&'a str, String> {
    tokens
        .iter()
        .filter_map(|t| t.split_once('=').map(|(k, v)| (k, v.to_string())))
        .collect()
}

fn split_host_port(s: &str) -> Option<(String, u16)> {
    let (host, port) = s.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

fn classic_err(line: usize, message: &str) -> crate::error::Error {
    ConfigError::Classic { line, message: message.to_string() }.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_classic_dialect() {
        let text = r#"
            listen 0.0.0.0:8080
            backend web1 127.0.0.1:9001 weight=2 role=primary
            algorithm least-conn
            route api priority=10 prefix=/api target=web1@2
            ratelimit api max=50 rate=5
            timeout client=3000
        "#;
        let config = Config::from_classic_str(text).unwrap();
        assert_eq!(config.listeners.len(), 1);
        assert_eq!(config.backends[0].weight, 2);
        assert_eq!(config.algorithm, "least-conn");
        assert_eq!(config.routes[0].targets[0].backend, "web1");
        assert_eq!(config.timeouts.client_ms, 3000);
    }

    #[test]
    fn rejects_unknown_target_backend() {
        let text = r#"
            backend web1 127.0.0.1:9001
            route api target=ghost
        "#;
        let err = Config::from_classic_str(text);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_invalid_algorithm() {
        let text = "algorithm not-a-real-one\n";
        assert!(Config::from_classic_str(text).is_err());
    }

    #[test]
    fn parses_yaml_dialect_into_same_shape() {
        let text = r#"
backends:
  - name: web1
    host: 127.0.0.1
    port: 9001
    weight: 3
algorithm: round-robin
routes:
  - name: api
    priority: 5
    path_prefix: /api
    targets:
      - backend: web1
        weight: 1
"#;
        let config = Config::from_yaml_str(text).unwrap();
        assert_eq!(config.backends[0].weight, 3);
        assert_eq!(config.routes[0].path_prefix.as_deref(), Some("/api"));
    }
}
