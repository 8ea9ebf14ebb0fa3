//! `[ADD 4.Q]` CLI — flags from §6, byte-for-byte.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ultrabalancer", about = "L4/L7 reverse proxy and load balancer")]
pub struct Cli {
    #[arg(short = 'p', long = "port", default_value_t = 8080)]
    pub port: u16,

    #[arg(short = 'a', long = "algorithm", default_value = "round-robin")]
    pub algorithm: String,

    #[arg(short = 'b', long = "backend")]
    pub backends: Vec<String>,

    #[arg(short = 'w', long = "workers")]
    pub workers: Option<usize>,

    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    #[arg(long = "health-check-interval", default_value_t = 2_000)]
    pub health_check_interval_ms: u64,

    #[arg(long = "health-check-fails", default_value_t = 3)]
    pub health_check_fails: u32,

    #[arg(long = "no-health-check", default_value_t = false)]
    pub no_health_check: bool,
}

#[derive(Debug, Clone)]
pub struct CliBackend {
    pub host: String,
    pub port: u16,
    pub weight: u32,
}

/// Parses the repeatable `-b HOST:PORT[@WEIGHT]` flag.
pub fn parse_backend_flag(s: &str) -> Option<CliBackend> {
    let (addr, weight) = match s.split_once('@') {
        Some((addr, w)) => (addr, w.parse().ok()?),
        None => (s, 1),
    };
    let (host, port) = addr.rsplit_once(':')?;
    Some(CliBackend { host: host.to_string(), port: port.parse().ok()?, weight })
}

impl Cli {
    pub fn parsed_backends(&self) -> Vec<CliBackend> {
        self.backends.iter().filter_map(|s| parse_backend_flag(s)).collect()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| 2 * num_cpus())
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_flag_with_weight() {
        let b = parse_backend_flag("127.0.0.1:9001@3").unwrap();
        assert_eq!(b.host, "127.0.0.1");
        assert_eq!(b.port, 9001);
        assert_eq!(b.weight, 3);
    }

    #[test]
    fn parses_backend_flag_without_weight() {
        let b = parse_backend_flag("127.0.0.1:9001").unwrap();
        assert_eq!(b.weight, 1);
    }

    #[test]
    fn rejects_malformed_backend_flag() {
        assert!(parse_backend_flag("not-an-address").is_none());
    }

    #[test]
    fn cli_parses_expected_flags() {
        let cli = Cli::parse_from([
            "ultrabalancer",
            "-p", "9000",
            "-a", "least-conn",
            "-b", "127.0.0.1:9001@2",
            "-b", "127.0.0.1:9002",
            "-w", "4",
        ]);
        assert_eq!(cli.port, 9000);
        assert_eq!(cli.algorithm, "least-conn");
        assert_eq!(cli.parsed_backends().len(), 2);
        assert_eq!(cli.worker_count(), 4);
    }
}
