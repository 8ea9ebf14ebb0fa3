//! Accept loop and first-bytes backend selection — component M.
//!
//! One `tokio::spawn`'d task per accepted connection stands in for "owned
//! by exactly one reactor for its lifetime" (see the runtime justification
//! in the crate's top-level docs): tokio's work-stealing scheduler plus
//! `SO_REUSEPORT` on the listener reproduces the single-reactor-per-worker
//! accept distribution §5 describes without a hand-rolled epoll loop.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{Backend, Registry};
use crate::db::{self, DbProtocol, Pool, QueryKind};
use crate::forwarder::connection::Connection;
use crate::forwarder::listener::Listener;
use crate::lb::{Algorithm, SelectionContext};
use crate::primitives::Clock;
use crate::ratelimit::RateLimiter;
use crate::route::{Method, RequestMeta, Table as RouteTable};
use crate::stats::Counters;

const PEEK_BUF_SIZE: usize = 4096;

/// How a listener picks a backend for each new connection.
pub enum Mode {
    /// Raw L4: select directly over the whole healthy backend set.
    L4 { registry: Arc<Registry>, algorithm: Arc<Algorithm> },
    /// L7 HTTP: peek the request line/headers and match against the route
    /// table.
    Http { registry: Arc<Registry>, routes: Arc<RouteTable>, rate_limiter: Arc<RateLimiter> },
    /// L7 DB-aware: sniff the wire protocol, classify the first query, and
    /// route through the session-aware pool.
    Db { pool: Arc<Pool> },
}

/// Drives one listener's accept loop for the lifetime of the process (or
/// until the listener transitions out of `Ready`). `counters` tracks the
/// frontend-level accepted/rejected totals from §6's statistics shape:
/// every successful `accept` increments `accepted`, every `accept` failure
/// (the "accept failure under load" resource-exhausted case in §7)
/// increments `rejected`.
pub async fn run(listener: Arc<Listener>, mode: Mode, clock: Clock, counters: Arc<Counters>) {
    loop {
        if listener.state() != crate::forwarder::listener::ListenerState::Ready {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            continue;
        }
        match listener.accept().await {
            Ok((stream, peer)) => {
                counters.record_accept();
                let mode = clone_mode(&mode);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer, mode, clock).await {
                        debug!(%peer, error = %e, "connection ended with error");
                    }
                });
            }
            Err(e) => {
                counters.record_reject();
                warn!(error = %e, "accept failed");
            }
        }
    }
}

fn clone_mode(mode: &Mode) -> Mode {
    match mode {
        Mode::L4 { registry, algorithm } => Mode::L4 { registry: registry.clone(), algorithm: algorithm.clone() },
        Mode::Http { registry, routes, rate_limiter } => {
            Mode::Http { registry: registry.clone(), routes: routes.clone(), rate_limiter: rate_limiter.clone() }
        }
        Mode::Db { pool } => Mode::Db { pool: pool.clone() },
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, peer: SocketAddr, mode: Mode, clock: Clock) -> io::Result<()> {
    match mode {
        Mode::L4 { registry, algorithm } => {
            let healthy = registry.iter_healthy(None);
            let ctx = SelectionContext { client_ip: Some(peer.ip()), uri: None, hash_key: None };
            let backend_id = algorithm.select(&healthy, &ctx).ok_or_else(no_target)?;
            let backend = registry.find(backend_id).ok_or_else(no_target)?;
            dial_and_forward(stream, peer, backend, &clock).await
        }
        Mode::Http { registry, routes, rate_limiter } => {
            let mut buf = [0u8; PEEK_BUF_SIZE];
            let n = stream.peek(&mut buf).await?;
            let (method, path, headers) = parse_http_request_line(&buf[..n]).ok_or_else(protocol_error)?;
            let req = RequestMeta::new(method, &path, &headers);
            let now_ms = clock.now_ms();
            let (route_name, backend_id) = routes.route_request(&req, now_ms).ok_or_else(no_target)?;
            if !rate_limiter.check(&route_name, now_ms) {
                return Err(rate_limited());
            }
            let backend = registry.find(backend_id).ok_or_else(no_target)?;
            let result = dial_and_forward(stream, peer, backend, &clock).await;
            routes.record_result(&route_name, result.is_ok(), clock.now_ms());
            result
        }
        Mode::Db { pool } => {
            let mut buf = [0u8; PEEK_BUF_SIZE];
            let n = stream.peek(&mut buf).await?;
            let protocol = db::sniff(&buf[..n]).ok_or_else(protocol_error)?;
            let kind = db::extract_query_text(protocol, &buf[..n])
                .map(|t| db::classify_query(&t))
                .unwrap_or(QueryKind::Other);
            route_db_connection(stream, peer, pool, protocol, kind, &clock).await
        }
    }
}

/// Routes one DB-protocol connection through the session-aware pool
/// (component J picks the backend and pins the session) and then forwards
/// the connection's bytes the same way the L4/HTTP paths do. `PoolConn`'s
/// own socket field stays an intentional lazy stub (see its doc comment);
/// the actual backend socket used for byte forwarding is dialed fresh here,
/// exactly as `dial_and_forward` does for the other two modes.
async fn route_db_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    pool: Arc<Pool>,
    _protocol: DbProtocol,
    kind: QueryKind,
    clock: &Clock,
) -> io::Result<()> {
    let now_ms = clock.now_ms();
    let session = pool.new_session(now_ms).map_err(to_io_error)?;
    let conn = pool.route_query(session, kind, now_ms).map_err(to_io_error)?;
    let backend_id = conn.backend_id;
    let backend = match pool.registry().find(backend_id) {
        Some(b) => b,
        None => {
            pool.release(conn, clock.now_ms());
            return Err(no_target());
        }
    };
    debug!(%peer, backend = backend_id.0, "db connection routed");
    let result = dial_and_forward(stream, peer, backend, clock).await;
    pool.release(conn, clock.now_ms());
    result
}

async fn dial_and_forward(stream: tokio::net::TcpStream, peer: SocketAddr, backend: Arc<Backend>, clock: &Clock) -> io::Result<()> {
    if !backend.try_acquire_connection() {
        return Err(no_target());
    }
    let addr = backend.ip().map(|ip| SocketAddr::new(ip, backend.port())).ok_or_else(no_target)?;
    let backend_stream = match tokio::net::TcpStream::connect(addr).await {
        Ok(s) => s,
        Err(e) => {
            backend.record_failure();
            backend.release_connection(0);
            return Err(e);
        }
    };
    backend_stream.set_nodelay(true).ok();

    let conn = Connection::new(peer, backend.clone(), clock);
    conn.forward(stream, backend_stream, clock).await
}

fn no_target() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "no healthy backend available")
}

fn rate_limited() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "rate limit exceeded for route")
}

fn protocol_error() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "unrecognized protocol on first bytes")
}

fn to_io_error(e: crate::error::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

/// Minimal request-line/header parse sufficient for routing — full HTTP
/// parsing is explicitly out of scope (§1).
fn parse_http_request_line(data: &[u8]) -> Option<(Method, String, HashMap<String, String>)> {
    let text = std::str::from_utf8(data).ok()?;
    let mut lines = text.split("\r\n");
    let request_line = lines.next()?;
    let mut parts = request_line.split(' ');
    let method = Method::parse(parts.next()?);
    let path = parts.next()?.to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    Some((method, path, headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_and_headers() {
        let raw = b"GET /api/users?id=1 HTTP/1.1\r\nHost: example.com\r\nX-Foo: bar\r\n\r\n";
        let (method, path, headers) = parse_http_request_line(raw).unwrap();
        assert_eq!(method, Method::Get);
        assert_eq!(path, "/api/users?id=1");
        assert_eq!(headers.get("host").map(String::as_str), Some("example.com"));
        assert_eq!(headers.get("x-foo").map(String::as_str), Some("bar"));
    }

    #[test]
    fn malformed_request_line_returns_none() {
        assert!(parse_http_request_line(b"garbage\r\n\r\n").is_none());
    }
}
