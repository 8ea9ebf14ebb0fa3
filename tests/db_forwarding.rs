//! The DB-aware reactor path (component M feeding component J) must not
//! just make a routing decision — it has to actually dial the chosen
//! backend and splice bytes through, the same as the L4/HTTP paths.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ultrabalancer::backend::{Protocol, Registry, Role};
use ultrabalancer::db::{Pool, PoolConfig};
use ultrabalancer::forwarder::{self, Listener, ListenerOptions, ReactorMode};
use ultrabalancer::primitives::Clock;
use ultrabalancer::stats::Counters;

const PING: &[u8] = b"*1\r\n$4\r\nPING\r\n";

async fn spawn_echo_backend() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 256];
        let n = sock.read(&mut buf).await.unwrap();
        sock.write_all(&buf[..n]).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn db_connection_is_actually_forwarded_to_the_chosen_backend() {
    let registry = Arc::new(Registry::new());
    let backend_addr = spawn_echo_backend().await;
    let backend_id = registry.add(backend_addr.ip().to_string(), backend_addr.port(), 1, Role::Primary, Protocol::Redis);
    registry.find(backend_id).unwrap().record_probe(true, 1, 1, 0);

    let pool = Arc::new(Pool::new(registry.clone(), PoolConfig::default()));

    let mut listener = Listener::new("127.0.0.1:0".parse().unwrap(), ListenerOptions::defaults());
    listener.bind().unwrap();
    let proxy_addr = listener.local_addr().unwrap();
    let listener = Arc::new(listener);

    tokio::spawn(forwarder::run_reactor(
        listener,
        ReactorMode::Db { pool: pool.clone() },
        Clock::new(),
        Arc::new(Counters::new()),
    ));

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(PING).await.unwrap();

    let mut buf = [0u8; 256];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], PING, "client bytes should round-trip through the real backend socket");

    assert_eq!(registry.find(backend_id).unwrap().bytes_in(), PING.len() as u64);
}
