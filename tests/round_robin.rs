//! End-to-end scenario 1: round-robin distributes sequential connections
//! evenly across healthy backends, through the real accept/dial/forward
//! path (not just the algorithm's unit-level selection).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ultrabalancer::backend::{Protocol, Registry, Role};
use ultrabalancer::forwarder::{self, Listener, ListenerOptions, ReactorMode};
use ultrabalancer::lb::{Algorithm, AlgorithmKind};
use ultrabalancer::primitives::Clock;
use ultrabalancer::stats::Counters;

/// Spawns a stub backend that accepts connections forever, echoing back a
/// fixed tag so the test can tell which backend served a given request.
async fn spawn_tagged_backend(tag: u8) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let mut buf = [0u8; 64];
                if let Ok(n) = sock.read(&mut buf).await {
                    if n > 0 {
                        let _ = sock.write_all(&[tag]).await;
                    }
                }
            });
        }
    });
    addr
}

async fn send_one(addr: SocketAddr) -> io::Result<u8> {
    let mut sock = TcpStream::connect(addr).await?;
    sock.write_all(b"hi").await?;
    let mut buf = [0u8; 1];
    sock.read_exact(&mut buf).await?;
    Ok(buf[0])
}

#[tokio::test]
async fn round_robin_cycles_through_backends_in_order() {
    let registry = Arc::new(Registry::new());
    let mut backend_ids = Vec::new();
    for tag in 0..3u8 {
        let addr = spawn_tagged_backend(tag).await;
        let id = registry.add(addr.ip().to_string(), addr.port(), 1, Role::Generic, Protocol::Tcp);
        let backend = registry.find(id).unwrap();
        backend.record_probe(true, 1, 1, 0);
        backend_ids.push(id);
    }

    let algorithm = Arc::new(Algorithm::new(AlgorithmKind::RoundRobin));

    let mut listener = Listener::new("127.0.0.1:0".parse().unwrap(), ListenerOptions::defaults());
    listener.bind().unwrap();
    let proxy_addr = listener.local_addr().unwrap();
    let listener = Arc::new(listener);

    let mode = ReactorMode::L4 { registry: registry.clone(), algorithm: algorithm.clone() };
    let counters = Arc::new(Counters::new());
    tokio::spawn(forwarder::run_reactor(listener, mode, Clock::new(), counters.clone()));

    let mut tags = Vec::new();
    for _ in 0..9 {
        tags.push(send_one(proxy_addr).await.unwrap());
    }

    assert_eq!(tags, vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);
    assert_eq!(counters.accepted.load(std::sync::atomic::Ordering::Relaxed), 9);
    assert_eq!(counters.rejected.load(std::sync::atomic::Ordering::Relaxed), 0);
}
