use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const PING: &[u8] = b"*1\r\n$4\r\nPING\r\n";
const EXPECTED: &[u8] = b"+PONG\r\n";

/// Sends the RESP `PING` and expects exactly `+PONG\r\n` as the first 7
/// bytes of the reply.
pub async fn redis_probe(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(tokio::time::timeout(timeout, run(addr)).await, Ok(true))
}

async fn run(addr: SocketAddr) -> bool {
    let Ok(mut stream) = TcpStream::connect(addr).await else {
        return false;
    };
    if stream.write_all(PING).await.is_err() {
        return false;
    }
    let mut buf = [0u8; EXPECTED.len()];
    if stream.read_exact(&mut buf).await.is_err() {
        return false;
    }
    buf == EXPECTED
}
