use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Passive read of the initial handshake packet: a 4-byte packet header
/// (3-byte little-endian length, 1-byte sequence number that must be 0)
/// followed by a protocol-version byte that must be 9 or 10.
pub async fn mysql_probe(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(tokio::time::timeout(timeout, run(addr)).await, Ok(true))
}

async fn run(addr: SocketAddr) -> bool {
    let Ok(mut stream) = TcpStream::connect(addr).await else {
        return false;
    };
    let mut header = [0u8; 5];
    if stream.read_exact(&mut header).await.is_err() {
        return false;
    }
    let length = u32::from_le_bytes([header[0], header[1], header[2], 0]);
    let seq = header[3];
    let protocol_version = header[4];
    length >= 1 && seq == 0 && matches!(protocol_version, 9 | 10)
}
