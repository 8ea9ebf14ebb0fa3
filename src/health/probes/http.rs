use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::health::ProbeKind;

/// TCP connect, then send the exact probe request from §6 and parse the
/// status line. Success is `[200, 400)` by default, or membership in
/// `expected` when configured.
pub async fn http_probe(
    addr: SocketAddr,
    uri: &str,
    host: &str,
    http_version_minor: u8,
    expected: Option<&[u16]>,
    timeout: Duration,
) -> bool {
    let fut = run(addr, uri, host, http_version_minor, expected);
    matches!(tokio::time::timeout(timeout, fut).await, Ok(true))
}

async fn run(
    addr: SocketAddr,
    uri: &str,
    host: &str,
    http_version_minor: u8,
    expected: Option<&[u16]>,
) -> bool {
    let Ok(mut stream) = TcpStream::connect(addr).await else {
        return false;
    };
    let request = format!(
        "OPTIONS {uri} HTTP/1.{http_version_minor}\r\nHost: {host}\r\nUser-Agent: UltraBalancer/1.0\r\nConnection: close\r\n\r\n"
    );
    if stream.write_all(request.as_bytes()).await.is_err() {
        return false;
    }

    let mut buf = Vec::with_capacity(256);
    let mut chunk = [0u8; 256];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() > 8192 {
                    break;
                }
            }
            Err(_) => return false,
        }
    }

    match parse_status_code(&buf) {
        Some(code) => match expected {
            Some(codes) => codes.contains(&code),
            None => ProbeKind::default_status_range().contains(&code),
        },
        None => false,
    }
}

fn parse_status_code(response: &[u8]) -> Option<u16> {
    let line_end = response.iter().position(|&b| b == b'\n')?;
    let line = std::str::from_utf8(&response[..line_end]).ok()?;
    let mut parts = line.split_whitespace();
    parts.next()?; // "HTTP/1.x"
    parts.next()?.parse::<u16>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt as _;
    use tokio::net::TcpListener;

    #[test]
    fn parses_status_code_from_status_line() {
        assert_eq!(parse_status_code(b"HTTP/1.1 204 No Content\r\n\r\n"), Some(204));
        assert_eq!(parse_status_code(b"HTTP/1.1 503 Service Unavailable\r\n"), Some(503));
        assert_eq!(parse_status_code(b"garbage"), None);
    }

    #[tokio::test]
    async fn accepts_2xx_by_default() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let _ = tokio::io::AsyncWriteExt::write_all(
                &mut sock,
                b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n",
            )
            .await;
        });
        assert!(http_probe(addr, "/", "example.test", 1, None, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn rejects_5xx_by_default() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let _ = tokio::io::AsyncWriteExt::write_all(
                &mut sock,
                b"HTTP/1.1 503 Service Unavailable\r\n\r\n",
            )
            .await;
        });
        assert!(!http_probe(addr, "/", "example.test", 1, None, Duration::from_secs(1)).await);
    }
}
