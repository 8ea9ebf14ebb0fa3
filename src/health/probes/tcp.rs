use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;

/// Non-blocking connect with a deadline. Success is L4OK.
pub async fn tcp_probe(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn succeeds_against_a_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });
        assert!(tcp_probe(addr, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn fails_against_a_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(!tcp_probe(addr, Duration::from_millis(300)).await);
    }
}
