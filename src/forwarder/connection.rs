//! Per-connection state and the forward/close paths — component M.
//!
//! There is no hand-rolled readiness token here: a `tokio::net::TcpStream`
//! half is owned exclusively by the task copying through it, so the
//! "invalidate the token before freeing" deferred-free concern in §4.M has
//! no counterpart to build — ownership already rules out a stale event
//! referencing a freed connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::backend::Backend;
use crate::primitives::Clock;

const COPY_BUF_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Connected,
    Forwarding,
    HalfClosedClient,
    HalfClosedBackend,
    Closing,
}

/// One accepted client connection paired with its chosen backend. Owned
/// entirely by the task running `forward` — per §3's invariant, exactly
/// one owner for the connection's lifetime.
pub struct Connection {
    pub client_addr: SocketAddr,
    pub backend: Arc<Backend>,
    pub state: State,
    start_ns: u64,
}

impl Connection {
    pub fn new(client_addr: SocketAddr, backend: Arc<Backend>, clock: &Clock) -> Self {
        Self {
            client_addr,
            backend,
            state: State::Connecting,
            start_ns: clock.now_ns(),
        }
    }

    /// Runs the forward path until both halves close, then performs the
    /// close path exactly once: decrement `active_conns`, record
    /// `response_time_ns`. Byte counters are updated per direction as data
    /// moves (not just at the end), matching "byte counters are updated per
    /// direction" in §4.M.
    ///
    /// Backpressure is the natural consequence of `write_all` awaiting the
    /// destination's write-readiness before pulling more from the source,
    /// which is the async equivalent of "cease to subscribe to read on the
    /// source when the destination has outstanding bytes".
    pub async fn forward(mut self, client: TcpStream, backend_stream: TcpStream, clock: &Clock) -> std::io::Result<()> {
        self.state = State::Forwarding;

        let (client_rd, client_wr) = client.into_split();
        let (backend_rd, backend_wr) = backend_stream.into_split();

        let backend_for_c2b = self.backend.clone();
        let client_to_backend = tokio::spawn(async move {
            pump(client_rd, backend_wr, move |n| backend_for_c2b.record_bytes(n, 0)).await
        });

        let backend_for_b2c = self.backend.clone();
        let backend_to_client = tokio::spawn(async move {
            pump(backend_rd, client_wr, move |n| backend_for_b2c.record_bytes(0, n)).await
        });

        let (c2b, b2c) = tokio::join!(client_to_backend, backend_to_client);
        self.state = State::Closing;

        let response_time_ns = clock.now_ns().saturating_sub(self.start_ns);
        self.backend.release_connection(response_time_ns);

        c2b.ok();
        b2c.ok();
        Ok(())
    }
}

/// Copies from `src` to `dst` until EOF or error, invoking `on_bytes` after
/// each successful chunk. Closes `dst`'s write half once `src` is drained,
/// the half-close signal for the other direction's pump.
async fn pump(
    mut src: impl tokio::io::AsyncRead + Unpin,
    mut dst: impl tokio::io::AsyncWrite + Unpin,
    on_bytes: impl Fn(u64),
) -> std::io::Result<()> {
    let mut buf = [0u8; COPY_BUF_SIZE];
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n]).await?;
        on_bytes(n as u64);
    }
    let _ = dst.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Protocol, Role};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn forward_relays_bytes_both_ways_and_releases_connection() {
        let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend_listener.local_addr().unwrap();

        let echo = tokio::spawn(async move {
            let (mut sock, _) = backend_listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = sock.read(&mut buf).await.unwrap();
            sock.write_all(&buf[..n]).await.unwrap();
        });

        let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client_listener.local_addr().unwrap();
        let client_task = tokio::spawn(async move {
            let mut sock = TcpStream::connect(client_addr).await.unwrap();
            sock.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 64];
            let n = sock.read(&mut buf).await.unwrap();
            buf[..n].to_vec()
        });

        let (client_side, peer) = client_listener.accept().await.unwrap();
        let backend_side = TcpStream::connect(backend_addr).await.unwrap();

        use crate::backend::BackendId;
        let backend = Arc::new(Backend::new(BackendId(0), "127.0.0.1", backend_addr.port(), 1, Role::Generic, Protocol::Tcp));
        backend.try_acquire_connection();

        let clock = Clock::new();
        let conn = Connection::new(peer, backend.clone(), &clock);
        conn.forward(client_side, backend_side, &clock).await.unwrap();

        echo.await.unwrap();
        let echoed = client_task.await.unwrap();
        assert_eq!(&echoed, b"ping");
        assert_eq!(backend.active_conns(), 0);
        assert!(backend.bytes_in() >= 4);
        assert!(backend.bytes_out() >= 4);
    }
}
