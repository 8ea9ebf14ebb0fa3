//! Listener — component N.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use tokio::net::TcpListener;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Assigned = 0,
    Ready = 1,
    Paused = 2,
}

/// Per-listener options that don't affect the socket syscalls directly but
/// round out the data model per §3: TLS/ALPN/PROXY-protocol are accepted
/// here and carried through config, but the accept path does not negotiate
/// them (out of scope per §1 — external collaborators).
#[derive(Debug, Clone, Default)]
pub struct ListenerOptions {
    pub tls: bool,
    pub alpn: Vec<String>,
    pub proxy_protocol: bool,
    pub backlog: i32,
    pub buffer_size: usize,
}

impl ListenerOptions {
    pub fn defaults() -> Self {
        Self {
            tls: false,
            alpn: Vec::new(),
            proxy_protocol: false,
            backlog: 1024, // stand-in for SOMAXCONN; raised at bind time when the platform allows it.
            buffer_size: 2 * 1024 * 1024,
        }
    }
}

pub struct Listener {
    pub addr: SocketAddr,
    pub options: ListenerOptions,
    state: AtomicU8,
    accepted: AtomicU64,
    inner: Option<TcpListener>,
}

impl Listener {
    pub fn new(addr: SocketAddr, options: ListenerOptions) -> Self {
        Self {
            addr,
            options,
            state: AtomicU8::new(ListenerState::Assigned as u8),
            accepted: AtomicU64::new(0),
            inner: None,
        }
    }

    pub fn state(&self) -> ListenerState {
        match self.state.load(Ordering::Acquire) {
            1 => ListenerState::Ready,
            2 => ListenerState::Paused,
            _ => ListenerState::Assigned,
        }
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// The socket's actual bound address. Differs from `self.addr` when
    /// `addr` used an ephemeral port (`:0`), as integration tests do.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner
            .as_ref()
            .expect("Listener::local_addr called before bind")
            .local_addr()
    }

    /// Builds the listening socket with the bind options from §4.N:
    /// `SO_REUSEADDR`, `SO_REUSEPORT`, `TCP_NODELAY` (applied per-accepted
    /// socket, not the listener itself), large send/receive buffers, and a
    /// backlog approximating `SOMAXCONN`. Transitions Assigned -> Ready.
    pub fn bind(&mut self) -> Result<()> {
        let domain = if self.addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(SockProtocol::TCP)).map_err(|e| Error::Bind {
            addr: self.addr.to_string(),
            source: e,
        })?;

        socket.set_reuse_address(true).ok();
        #[cfg(unix)]
        socket.set_reuse_port(true).ok();
        socket.set_nonblocking(true).ok();
        socket.set_recv_buffer_size(self.options.buffer_size).ok();
        socket.set_send_buffer_size(self.options.buffer_size).ok();

        socket.bind(&self.addr.into()).map_err(|e| Error::Bind {
            addr: self.addr.to_string(),
            source: e,
        })?;
        socket.listen(self.options.backlog).map_err(|e| Error::Bind {
            addr: self.addr.to_string(),
            source: e,
        })?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener).map_err(|e| Error::Bind {
            addr: self.addr.to_string(),
            source: e,
        })?;

        self.inner = Some(listener);
        self.state.store(ListenerState::Ready as u8, Ordering::Release);
        Ok(())
    }

    pub fn pause(&self) {
        self.state.store(ListenerState::Paused as u8, Ordering::Release);
    }

    pub fn resume(&self) {
        if self.state() == ListenerState::Paused {
            self.state.store(ListenerState::Ready as u8, Ordering::Release);
        }
    }

    /// Paused or Ready -> Assigned, per the listener lifecycle in §3.
    pub fn stop(&self) {
        self.state.store(ListenerState::Assigned as u8, Ordering::Release);
    }

    /// Accepts one connection, applying `TCP_NODELAY` to the accepted
    /// socket per the accept path in §4.M.
    pub async fn accept(&self) -> std::io::Result<(tokio::net::TcpStream, SocketAddr)> {
        let listener = self.inner.as_ref().expect("Listener::accept called before bind");
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true).ok();
        self.accepted.fetch_add(1, Ordering::Relaxed);
        Ok((stream, peer))
    }
}
