//! # TCP listener that enables keep-alive probing on accepted connections.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::warn;

/// Wraps a [`TcpListener`] so every accepted connection has keep-alive enabled.
///
/// Failing to configure keep-alive on a connection is logged and the connection is
/// kept; it never fails the accept.
#[derive(Debug)]
pub struct KeepAliveListener {
    inner: TcpListener,
    local_addr: SocketAddr,
    period: Option<Duration>,
}

impl KeepAliveListener {
    /// Binds a listener on `addr`.
    pub async fn bind<A: ToSocketAddrs>(addr: A, period: Option<Duration>) -> io::Result<Self> {
        Self::from_listener(TcpListener::bind(addr).await?, period)
    }

    /// Wraps an already bound listener.
    pub fn from_listener(inner: TcpListener, period: Option<Duration>) -> io::Result<Self> {
        let local_addr = inner.local_addr()?;
        Ok(Self {
            inner,
            local_addr,
            period,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts the next connection and enables keep-alive on it.
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.inner.accept().await?;
        if let Some(period) = self.period {
            if let Err(err) = SockRef::from(&stream).set_tcp_keepalive(&probe(period)) {
                warn!(%peer, error = %err, "failed to enable tcp keep-alive");
            }
        }
        Ok((stream, peer))
    }
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "windows"
))]
fn probe(period: Duration) -> TcpKeepalive {
    TcpKeepalive::new().with_time(period).with_interval(period)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "windows"
)))]
fn probe(period: Duration) -> TcpKeepalive {
    TcpKeepalive::new().with_time(period)
}
