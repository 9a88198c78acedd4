//! # Graceful HTTP/HTTPS serving as a runner.
//!
//! [`HttpServer`] binds during startup (so bind errors are boot errors), serves an
//! [`axum::Router`] until its token is cancelled, then drains in-flight requests
//! before closing its stream.
//!
//! ## State machine
//! ```text
//! binding ──(bind failed: Error::Bind)──────────────────────────────► closed
//!    │
//!    └─► serving ──(token cancelled | fatal accept error)──► draining ──► closed
//!          │                                                    │
//!          ├─ accept ─► keep-alive ─► [TLS handshake] ─► hyper  ├─ drop listener
//!          └─ request + response body tracked by `requests`    ├─ graceful shutdown of connections
//!                                                               ├─ wait until requests == 0
//!                                                               └─ drop connections still open
//! ```
//!
//! ## Rules
//! - No connection is accepted once cancellation has been observed: the listener is
//!   dropped before draining starts.
//! - A request that is in flight at cancellation completes and its response is sent.
//!   A request counts as in flight until hyper drops its response body.
//! - Connections without a request in flight (idle, or stalled mid-headers) do not
//!   hold up shutdown: they are dropped once the last request has finished.
//! - Accept errors caused by our own shutdown are not reported; transient per-connection
//!   and resource-exhaustion accept errors are retried; anything else is reported once
//!   and ends serving.
//! - An empty host (`":8080"`) binds the unspecified address.
//! - Request-level failures stay inside hyper/axum and never reach the stream.

use std::borrow::Cow;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use http_body_util::BodyExt;
use hyper::Request;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use super::config::ServeConfig;
use super::keepalive::KeepAliveListener;
use super::tls;
use crate::error::Error;
use crate::runners::{BoxStartFuture, Runner, RunnerRef};
use crate::stream::{ErrorSink, ErrorStream};

/// Runner that serves HTTP (or HTTPS) on one address.
///
/// # Example
/// ```no_run
/// use axum::{Router, routing::get};
/// use runvisor::{AnyExit, HttpServer, RunnerRef, Signal, TerminateOnSignal, run};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let app = Router::new().route("/", get(|| async { "hello" }));
/// let group: RunnerRef = AnyExit::arc(vec![
///     HttpServer::new("0.0.0.0:8080").with_router(app).arc() as RunnerRef,
///     TerminateOnSignal::arc([Signal::Interrupt, Signal::Terminate]),
/// ]);
///
/// let token = CancellationToken::new();
/// for err in run(&token, vec![group]).await.collect_all().await {
///     eprintln!("{err}");
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct HttpServer {
    name: String,
    addr: String,
    router: Router,
    tls: Option<Arc<rustls::ServerConfig>>,
    config: ServeConfig,
}

impl HttpServer {
    /// Creates a plain HTTP server for `addr` (`host:port`) with an empty router.
    ///
    /// An empty host (`":8080"`) listens on every IPv4 interface. The empty router answers every request with `404 Not Found`.
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        Self {
            name: format!("http {addr}"),
            addr,
            router: Router::new(),
            tls: None,
            config: ServeConfig::default(),
        }
    }

    /// Sets the request handler.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Serves HTTPS using `tls`.
    ///
    /// The config is copied at start and `http/1.1` is added to its ALPN list if
    /// missing; the caller's config is never modified.
    pub fn with_tls(mut self, tls: Arc<rustls::ServerConfig>) -> Self {
        self.name = format!("https {}", self.addr);
        self.tls = Some(tls);
        self
    }

    /// Overrides keep-alive and accept tunables.
    pub fn with_config(mut self, config: ServeConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the server as a shared handle.
    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Returns a runner serving plain HTTP on `addr`.
pub fn serve_http(addr: impl Into<String>, router: Router) -> RunnerRef {
    HttpServer::new(addr).with_router(router).arc()
}

/// Returns a runner serving HTTPS on `addr`.
pub fn serve_https(
    addr: impl Into<String>,
    router: Router,
    tls: Arc<rustls::ServerConfig>,
) -> RunnerRef {
    HttpServer::new(addr).with_router(router).with_tls(tls).arc()
}

impl Runner for HttpServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, token: CancellationToken) -> BoxStartFuture {
        let addr = self.addr.clone();
        let router = self.router.clone();
        let config = self.config.clone();
        let acceptor = self
            .tls
            .as_deref()
            .map(|cfg| TlsAcceptor::from(tls::with_http11_fallback(cfg)));

        Box::pin(async move {
            let target = listen_addr(&addr);
            let bound = KeepAliveListener::bind(target.as_ref(), config.keepalive_period()).await;
            let listener = match bound {
                Ok(listener) => listener,
                Err(source) => {
                    warn!(%addr, error = %source, "bind failed");
                    return ErrorStream::once(Some(Error::Bind { addr, source }));
                }
            };

            let (sink, stream) = ErrorStream::channel();
            let serve = Serve {
                listener,
                acceptor,
                router,
                config,
                sink,
            };
            tokio::spawn(serve.run(token));
            stream
        })
    }
}

/// Resolves the `host:port` form where an empty host means "all interfaces".
fn listen_addr(addr: &str) -> Cow<'_, str> {
    match addr.strip_prefix(':') {
        Some(port) if !port.contains(':') => Cow::Owned(format!("0.0.0.0:{port}")),
        _ => Cow::Borrowed(addr),
    }
}

/// One started server instance; owns the listener until draining.
struct Serve {
    listener: KeepAliveListener,
    acceptor: Option<TlsAcceptor>,
    router: Router,
    config: ServeConfig,
    sink: ErrorSink,
}

impl Serve {
    async fn run(self, token: CancellationToken) {
        let Serve {
            listener,
            acceptor,
            router,
            config,
            sink,
        } = self;
        let addr = listener.local_addr();
        info!(%addr, tls = acceptor.is_some(), "listening");

        // Cancelled by the caller, or by us after a fatal accept error.
        let shutdown = token.child_token();
        // Cancelled once no request is in flight any more.
        let closing = CancellationToken::new();
        let connections = TaskTracker::new();
        let requests = TaskTracker::new();

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                res = listener.accept() => res,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let conn = Connection {
                        peer,
                        router: router.clone(),
                        requests: requests.clone(),
                        shutdown: shutdown.clone(),
                        closing: closing.clone(),
                    };
                    connections.spawn(conn.serve(stream, acceptor.clone()));
                }
                Err(_) if shutdown.is_cancelled() => break,
                Err(err) if is_transient(&err) => {
                    debug!(%addr, error = %err, "transient accept error");
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(config.accept_retry_delay) => {}
                    }
                }
                Err(source) => {
                    warn!(%addr, error = %source, "accept failed; stop serving");
                    sink.report(Error::Accept { addr, source }).await;
                    break;
                }
            }
        }

        drop(listener);
        debug!(
            %addr,
            connections = connections.len(),
            requests = requests.len(),
            "draining"
        );

        shutdown.cancel();
        requests.close();
        requests.wait().await;

        closing.cancel();
        connections.close();
        connections.wait().await;

        info!(%addr, "stopped");
    }
}

/// Accept errors that leave the listener usable: per-connection failures and
/// temporary resource exhaustion.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::OutOfMemory
    ) || is_exhausted(err)
}

/// Out of file descriptors or socket buffers.
#[cfg(unix)]
fn is_exhausted(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}

#[cfg(not(unix))]
fn is_exhausted(_err: &io::Error) -> bool {
    false
}

/// One accepted connection.
struct Connection {
    peer: SocketAddr,
    router: Router,
    requests: TaskTracker,
    shutdown: CancellationToken,
    closing: CancellationToken,
}

impl Connection {
    async fn serve(self, stream: TcpStream, acceptor: Option<TlsAcceptor>) {
        let Some(acceptor) = acceptor else {
            return self.serve_io(stream).await;
        };

        let handshake = tokio::select! {
            _ = self.shutdown.cancelled() => return,
            res = acceptor.accept(stream) => res,
        };
        match handshake {
            Ok(stream) => self.serve_io(stream).await,
            Err(err) => debug!(peer = %self.peer, error = %err, "tls handshake failed"),
        }
    }

    async fn serve_io<I>(self, io: I)
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let Connection {
            peer,
            router,
            requests,
            shutdown,
            closing,
        } = self;

        let service = service_fn(move |req: Request<Incoming>| {
            let in_flight = requests.token();
            let call = router.clone().oneshot(req);
            async move {
                let res = call.await?;
                // The token rides on the body, which hyper drops once it is written.
                Ok::<_, Infallible>(res.map(|body| {
                    Body::new(body.map_frame(move |frame| {
                        let _in_flight = &in_flight;
                        frame
                    }))
                }))
            }
        });

        let builder = auto::Builder::new(TokioExecutor::new());
        let conn = builder.serve_connection(TokioIo::new(io), service);
        tokio::pin!(conn);

        let res = tokio::select! {
            res = conn.as_mut() => res,
            _ = shutdown.cancelled() => {
                conn.as_mut().graceful_shutdown();
                tokio::select! {
                    biased;
                    res = conn.as_mut() => res,
                    _ = closing.cancelled() => {
                        debug!(%peer, "dropping connection without request in flight");
                        return;
                    }
                }
            }
        };
        if let Err(err) = res {
            debug!(%peer, error = %err, "connection closed with error");
        }
    }
}
