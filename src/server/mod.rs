//! # Graceful HTTP/HTTPS serving.
//!
//! - [`HttpServer`] - runner serving an [`axum::Router`], with [`serve_http`] and
//!   [`serve_https`] as shorthands
//! - [`ServeConfig`] - keep-alive and accept tunables
//! - [`KeepAliveListener`] - TCP listener enabling keep-alive on accepted connections
//! - [`with_http11_fallback`] - TLS config preparation used for HTTPS

mod config;
mod http;
mod keepalive;
mod tls;

pub use config::{DEFAULT_KEEPALIVE, ServeConfig};
pub use http::{HttpServer, serve_http, serve_https};
pub use keepalive::KeepAliveListener;
pub use tls::{HTTP11_ALPN, with_http11_fallback};
