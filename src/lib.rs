//! # runvisor
//!
//! **Runvisor** is a small lifecycle kernel for groups of cancellable async runners.
//!
//! A runner is anything that can be started with a [`CancellationToken`] and then
//! describes the rest of its life as an [`ErrorStream`]: zero or more errors followed
//! by closure. [`run`] starts a list of runners, waits until all of them are past
//! their startup phase, and returns one merged stream that closes when every runner
//! has exited. Groups of runners are runners themselves, so they nest.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────┐   ┌──────────────┐   ┌───────────────────┐
//!   │  HttpServer  │   │  RunnerFn    │   │ TerminateOnSignal │
//!   │ (bind/serve) │   │ (user code)  │   │  (OS signals)     │
//!   └──────┬───────┘   └──────┬───────┘   └─────────┬─────────┘
//!          ▼                  ▼                     ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  run(parent, runners)                                         │
//! │  - derives a child token, starts runners in call order        │
//! │  - buffers boot errors until every startup has resolved       │
//! │  - merges completion streams, cancels the token at the end    │
//! └──────────────────────────────┬────────────────────────────────┘
//!                                ▼
//!                  ErrorStream (boot errors, then live errors, then closed)
//! ```
//!
//! ### Lifecycle of a runner
//! ```text
//! start(token) ──► startup (may fail: returns ErrorStream::once(Some(err)))
//!      │
//!      └─► spawned work ──► sink.report(err)* ──► drop(sink) ══ stream closed
//!                 ▲
//!                 └── token.cancelled() (cooperative)
//! ```
//!
//! ## Features
//! | Area            | Description                                                   | Key types                                   |
//! |-----------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Kernel**      | Boot-gated start, stream merging, derived cancellation.       | [`run`]                                     |
//! | **Runners**     | Runner contract, closure runners, groups.                     | [`Runner`], [`RunnerFn`], [`Multi`], [`AnyExit`] |
//! | **Streams**     | Ordered, closable error conduits.                             | [`ErrorStream`], [`ErrorSink`]              |
//! | **Signals**     | Process termination as an ordinary runner.                    | [`TerminateOnSignal`], [`Signal`]           |
//! | **HTTP(S)**     | Graceful serving of an axum router with request draining.     | [`HttpServer`], [`serve_http`], [`serve_https`] |
//! | **Errors**      | Typed errors with stable labels.                              | [`Error`]                                   |
//!
//! ## Example
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use runvisor::{AnyExit, RunnerRef, TerminateOnSignal, run, serve_http};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new().route("/health", get(|| async { "ok" }));
//!
//!     // The server stops when a signal arrives; the signal runner stops if the
//!     // server fails to bind.
//!     let group: RunnerRef = AnyExit::arc(vec![
//!         serve_http("127.0.0.1:8080", app),
//!         TerminateOnSignal::arc(Vec::new()),
//!     ]);
//!
//!     let token = CancellationToken::new();
//!     let mut errs = run(&token, vec![group]).await;
//!     while let Some(err) = errs.recv().await {
//!         eprintln!("{}: {err}", err.as_label());
//!     }
//! }
//! ```
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

mod core;
mod error;
mod runners;
mod server;
mod stream;

// ---- Public re-exports ----

pub use core::{Signal, run};
pub use error::{BoxError, Error};
pub use runners::{AnyExit, BoxStartFuture, Multi, Runner, RunnerFn, RunnerRef, TerminateOnSignal};
pub use server::{
    DEFAULT_KEEPALIVE, HTTP11_ALPN, HttpServer, KeepAliveListener, ServeConfig, serve_http,
    serve_https, with_http11_fallback,
};
pub use stream::{ErrorSink, ErrorStream};
