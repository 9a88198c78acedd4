//! # Example: Graceful HTTP server
//!
//! Serves a small router until Ctrl-C / SIGTERM, then drains in-flight requests.
//!
//! ```text
//! cargo run --example serve
//! curl localhost:8080/slow   # then press Ctrl-C: the request still completes
//! ```

use std::time::Duration;

use axum::{Router, routing::get};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use runvisor::{
    AnyExit, Error, ErrorStream, RunnerFn, RunnerRef, TerminateOnSignal, run, serve_http,
};

/// Reports a heartbeat error every few seconds until cancelled.
fn heartbeat() -> RunnerRef {
    RunnerFn::arc("heartbeat", |token: CancellationToken| async move {
        let (sink, stream) = ErrorStream::channel();
        tokio::spawn(async move {
            let mut beat = 0u64;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {
                        beat += 1;
                        sink.report(Error::other(format!("heartbeat #{beat}"))).await;
                    }
                }
            }
        });
        stream
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,runvisor=debug")),
        )
        .init();

    let app = Router::new()
        .route("/", get(|| async { "hello\n" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "slow hello\n"
            }),
        );

    let group: RunnerRef = AnyExit::arc(vec![
        serve_http("127.0.0.1:8080", app),
        heartbeat(),
        TerminateOnSignal::arc(Vec::new()),
    ]);

    let token = CancellationToken::new();
    let mut errs = run(&token, vec![group]).await;
    println!("[demo] started");

    while let Some(err) = errs.recv().await {
        println!("[demo] {}: {err}", err.as_label());
    }
    println!("[demo] all runners stopped");
    Ok(())
}
