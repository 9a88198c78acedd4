//! # TerminateOnSignal: "the process should exit" as an ordinary runner.
//!
//! ```text
//! start(token)
//!   ├─► SignalListeners::register(signals)   (Err ─► Error::Signal, closed)
//!   └─► spawn: select! {
//!           listeners.recv() ─► info!(signal)
//!           token.cancelled()
//!       } ─► drop(listeners), drop(sink) ─► stream closes without error
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::runner::{BoxStartFuture, Runner};
use crate::core::{Signal, SignalListeners};
use crate::error::Error;
use crate::stream::ErrorStream;

/// Runner that finishes when one of its signals arrives or its token is cancelled.
///
/// Listeners are registered per start and released when the stream closes, so several
/// terminators (or several groups) in one process do not interfere.
#[derive(Debug, Clone)]
pub struct TerminateOnSignal {
    signals: Vec<Signal>,
}

impl TerminateOnSignal {
    /// Creates a terminator for `signals`.
    ///
    /// An empty list means [`Signal::DEFAULT_SHUTDOWN`]. Duplicates are ignored.
    pub fn new(signals: impl IntoIterator<Item = Signal>) -> Self {
        let mut unique: Vec<Signal> = Vec::new();
        for sig in signals {
            if !unique.contains(&sig) {
                unique.push(sig);
            }
        }
        if unique.is_empty() {
            unique.extend(Signal::DEFAULT_SHUTDOWN);
        }
        Self { signals: unique }
    }

    /// Creates the terminator and returns it as a shared handle.
    pub fn arc(signals: impl IntoIterator<Item = Signal>) -> Arc<Self> {
        Arc::new(Self::new(signals))
    }

    /// Signals this terminator listens for.
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }
}

impl Runner for TerminateOnSignal {
    fn name(&self) -> &str {
        "terminate-on-signal"
    }

    fn start(&self, token: CancellationToken) -> BoxStartFuture {
        let signals = self.signals.clone();
        Box::pin(async move {
            let mut listeners = match SignalListeners::register(&signals) {
                Ok(listeners) => listeners,
                Err(err) => return ErrorStream::once(Some(Error::Signal(err))),
            };

            let (sink, stream) = ErrorStream::channel();
            tokio::spawn(async move {
                let _sink = sink;
                tokio::select! {
                    received = listeners.recv() => match received {
                        Some(sig) => info!(signal = %sig, "termination signal received"),
                        None => debug!("signal driver gone"),
                    },
                    _ = token.cancelled() => debug!("terminator cancelled"),
                }
            });
            stream
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_empty_list_means_default_set() {
        let t = TerminateOnSignal::new(Vec::new());
        assert_eq!(t.signals(), &Signal::DEFAULT_SHUTDOWN);

        let t = TerminateOnSignal::new([Signal::Hangup, Signal::Hangup, Signal::Quit]);
        assert_eq!(t.signals(), &[Signal::Hangup, Signal::Quit]);
    }

    #[tokio::test]
    async fn test_stays_open_until_cancelled() {
        let token = CancellationToken::new();
        let mut stream = TerminateOnSignal::new([Signal::User2]).start(token.clone()).await;

        assert!(timeout(Duration::from_millis(100), stream.recv()).await.is_err());

        token.cancel();
        let next = timeout(Duration::from_secs(5), stream.recv()).await.unwrap();
        assert!(next.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_closes_without_error_on_signal() {
        let token = CancellationToken::new();
        let stream = TerminateOnSignal::new([Signal::User1]).start(token.clone()).await;

        nix::sys::signal::raise(nix::sys::signal::Signal::SIGUSR1).unwrap();

        let errs = timeout(Duration::from_secs(5), stream.collect_all())
            .await
            .unwrap();
        assert!(errs.is_empty());
        assert!(!token.is_cancelled());
    }
}
