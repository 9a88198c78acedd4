//! # Runner abstraction and function-backed runner implementation.
//!
//! A [`Runner`] is a startable unit of work: given a [`CancellationToken`] it performs
//! its startup phase and hands back an [`ErrorStream`] describing the rest of its life.
//! The common handle type is [`RunnerRef`], an `Arc<dyn Runner>` suitable for sharing
//! across groups.
//!
//! ## Contract for implementors
//! - The start future does the setup that can fail (binding a socket, registering a
//!   signal) and resolves once that setup is done. It must not wait for the work itself.
//! - Setup failures are returned as a finished stream ([`ErrorStream::once`]).
//! - The work runs on its own spawned task, reports faults through an
//!   [`ErrorSink`](crate::ErrorSink) and drops the sink when it is done.
//! - Cancellation is cooperative: the task must watch the token (poll it, or tie a
//!   blocking call such as an accept loop to it). A runner that ignores its token keeps
//!   its group open forever.

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::stream::ErrorStream;

/// Boxed startup future returned by [`Runner::start`].
pub type BoxStartFuture = Pin<Box<dyn Future<Output = ErrorStream> + Send + 'static>>;

/// Shared handle to a runner.
pub type RunnerRef = Arc<dyn Runner>;

/// # Startable, cancellable unit of work.
///
/// # Example
/// ```
/// use runvisor::{BoxStartFuture, ErrorStream, Runner};
/// use tokio_util::sync::CancellationToken;
///
/// struct Ticker;
///
/// impl Runner for Ticker {
///     fn name(&self) -> &str { "ticker" }
///
///     fn start(&self, token: CancellationToken) -> BoxStartFuture {
///         Box::pin(async move {
///             let (sink, stream) = ErrorStream::channel();
///             tokio::spawn(async move {
///                 let _sink = sink;
///                 token.cancelled().await;
///             });
///             stream
///         })
///     }
/// }
/// ```
pub trait Runner: Send + Sync + 'static {
    /// Returns a stable, human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Runs the startup phase and returns the completion stream.
    ///
    /// Each call starts an independent instance; nothing is shared between calls
    /// unless the runner closes over shared data on purpose.
    fn start(&self, token: CancellationToken) -> BoxStartFuture;
}

/// Function-backed runner.
///
/// Wraps a closure that *creates* a new startup future per call.
#[derive(Debug)]
pub struct RunnerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> RunnerFn<F> {
    /// Creates a new function-backed runner.
    ///
    /// Prefer [`RunnerFn::arc`] when you immediately need a [`RunnerRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the runner and returns it as a shared handle.
    ///
    /// ## Example
    /// ```rust
    /// use runvisor::{ErrorStream, RunnerFn, RunnerRef};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// let noop: RunnerRef = RunnerFn::arc("noop", |_token: CancellationToken| async {
    ///     ErrorStream::closed()
    /// });
    /// assert_eq!(noop.name(), "noop");
    /// ```
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> Runner for RunnerFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ErrorStream> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, token: CancellationToken) -> BoxStartFuture {
        Box::pin((self.f)(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_each_start_is_independent() {
        let starts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&starts);
        let r: RunnerRef = RunnerFn::arc("counted", move |_token: CancellationToken| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { ErrorStream::once(Some(Error::other(format!("start {n}")))) }
        });

        let first = r.start(CancellationToken::new()).await.collect_all().await;
        let second = r.start(CancellationToken::new()).await.collect_all().await;

        assert_eq!(first[0].to_string(), "start 0");
        assert_eq!(second[0].to_string(), "start 1");
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }
}
