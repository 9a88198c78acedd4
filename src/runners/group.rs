//! # Runner groups.
//!
//! A group of runners is itself a runner:
//! - [`Multi`] runs its members through [`run`] and finishes when all of them have.
//! - [`AnyExit`] does the same, but cancels the remaining members as soon as any one
//!   of them finishes.
//!
//! ```text
//! Multi(a, Multi(b, c))          AnyExit(server, terminator)
//!   └─► run(token, [a, m])         └─► group = token.child_token()
//!              └─► run(token', [b, c])   run(group, [server', terminator'])
//!                                          member stream closes ─► group.cancel()
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::runner::{BoxStartFuture, Runner, RunnerRef};
use crate::core::run;
use crate::stream::ErrorStream;

/// Runs a fixed list of runners as one.
///
/// Starting a `Multi` is exactly [`run`] over its members with the given token, so
/// groups nest freely. The group finishes once every member has finished.
///
/// # Example
/// ```
/// use runvisor::{ErrorStream, Multi, RunnerFn, RunnerRef, run};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let leaf: RunnerRef = RunnerFn::arc("leaf", |_t: CancellationToken| async { ErrorStream::closed() });
/// let inner: RunnerRef = Multi::arc(vec![leaf.clone(), leaf.clone()]);
///
/// let token = CancellationToken::new();
/// let errs = run(&token, vec![inner, leaf]).await.collect_all().await;
/// assert!(errs.is_empty());
/// # }
/// ```
pub struct Multi {
    runners: Vec<RunnerRef>,
}

impl Multi {
    /// Creates a group over `runners`, started in the given order.
    pub fn new(runners: impl IntoIterator<Item = RunnerRef>) -> Self {
        Self {
            runners: runners.into_iter().collect(),
        }
    }

    /// Creates the group and returns it as a shared handle.
    pub fn arc(runners: impl IntoIterator<Item = RunnerRef>) -> Arc<Self> {
        Arc::new(Self::new(runners))
    }
}

impl Runner for Multi {
    fn name(&self) -> &str {
        "multi"
    }

    fn start(&self, token: CancellationToken) -> BoxStartFuture {
        let runners = self.runners.clone();
        Box::pin(async move { run(&token, runners).await })
    }
}

/// Runs a fixed list of runners and stops all of them when the first one finishes.
///
/// Typical use is pairing servers with a
/// [`TerminateOnSignal`](crate::TerminateOnSignal): the signal closes the terminator,
/// which cancels the servers, which then drain and close. A member that fails to
/// start also counts as finished.
pub struct AnyExit {
    runners: Vec<RunnerRef>,
}

impl AnyExit {
    /// Creates a group over `runners`, started in the given order.
    pub fn new(runners: impl IntoIterator<Item = RunnerRef>) -> Self {
        Self {
            runners: runners.into_iter().collect(),
        }
    }

    /// Creates the group and returns it as a shared handle.
    pub fn arc(runners: impl IntoIterator<Item = RunnerRef>) -> Arc<Self> {
        Arc::new(Self::new(runners))
    }
}

impl Runner for AnyExit {
    fn name(&self) -> &str {
        "any-exit"
    }

    fn start(&self, token: CancellationToken) -> BoxStartFuture {
        let runners = self.runners.clone();
        Box::pin(async move {
            let group = token.child_token();
            let members = runners.into_iter().map(|inner| {
                Arc::new(CancelOnExit {
                    inner,
                    group: group.clone(),
                }) as RunnerRef
            });
            run(&group, members).await
        })
    }
}

/// Member of an [`AnyExit`] group: cancels `group` once `inner` finishes.
struct CancelOnExit {
    inner: RunnerRef,
    group: CancellationToken,
}

impl Runner for CancelOnExit {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn start(&self, token: CancellationToken) -> BoxStartFuture {
        let inner = Arc::clone(&self.inner);
        let group = self.group.clone();
        Box::pin(async move {
            let (ready, rest) = inner.start(token).await.split_ready();
            let Some(mut rest) = rest else {
                debug!(runner = inner.name(), "member failed to start; cancelling group");
                group.cancel();
                return ErrorStream::finished(ready);
            };

            let (sink, stream) = ErrorStream::channel();
            tokio::spawn(async move {
                while let Some(err) = rest.recv().await {
                    sink.report(err).await;
                }
                debug!(runner = inner.name(), "member exited; cancelling group");
                group.cancel();
            });
            stream.prepended(ready)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::runners::RunnerFn;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    const LIMIT: Duration = Duration::from_secs(5);

    fn sorted_messages(errs: &[Error]) -> Vec<String> {
        let mut msgs: Vec<String> = errs.iter().map(ToString::to_string).collect();
        msgs.sort();
        msgs
    }

    /// Reports `msg` after `delay`, then finishes.
    fn reporting(msg: &'static str, delay: Duration) -> RunnerRef {
        RunnerFn::arc(msg, move |_token: CancellationToken| async move {
            let (sink, stream) = ErrorStream::channel();
            tokio::spawn(async move {
                sleep(delay).await;
                sink.report(Error::other(msg)).await;
            });
            stream
        })
    }

    /// Waits for cancellation, then reports `msg`.
    fn on_cancel(msg: &'static str) -> RunnerRef {
        RunnerFn::arc(msg, move |token: CancellationToken| async move {
            let (sink, stream) = ErrorStream::channel();
            tokio::spawn(async move {
                token.cancelled().await;
                sink.report(Error::other(msg)).await;
            });
            stream
        })
    }

    #[tokio::test]
    async fn test_multi_nesting_is_associative() {
        let a = || reporting("a", Duration::from_millis(30));
        let b = || reporting("b", Duration::from_millis(10));
        let c = || reporting("c", Duration::from_millis(20));

        let token = CancellationToken::new();
        let left: RunnerRef = Multi::arc(vec![Multi::arc(vec![a(), b()]) as RunnerRef, c()]);
        let right: RunnerRef = Multi::arc(vec![a(), Multi::arc(vec![b(), c()]) as RunnerRef]);

        let left = timeout(LIMIT, run(&token, vec![left]).await.collect_all())
            .await
            .unwrap();
        let right = timeout(LIMIT, run(&token, vec![right]).await.collect_all())
            .await
            .unwrap();

        assert_eq!(sorted_messages(&left), vec!["a", "b", "c"]);
        assert_eq!(sorted_messages(&left), sorted_messages(&right));
    }

    #[tokio::test]
    async fn test_multi_waits_for_every_member() {
        let token = CancellationToken::new();
        let group: RunnerRef = Multi::arc(vec![
            reporting("done", Duration::ZERO),
            on_cancel("cancelled"),
        ]);
        let mut errs = run(&token, vec![group]).await;

        assert_eq!(timeout(LIMIT, errs.recv()).await.unwrap().unwrap().to_string(), "done");
        assert!(timeout(Duration::from_millis(100), errs.recv()).await.is_err());

        token.cancel();
        let rest = timeout(LIMIT, errs.collect_all()).await.unwrap();
        assert_eq!(sorted_messages(&rest), vec!["cancelled"]);
    }

    #[tokio::test]
    async fn test_any_exit_cancels_siblings() {
        let token = CancellationToken::new();
        let group: RunnerRef = AnyExit::arc(vec![
            on_cancel("server-stopped"),
            reporting("terminator", Duration::from_millis(20)),
        ]);

        let errs = timeout(LIMIT, run(&token, vec![group]).await.collect_all())
            .await
            .unwrap();
        assert_eq!(sorted_messages(&errs), vec!["server-stopped", "terminator"]);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_any_exit_keeps_boot_errors_in_front() {
        let failed: RunnerRef = RunnerFn::arc("bind", |_token: CancellationToken| async {
            ErrorStream::once(Some(Error::other("address in use")))
        });

        let token = CancellationToken::new();
        let group: RunnerRef = AnyExit::arc(vec![on_cancel("peer-stopped"), failed]);
        let errs = timeout(LIMIT, run(&token, vec![group]).await.collect_all())
            .await
            .unwrap();

        let msgs: Vec<String> = errs.iter().map(ToString::to_string).collect();
        assert_eq!(msgs, vec!["address in use", "peer-stopped"]);
    }
}
