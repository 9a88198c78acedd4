//! # Supervisor kernel: start runners, gate on boot, merge their streams.
//!
//! [`run`] starts every runner with a token derived from the caller's, waits until all
//! of them have finished their startup phase, and hands back one merged
//! [`ErrorStream`] that closes once every runner has exited.
//!
//! ## Architecture
//! ```text
//! run(parent, runners)
//!   │
//!   ├─► token = parent.child_token()
//!   │
//!   ├─► spawn start_all():  runner[0].start(token) ─► split ─► feed ─┐
//!   │                       runner[1].start(token) ─► split ─► feed ─┤  (call order)
//!   │                       runner[N-1].start(...) ─► split ─► feed ─┤
//!   │                       drop(feed)  ══ boot complete ════════════╡
//!   │                                                                ▼
//!   ├─► spawn Multiplexer::run():                 feed.recv() ─► register(started)
//!   │       ┌───────────────────────────────────────────────────────────┘
//!   │       ├─ errors queued when start resolved ──────────────────► out
//!   │       └─ spawn forwarder(stream) ─► events ─► Observed::Error ─► out
//!   │                                            └► Observed::Closed ─► pending -= 1
//!   │       exit when feed exhausted && pending == 0 ─► token.cancel(), drop(out)
//!   │
//!   └─► caller side: buffer everything from `out` until boot complete,
//!       then return ErrorStream { buffered, live: out }
//! ```
//!
//! ## Rules
//! - `run` returns once every runner's startup future has resolved; it never waits
//!   for the work itself.
//! - Errors a runner has queued by the time its startup resolves (boot errors) are
//!   delivered in runner call order, ahead of every error reported afterwards.
//! - Per-runner FIFO is preserved; there is no ordering across runners after boot.
//! - The merged stream closes iff all runners have been started and every one of
//!   their streams has closed.
//! - The derived token is cancelled once, after the last runner has finished. A
//!   finished runner does not stop its siblings (see [`AnyExit`](crate::AnyExit)).
//! - A runner is never restarted.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::Error;
use crate::runners::RunnerRef;
use crate::stream::{ErrorStream, STREAM_CAPACITY};

/// Starts `runners` under a token derived from `parent` and merges their streams.
///
/// Resolves once every runner has completed its startup phase. Errors observed during
/// that window are buffered and delivered first, in call order. Draining the returned
/// stream to closure waits for every runner to exit.
///
/// Cancelling `parent` cascades to every runner. Zero runners yield a stream that is
/// already closed.
///
/// # Example
/// ```
/// use runvisor::{ErrorStream, RunnerFn, RunnerRef, run};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let quick: RunnerRef = RunnerFn::arc("quick", |_token: CancellationToken| async {
///     ErrorStream::closed()
/// });
///
/// let token = CancellationToken::new();
/// let errs = run(&token, vec![quick.clone(), quick]).await.collect_all().await;
/// assert!(errs.is_empty());
/// # }
/// ```
pub async fn run<I>(parent: &CancellationToken, runners: I) -> ErrorStream
where
    I: IntoIterator<Item = RunnerRef>,
{
    let runners: Vec<RunnerRef> = runners.into_iter().collect();
    let token = parent.child_token();

    let (feed_tx, feed_rx) = mpsc::channel(runners.len().max(1));
    let (out_tx, mut out_rx) = mpsc::channel(STREAM_CAPACITY);
    let (boot_tx, mut boot_rx) = oneshot::channel();

    let count = runners.len();
    tokio::spawn(start_all(token.clone(), runners, feed_tx));
    let (mux, events_rx) = Multiplexer::new(token, out_tx);
    tokio::spawn(mux.run(feed_rx, events_rx, boot_tx));

    let mut boot_errors = VecDeque::new();
    loop {
        tokio::select! {
            Some(err) = out_rx.recv() => boot_errors.push_back(err),
            _ = &mut boot_rx => break,
        }
    }

    debug!(runners = count, boot_errors = boot_errors.len(), "boot complete");
    ErrorStream::spliced(boot_errors, out_rx)
}

/// A runner whose startup has resolved.
struct Started {
    /// Errors already queued when the start future resolved.
    boot: VecDeque<Error>,
    /// The rest of the stream, `None` if it had already closed.
    rest: Option<ErrorStream>,
}

/// Calls each runner in order and feeds the result to the multiplexer.
///
/// Boot errors are taken in the same poll that sees the start future resolve.
/// Dropping `feed` at the end is the boot-complete signal.
async fn start_all(
    token: CancellationToken,
    runners: Vec<RunnerRef>,
    feed: mpsc::Sender<Started>,
) {
    for (index, runner) in runners.into_iter().enumerate() {
        debug!(runner = runner.name(), index, "starting runner");

        let start = AssertUnwindSafe(async { runner.start(token.clone()).await });
        let stream = match start.catch_unwind().await {
            Ok(stream) => stream,
            Err(_panic) => ErrorStream::once(Some(Error::StartPanicked {
                runner: runner.name().to_string(),
            })),
        };

        let (boot, rest) = stream.split_ready();
        if feed.send(Started { boot, rest }).await.is_err() {
            break;
        }
    }
}

/// What a forwarder saw on one runner's stream.
enum Observed {
    Error(Error),
    Closed { index: usize },
}

/// Owns all merge state of one [`run`] call.
struct Multiplexer {
    token: CancellationToken,
    out: mpsc::Sender<Error>,
    events: mpsc::Sender<Observed>,
    /// Run-phase errors seen before boot completed.
    held: VecDeque<Error>,
    registered: usize,
    pending: usize,
}

impl Multiplexer {
    fn new(
        token: CancellationToken,
        out: mpsc::Sender<Error>,
    ) -> (Self, mpsc::Receiver<Observed>) {
        let (events, events_rx) = mpsc::channel(STREAM_CAPACITY);
        let mux = Self {
            token,
            out,
            events,
            held: VecDeque::new(),
            registered: 0,
            pending: 0,
        };
        (mux, events_rx)
    }

    async fn run(
        mut self,
        mut feed: mpsc::Receiver<Started>,
        mut events: mpsc::Receiver<Observed>,
        boot: oneshot::Sender<()>,
    ) {
        let mut boot = Some(boot);

        while boot.is_some() || self.pending > 0 {
            tokio::select! {
                next = feed.recv(), if boot.is_some() => match next {
                    Some(started) => self.register(started).await,
                    None => {
                        self.flush_held().await;
                        if let Some(boot) = boot.take() {
                            let _ = boot.send(());
                        }
                    }
                },
                Some(observed) = events.recv() => match observed {
                    Observed::Error(err) if boot.is_some() => self.held.push_back(err),
                    Observed::Error(err) => self.forward(err).await,
                    Observed::Closed { index } => self.finished(index),
                },
            }
        }

        self.token.cancel();
        debug!(runners = self.registered, "all runners finished");
    }

    /// Adds a freshly started runner's stream to the awaited set.
    async fn register(&mut self, started: Started) {
        let index = self.registered;
        self.registered += 1;
        self.pending += 1;

        for err in started.boot {
            self.forward(err).await;
        }

        match started.rest {
            Some(stream) => self.spawn_forwarder(index, stream),
            None => self.finished(index),
        }
    }

    fn spawn_forwarder(&self, index: usize, mut stream: ErrorStream) {
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(err) = stream.recv().await {
                if events.send(Observed::Error(err)).await.is_err() {
                    return;
                }
            }
            let _ = events.send(Observed::Closed { index }).await;
        });
    }

    fn finished(&mut self, index: usize) {
        self.pending -= 1;
        debug!(index, pending = self.pending, "runner finished");
    }

    async fn flush_held(&mut self) {
        while let Some(err) = self.held.pop_front() {
            self.forward(err).await;
        }
    }

    async fn forward(&self, err: Error) {
        if let Err(mpsc::error::SendError(err)) = self.out.send(err).await {
            trace!(error = %err, "merged stream dropped; discarding error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runners::RunnerFn;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};
    use tokio::time::{sleep, timeout};

    const LIMIT: Duration = Duration::from_secs(5);

    fn messages(errs: &[Error]) -> Vec<String> {
        errs.iter().map(ToString::to_string).collect()
    }

    fn closing(name: &'static str) -> RunnerRef {
        RunnerFn::arc(name, |_token: CancellationToken| async {
            ErrorStream::closed()
        })
    }

    fn failing(name: &'static str, msg: &'static str) -> RunnerRef {
        RunnerFn::arc(name, move |_token: CancellationToken| async move {
            ErrorStream::once(Some(Error::other(msg)))
        })
    }

    fn until_cancelled(name: &'static str) -> RunnerRef {
        RunnerFn::arc(name, |token: CancellationToken| async move {
            let (sink, stream) = ErrorStream::channel();
            tokio::spawn(async move {
                let _sink = sink;
                token.cancelled().await;
            });
            stream
        })
    }

    #[tokio::test]
    async fn test_no_runners_closes_immediately() {
        let token = CancellationToken::new();
        let errs = timeout(LIMIT, run(&token, Vec::new()).await.collect_all())
            .await
            .unwrap();
        assert!(errs.is_empty());
    }

    #[tokio::test]
    async fn test_closing_runners_yield_no_errors() {
        let token = CancellationToken::new();
        for n in 0..6 {
            let runners: Vec<RunnerRef> = (0..n).map(|_| closing("closing")).collect();
            let errs = timeout(LIMIT, run(&token, runners).await.collect_all())
                .await
                .unwrap();
            assert!(errs.is_empty(), "n={n}");
        }
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_boot_errors_come_first_in_call_order() {
        let early_worker: RunnerRef = RunnerFn::arc("worker", |_token: CancellationToken| async {
            let (sink, stream) = ErrorStream::channel();
            tokio::spawn(async move {
                sink.report(Error::other("run-0")).await;
            });
            stream
        });
        let slow_fail: RunnerRef = RunnerFn::arc("slow", |_token: CancellationToken| async {
            sleep(Duration::from_millis(50)).await;
            ErrorStream::once(Some(Error::other("boot-1")))
        });

        let token = CancellationToken::new();
        let runners = vec![early_worker, slow_fail, failing("fast", "boot-2")];
        let errs = timeout(LIMIT, run(&token, runners).await.collect_all())
            .await
            .unwrap();

        assert_eq!(messages(&errs), vec!["boot-1", "boot-2", "run-0"]);
    }

    #[tokio::test]
    async fn test_run_waits_for_startup_not_for_work() {
        let slow_start: RunnerRef = RunnerFn::arc("slow-start", |token: CancellationToken| async move {
            sleep(Duration::from_millis(100)).await;
            let (sink, stream) = ErrorStream::channel();
            tokio::spawn(async move {
                token.cancelled().await;
                sink.report(Error::other("stopped")).await;
            });
            stream
        });

        let token = CancellationToken::new();
        let started = Instant::now();
        let mut errs = timeout(LIMIT, run(&token, vec![slow_start, until_cancelled("idle")]))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));

        assert!(timeout(Duration::from_millis(100), errs.recv()).await.is_err());

        token.cancel();
        let rest = timeout(LIMIT, errs.collect_all()).await.unwrap();
        assert_eq!(messages(&rest), vec!["stopped"]);
    }

    #[tokio::test]
    async fn test_derived_token_cancelled_after_all_finish() {
        let seen = Arc::new(Mutex::new(None::<CancellationToken>));
        let slot = Arc::clone(&seen);
        let spy: RunnerRef = RunnerFn::arc("spy", move |token: CancellationToken| {
            *slot.lock().unwrap() = Some(token);
            async { ErrorStream::closed() }
        });

        let parent = CancellationToken::new();
        let errs = timeout(LIMIT, run(&parent, vec![spy]).await.collect_all())
            .await
            .unwrap();
        assert!(errs.is_empty());

        let derived = seen.lock().unwrap().take().unwrap();
        assert!(derived.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_finished_runner_does_not_stop_siblings() {
        let token = CancellationToken::new();
        let mut errs = run(&token, vec![failing("fail", "bad"), until_cancelled("idle")]).await;

        assert_eq!(errs.recv().await.unwrap().to_string(), "bad");
        assert!(timeout(Duration::from_millis(100), errs.recv()).await.is_err());

        token.cancel();
        assert!(timeout(LIMIT, errs.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        let errs = run(&token, vec![until_cancelled("a"), until_cancelled("b")]).await;

        token.cancel();
        token.cancel();
        let errs = timeout(LIMIT, errs.collect_all()).await.unwrap();
        assert!(errs.is_empty());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_panicking_start_is_reported_and_others_start() {
        let panicky: RunnerRef = RunnerFn::arc("panicky", |_token: CancellationToken| async {
            if true {
                panic!("boom");
            }
            ErrorStream::closed()
        });

        let token = CancellationToken::new();
        let errs = timeout(
            LIMIT,
            run(&token, vec![panicky, failing("after", "still started")])
                .await
                .collect_all(),
        )
        .await
        .unwrap();

        assert!(matches!(&errs[0], Error::StartPanicked { runner } if runner == "panicky"));
        assert_eq!(errs[1].to_string(), "still started");
    }

    #[tokio::test]
    async fn test_many_errors_during_boot_do_not_block() {
        let chatty: RunnerRef = RunnerFn::arc("chatty", |_token: CancellationToken| async {
            let (sink, stream) = ErrorStream::channel();
            tokio::spawn(async move {
                for i in 0..100 {
                    sink.report(Error::other(format!("e{i}"))).await;
                }
            });
            sleep(Duration::from_millis(50)).await;
            stream
        });

        let token = CancellationToken::new();
        let errs = timeout(LIMIT, run(&token, vec![chatty]).await.collect_all())
            .await
            .unwrap();
        let expected: Vec<String> = (0..100).map(|i| format!("e{i}")).collect();
        assert_eq!(messages(&errs), expected);
    }
}
