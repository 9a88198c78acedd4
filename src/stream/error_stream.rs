//! # ErrorStream: a two-phase completion stream.
//!
//! ```text
//!   ErrorStream
//!   ┌───────────────────────────┬──────────────────────────────┐
//!   │ buffered: VecDeque<Error> │ live: mpsc::Receiver<Error>  │
//!   │ (drained first, in order) │ (forwarded after the buffer) │
//!   └───────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Most streams only have a live tail. The kernel uses the buffered prefix to hand
//! back errors it collected while runners were still starting, spliced in front of
//! the live merged output, so the reader sees one continuous ordered stream.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc::{self, error::TryRecvError};

use super::{ErrorSink, STREAM_CAPACITY};
use crate::error::Error;

/// Receiving side of a runner's completion stream.
///
/// Yields every reported [`Error`] in order and then `None` once the runner has
/// finished. Also usable as a [`futures::Stream`].
#[derive(Debug)]
pub struct ErrorStream {
    buffered: VecDeque<Error>,
    live: Option<mpsc::Receiver<Error>>,
}

impl ErrorStream {
    /// Creates a connected sink/stream pair.
    ///
    /// The stream closes once the sink (and all its clones) is dropped.
    pub fn channel() -> (ErrorSink, ErrorStream) {
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        (ErrorSink::new(tx), Self::spliced(VecDeque::new(), rx))
    }

    /// Returns a stream that is already finished.
    pub fn closed() -> Self {
        Self::finished(VecDeque::new())
    }

    /// Adapts a synchronous outcome into a finished stream.
    ///
    /// `Some(err)` is emitted once before the stream closes; `None` closes it
    /// immediately without emitting anything.
    ///
    /// # Example
    /// ```
    /// use runvisor::{Error, ErrorStream};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let errs = ErrorStream::once(Some(Error::other("no config"))).collect_all().await;
    /// assert_eq!(errs.len(), 1);
    ///
    /// assert!(ErrorStream::once(None).collect_all().await.is_empty());
    /// # }
    /// ```
    pub fn once(err: Option<Error>) -> Self {
        Self::finished(err.into_iter().collect())
    }

    /// Builds a stream that drains `buffered` before forwarding `live`.
    pub(crate) fn spliced(buffered: VecDeque<Error>, live: mpsc::Receiver<Error>) -> Self {
        Self {
            buffered,
            live: Some(live),
        }
    }

    /// Builds a stream that has already finished after reporting `errs`.
    pub(crate) fn finished(errs: VecDeque<Error>) -> Self {
        Self {
            buffered: errs,
            live: None,
        }
    }

    /// Puts `prefix` in front of whatever the stream still has to deliver.
    pub(crate) fn prepended(mut self, mut prefix: VecDeque<Error>) -> Self {
        prefix.append(&mut self.buffered);
        self.buffered = prefix;
        self
    }

    /// Takes every error that is available right now.
    ///
    /// Returns the rest of the stream if it is still open, `None` if it already closed.
    pub(crate) fn split_ready(mut self) -> (VecDeque<Error>, Option<ErrorStream>) {
        let mut ready = VecDeque::new();
        loop {
            match self.try_recv() {
                Ok(err) => ready.push_back(err),
                Err(TryRecvError::Empty) => return (ready, Some(self)),
                Err(TryRecvError::Disconnected) => return (ready, None),
            }
        }
    }

    /// Receives the next error, or `None` once the stream has closed.
    pub async fn recv(&mut self) -> Option<Error> {
        if let Some(err) = self.buffered.pop_front() {
            return Some(err);
        }
        let rx = self.live.as_mut()?;
        let next = rx.recv().await;
        if next.is_none() {
            self.live = None;
        }
        next
    }

    /// Receives an error that is already available without waiting.
    ///
    /// Returns [`TryRecvError::Empty`] while the stream is open but idle and
    /// [`TryRecvError::Disconnected`] once it has closed.
    pub fn try_recv(&mut self) -> Result<Error, TryRecvError> {
        if let Some(err) = self.buffered.pop_front() {
            return Ok(err);
        }
        let Some(rx) = self.live.as_mut() else {
            return Err(TryRecvError::Disconnected);
        };
        let next = rx.try_recv();
        if matches!(next, Err(TryRecvError::Disconnected)) {
            self.live = None;
        }
        next
    }

    /// Polls for the next error; see [`ErrorStream::recv`].
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Error>> {
        if let Some(err) = self.buffered.pop_front() {
            return Poll::Ready(Some(err));
        }
        let Some(rx) = self.live.as_mut() else {
            return Poll::Ready(None);
        };
        let next = ready!(rx.poll_recv(cx));
        if next.is_none() {
            self.live = None;
        }
        Poll::Ready(next)
    }

    /// Drains the stream to closure and returns everything it reported.
    ///
    /// For a stream returned by [`run`](crate::run) this is both "wait until every
    /// runner has exited" and "collect all faults".
    pub async fn collect_all(mut self) -> Vec<Error> {
        let mut errs = Vec::new();
        while let Some(err) = self.recv().await {
            errs.push(err);
        }
        errs
    }

    /// Like [`ErrorStream::collect_all`], but gives up after `grace`.
    ///
    /// Returns [`Error::GraceExceeded`] if the stream is still open when the grace
    /// period elapses. Runners are not affected: bounding the wait is the caller's
    /// concern, stopping them is the token's.
    pub async fn drain_within(self, grace: Duration) -> Result<Vec<Error>, Error> {
        tokio::time::timeout(grace, self.collect_all())
            .await
            .map_err(|_elapsed| Error::GraceExceeded { grace })
    }
}

impl Stream for ErrorStream {
    type Item = Error;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Error>> {
        self.get_mut().poll_recv(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.live {
            Some(_) => (self.buffered.len(), None),
            None => (self.buffered.len(), Some(self.buffered.len())),
        }
    }
}
