//! # Producer side of a completion stream.

use tokio::sync::mpsc;

use crate::error::Error;

/// Handle used by a runner to report errors on its [`ErrorStream`](crate::ErrorStream).
///
/// Dropping the last clone closes the stream, which is how a runner signals that it
/// has finished. Cloning is cheap.
#[derive(Clone, Debug)]
pub struct ErrorSink {
    tx: mpsc::Sender<Error>,
}

impl ErrorSink {
    pub(crate) fn new(tx: mpsc::Sender<Error>) -> Self {
        Self { tx }
    }

    /// Reports an error, waiting for channel capacity if the reader is behind.
    ///
    /// Returns `false` if the receiving side is gone; the error is then discarded.
    pub async fn report(&self, err: impl Into<Error>) -> bool {
        self.tx.send(err.into()).await.is_ok()
    }

    /// Reports the error of a failed result; `Ok(())` is a non-event.
    pub async fn report_result<E: Into<Error>>(&self, res: Result<(), E>) -> bool {
        match res {
            Ok(()) => !self.is_closed(),
            Err(err) => self.report(err).await,
        }
    }

    /// Returns `true` once the receiving [`ErrorStream`](crate::ErrorStream) has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
