//! Error type reported on completion streams.
//!
//! Every fault a runner wants its supervisor to see travels as an [`Error`] through
//! an [`ErrorStream`](crate::ErrorStream). The enum groups them by origin:
//!
//! - **boot phase**: [`Error::Bind`], [`Error::Signal`], [`Error::StartPanicked`];
//! - **run phase**: [`Error::Accept`] and anything a runner reports as [`Error::Other`];
//! - **caller side**: [`Error::GraceExceeded`] from [`ErrorStream::drain_within`](crate::ErrorStream::drain_within).
//!
//! A "no error" outcome is never an [`Error`] value: producers express it as
//! `None` / `Ok(())` and it is dropped before it reaches a stream.

use std::error::Error as StdError;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Boxed runner-defined error.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// # Errors reported by runners and by the supervisor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// A listener could not be bound during startup.
    #[error("bind {addr}: {source}")]
    Bind {
        /// The address as it was configured (`host:port`).
        addr: String,
        /// The underlying I/O error (e.g. address already in use).
        #[source]
        source: io::Error,
    },

    /// The accept loop hit a fault that was not caused by shutdown.
    #[error("accept on {addr}: {source}")]
    Accept {
        /// Local address of the listener.
        addr: SocketAddr,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An OS signal listener could not be registered.
    #[error("signal registration failed: {0}")]
    Signal(#[source] io::Error),

    /// A runner panicked before handing back its completion stream.
    #[error("runner '{runner}' panicked during startup")]
    StartPanicked {
        /// Name of the runner.
        runner: String,
    },

    /// A bounded drain gave up before the stream closed.
    #[error("stream still open after grace period {grace:?}")]
    GraceExceeded {
        /// The grace period that elapsed.
        grace: Duration,
    },

    /// Any error produced by a runner's own work.
    #[error(transparent)]
    Other(#[from] BoxError),
}

impl Error {
    /// Wraps an arbitrary error as [`Error::Other`].
    ///
    /// # Example
    /// ```
    /// let err = runvisor::Error::other("disk full");
    /// assert_eq!(err.to_string(), "disk full");
    /// assert_eq!(err.as_label(), "runner_error");
    /// ```
    pub fn other(err: impl Into<BoxError>) -> Self {
        Error::Other(err.into())
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::Bind { .. } => "bind_failed",
            Error::Accept { .. } => "accept_failed",
            Error::Signal(_) => "signal_registration_failed",
            Error::StartPanicked { .. } => "start_panicked",
            Error::GraceExceeded { .. } => "grace_exceeded",
            Error::Other(_) => "runner_error",
        }
    }

    /// Returns `true` for errors that can only occur while a runner is starting.
    pub fn is_boot_error(&self) -> bool {
        matches!(
            self,
            Error::Bind { .. } | Error::Signal(_) | Error::StartPanicked { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display_keeps_address() {
        let err = Error::Bind {
            addr: "127.0.0.1:80".into(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("bind 127.0.0.1:80: "));
        assert_eq!(err.as_label(), "bind_failed");
        assert!(err.is_boot_error());
        assert!(err.source().is_some());
    }

    #[test]
    fn test_other_is_transparent() {
        let err: Error = BoxError::from("boom").into();
        assert_eq!(err.to_string(), "boom");
        assert!(!err.is_boot_error());
    }

    #[test]
    fn test_grace_exceeded_label() {
        let err = Error::GraceExceeded {
            grace: Duration::from_secs(5),
        };
        assert_eq!(err.as_label(), "grace_exceeded");
        assert_eq!(err.to_string(), "stream still open after grace period 5s");
    }
}
