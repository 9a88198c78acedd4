//! # Cross-platform OS signal handling.
//!
//! Provides [`Signal`], the set of termination signals a runner can listen for, and
//! [`SignalListeners`], a per-call registration of those signals.
//!
//! ## Signals
//! **Unix platforms:** each [`Signal`] maps to its `SIGxxx` counterpart.
//!
//! **Other platforms:** every requested signal is served by
//! [`tokio::signal::ctrl_c`].
//!
//! ## Rules
//! - Registration happens when [`SignalListeners::register`] is called, so failures
//!   surface during a runner's startup.
//! - Listeners are scoped to their owner: dropping [`SignalListeners`] deregisters
//!   them, and independent registrations never steal each other's deliveries.

use std::fmt;
use std::io;

/// OS signal that can end a [`TerminateOnSignal`](crate::TerminateOnSignal) runner.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// `SIGINT` (Ctrl-C in a terminal).
    Interrupt,
    /// `SIGTERM` (default kill signal, used by systemd/Kubernetes).
    Terminate,
    /// `SIGQUIT`.
    Quit,
    /// `SIGHUP`.
    Hangup,
    /// `SIGUSR1`.
    User1,
    /// `SIGUSR2`.
    User2,
}

impl Signal {
    /// Signals listened for when none are given explicitly.
    pub const DEFAULT_SHUTDOWN: [Signal; 3] = [Signal::Interrupt, Signal::Terminate, Signal::Quit];

    /// Returns the conventional `SIGxxx` name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Quit => "SIGQUIT",
            Signal::Hangup => "SIGHUP",
            Signal::User1 => "SIGUSR1",
            Signal::User2 => "SIGUSR2",
        }
    }

    #[cfg(unix)]
    fn kind(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;

        match self {
            Signal::Interrupt => SignalKind::interrupt(),
            Signal::Terminate => SignalKind::terminate(),
            Signal::Quit => SignalKind::quit(),
            Signal::Hangup => SignalKind::hangup(),
            Signal::User1 => SignalKind::user_defined1(),
            Signal::User2 => SignalKind::user_defined2(),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered listeners for a set of signals.
#[cfg(unix)]
pub(crate) struct SignalListeners {
    listeners: Vec<(Signal, tokio::signal::unix::Signal)>,
}

#[cfg(unix)]
impl SignalListeners {
    /// Registers one listener per signal.
    ///
    /// Returns `Err` if any registration fails; listeners registered so far are dropped.
    pub(crate) fn register(signals: &[Signal]) -> io::Result<Self> {
        let listeners = signals
            .iter()
            .map(|&sig| tokio::signal::unix::signal(sig.kind()).map(|l| (sig, l)))
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self { listeners })
    }

    /// Waits for the first delivery of any registered signal.
    ///
    /// Returns `None` if nothing is registered or the signal driver has shut down;
    /// with nothing registered it never resolves.
    pub(crate) async fn recv(&mut self) -> Option<Signal> {
        if self.listeners.is_empty() {
            return std::future::pending().await;
        }
        let waits = self
            .listeners
            .iter_mut()
            .map(|(sig, listener)| Box::pin(async move { listener.recv().await.map(|()| *sig) }));
        let (received, _, _) = futures::future::select_all(waits).await;
        received
    }
}

/// Registered listeners for a set of signals.
#[cfg(not(unix))]
pub(crate) struct SignalListeners {
    signals: Vec<Signal>,
}

#[cfg(not(unix))]
impl SignalListeners {
    /// Records the requested signals; Ctrl-C is registered lazily on first wait.
    pub(crate) fn register(signals: &[Signal]) -> io::Result<Self> {
        Ok(Self {
            signals: signals.to_vec(),
        })
    }

    /// Waits for Ctrl-C and reports it as the first requested signal.
    pub(crate) async fn recv(&mut self) -> Option<Signal> {
        let sig = *self.signals.first()?;
        tokio::signal::ctrl_c().await.ok().map(|()| sig)
    }
}
