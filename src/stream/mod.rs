//! # Completion streams.
//!
//! A completion stream is the lifetime of one runner seen from the outside: zero or
//! more [`Error`](crate::Error)s followed by closure. This module provides:
//! - [`ErrorStream`] - the receiving end (an ordered, closable conduit)
//! - [`ErrorSink`] - the producing end held by the runner's task
//!
//! ## Rules
//! - Per-stream FIFO: errors arrive in the order they were reported.
//! - Closure is final: once [`ErrorStream::recv`] returns `None`, nothing else arrives.
//! - The stream closes when every [`ErrorSink`] clone has been dropped.

mod error_stream;
mod sink;

pub use error_stream::ErrorStream;
pub use sink::ErrorSink;

/// Capacity of the channel behind every [`ErrorStream`].
pub(crate) const STREAM_CAPACITY: usize = 16;
