//! # Runners and combinators.
//!
//! This module provides the runner contract and the stock runners built on it:
//! - [`Runner`] - trait for startable, cancellable units of work
//! - [`RunnerFn`] - closure-backed runner
//! - [`RunnerRef`] - shared reference to a runner (`Arc<dyn Runner>`)
//! - [`Multi`] / [`AnyExit`] - groups of runners that are runners themselves
//! - [`TerminateOnSignal`] - finishes on an OS termination signal

mod group;
mod runner;
mod signal;

pub use group::{AnyExit, Multi};
pub use runner::{BoxStartFuture, Runner, RunnerFn, RunnerRef};
pub use signal::TerminateOnSignal;
