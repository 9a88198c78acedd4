//! Runtime core: the supervisor kernel and OS signal plumbing.
//!
//! Internal modules:
//! - [`supervisor`]: starts runners, gates on the boot phase, merges completion streams;
//! - [`shutdown`]: cross-platform termination signal handling.

mod shutdown;
mod supervisor;

pub(crate) use shutdown::SignalListeners;
pub use shutdown::Signal;
pub use supervisor::run;
