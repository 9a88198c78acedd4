//! # Serving configuration.
//!
//! Provides [`ServeConfig`], the tunables of [`HttpServer`](crate::HttpServer).
//!
//! ## Sentinel values
//! - `keepalive = 0s` → TCP keep-alive is left at the OS default (not enabled here)

use std::time::Duration;

/// Default TCP keep-alive probe period for accepted connections.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(3 * 60);

/// Configuration for the graceful HTTP/HTTPS adapter.
///
/// ## Field semantics
/// - `keepalive`: idle time before the OS starts probing a connection, also used as
///   the probe interval where the platform supports it (`0s` = leave untouched)
/// - `accept_retry_delay`: pause after a transient accept error before accepting again
#[derive(Clone, Debug)]
pub struct ServeConfig {
    /// TCP keep-alive period for accepted connections.
    ///
    /// Half-dead peers (a laptop closed mid-download) are eventually reclaimed by
    /// the probes instead of pinning a connection forever.
    pub keepalive: Duration,

    /// Delay before accepting again after a transient accept error.
    pub accept_retry_delay: Duration,
}

impl ServeConfig {
    /// Returns the keep-alive period as an `Option`.
    ///
    /// - `None` → keep-alive is not configured
    /// - `Some(d)` → probes after `d` of idleness
    #[inline]
    pub fn keepalive_period(&self) -> Option<Duration> {
        if self.keepalive == Duration::ZERO {
            None
        } else {
            Some(self.keepalive)
        }
    }
}

impl Default for ServeConfig {
    /// Default configuration:
    ///
    /// - `keepalive = 3m`
    /// - `accept_retry_delay = 50ms`
    fn default() -> Self {
        Self {
            keepalive: DEFAULT_KEEPALIVE,
            accept_retry_delay: Duration::from_millis(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_keepalive_disables() {
        let mut cfg = ServeConfig::default();
        assert_eq!(cfg.keepalive_period(), Some(Duration::from_secs(180)));

        cfg.keepalive = Duration::ZERO;
        assert_eq!(cfg.keepalive_period(), None);
    }
}
