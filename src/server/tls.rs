//! # TLS configuration preparation for the HTTPS adapter.
//!
//! The caller's [`ServerConfig`] is cloned, never mutated: rustls configs are shared
//! behind `Arc` and may be in use elsewhere. The clone is shallow where rustls holds
//! shared state (certificate resolver, session storage, ticketer are `Arc`s) and owns
//! no locks of its own, so nothing synchronization-related is duplicated.

use std::sync::Arc;

use rustls::ServerConfig;

/// ALPN identifier of plain HTTP/1.1.
pub const HTTP11_ALPN: &[u8] = b"http/1.1";

/// Returns a copy of `config` whose ALPN list is guaranteed to include `http/1.1`.
///
/// Protocols already listed keep their order and preference; `http/1.1` is appended
/// only when missing.
pub fn with_http11_fallback(config: &ServerConfig) -> Arc<ServerConfig> {
    let mut config = config.clone();
    if !config.alpn_protocols.iter().any(|p| p == HTTP11_ALPN) {
        config.alpn_protocols.push(HTTP11_ALPN.to_vec());
    }
    Arc::new(config)
}


#[cfg(test)]
mod tests {
    use super::testing::server_config;
    use super::*;

    #[test]
    fn test_appends_http11_when_missing() {
        let original = server_config(&[b"h2"]);
        let prepared = with_http11_fallback(&original);

        assert_eq!(prepared.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
        assert_eq!(original.alpn_protocols, vec![b"h2".to_vec()]);
    }

    #[test]
    fn test_keeps_existing_http11_once() {
        let original = server_config(&[b"http/1.1", b"h2"]);
        let prepared = with_http11_fallback(&original);
        assert_eq!(prepared.alpn_protocols, original.alpn_protocols);

        let empty = with_http11_fallback(&server_config(&[]));
        assert_eq!(empty.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn test_other_fields_are_carried_over() {
        let mut original = server_config(&[]);
        original.max_early_data_size = 4096;
        original.ignore_client_order = true;

        let prepared = with_http11_fallback(&original);
        assert_eq!(prepared.max_early_data_size, 4096);
        assert!(prepared.ignore_client_order);
    }
}
