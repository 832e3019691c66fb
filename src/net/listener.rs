//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind the configured plain HTTP and HTTPS addresses
//! - Report bind failures with the address that failed

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ListenerConfig;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid address {address}: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },
}

pub fn parse_address(address: &str) -> Result<SocketAddr, ListenerError> {
    address.parse().map_err(|source| ListenerError::Address {
        address: address.to_string(),
        source,
    })
}

/// Bind the HTTP listener, if enabled.
pub async fn bind_http(config: &ListenerConfig) -> Result<Option<TcpListener>, ListenerError> {
    if !config.http_listener {
        return Ok(None);
    }
    let address = parse_address(&config.http_address())?;
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| ListenerError::Bind { address, source })?;

    let local = listener.local_addr().unwrap_or(address);
    tracing::info!(address = %local, "HTTP listener bound");
    Ok(Some(listener))
}

/// Bind the HTTPS listener, if enabled. The TLS acceptor is attached when serving.
pub fn bind_https(config: &ListenerConfig) -> Result<Option<std::net::TcpListener>, ListenerError> {
    if !config.https_listener {
        return Ok(None);
    }
    let address = parse_address(&config.https_address())?;
    let listener = std::net::TcpListener::bind(address)
        .map_err(|source| ListenerError::Bind { address, source })?;

    let local = listener.local_addr().unwrap_or(address);
    tracing::info!(address = %local, "HTTPS listener bound");
    Ok(Some(listener))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_http() {
        let config = ListenerConfig {
            http_host: "127.0.0.1".into(),
            http_port: 0,
            ..ListenerConfig::default()
        };
        let listener = bind_http(&config).await.unwrap().unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);

        let disabled = ListenerConfig {
            http_listener: false,
            ..ListenerConfig::default()
        };
        assert!(bind_http(&disabled).await.unwrap().is_none());
    }

    #[test]
    fn test_https_port_in_use() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ListenerConfig {
            https_listener: true,
            https_host: "127.0.0.1".into(),
            https_port: taken.local_addr().unwrap().port(),
            ..ListenerConfig::default()
        };
        assert!(matches!(
            bind_https(&config),
            Err(ListenerError::Bind { .. })
        ));
    }

    #[test]
    fn test_invalid_address() {
        assert!(matches!(
            parse_address("nowhere:80"),
            Err(ListenerError::Address { .. })
        ));
    }
}
