//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, a listener enabled)
//! - Check that HTTPS has a certificate and key configured
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Proxy and static entries are not checked here; a bad entry drops its
//!   route at registration time instead of stopping the gateway

use thiserror::Error;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no listener enabled, enable http-listener or https-listener")]
    NoListener,

    #[error("https-listener requires listener.tls with cert-path and key-path")]
    MissingTls,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("max-content-size ({max}) is smaller than buffer-size ({buffer})")]
    BufferLargerThanContent { max: usize, buffer: usize },
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let listener = &config.listener;

    if !listener.http_listener && !listener.https_listener {
        errors.push(ValidationError::NoListener);
    }
    if listener.https_listener && listener.tls.is_none() {
        errors.push(ValidationError::MissingTls);
    }

    for (name, value) in [
        ("requests-limit", config.requests_limit),
        ("buffer-size", config.buffer_size),
        ("max-content-size", config.max_content_size),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }
    if config.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("request-timeout-secs"));
    }

    if config.buffer_size > 0
        && config.max_content_size > 0
        && config.max_content_size < config.buffer_size
    {
        errors.push(ValidationError::BufferLargerThanContent {
            max: config.max_content_size,
            buffer: config.buffer_size,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_https_without_tls() {
        let mut config = GatewayConfig::default();
        config.listener.https_listener = true;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::MissingTls]
        );

        config.listener.tls = Some(TlsConfig {
            cert_path: "cert.pem".into(),
            key_path: "key.pem".into(),
        });
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_no_listener() {
        let mut config = GatewayConfig::default();
        config.listener.http_listener = false;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::NoListener]
        );
    }
}
