//! Per-request logging.
//!
//! One line per request at level 1; request and response headers are added
//! at level 2. The line is written from the completion hook so failed
//! requests are logged with their final status.

use async_trait::async_trait;
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::HeaderMap;

use crate::config::schema::LoggingConfig;
use crate::error::GatewayError;
use crate::exchange::Exchange;
use crate::observability::metrics;
use crate::pipeline::{Flow, Stage};

#[derive(Debug, Clone, Default)]
pub struct RequestLogSettings {
    pub dump_level: u8,
    pub trace_headers: Vec<String>,
}

impl From<&LoggingConfig> for RequestLogSettings {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            dump_level: config.log_exchange_dump,
            trace_headers: config.requests_log_trace_headers.clone(),
        }
    }
}

pub struct RequestLogger {
    dump_level: u8,
}

impl RequestLogger {
    pub fn new(dump_level: u8) -> Self {
        Self { dump_level }
    }
}

#[async_trait]
impl Stage for RequestLogger {
    fn name(&self) -> &'static str {
        "request-logger"
    }

    async fn handle(&self, _exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        Ok(Flow::Continue)
    }

    fn completed(&self, exchange: &mut Exchange) {
        let status = exchange.response().status().as_u16();
        let elapsed = exchange.elapsed();
        let pipeline = exchange
            .pipeline_info()
            .map_or("not-managed", |info| info.name.as_str());
        metrics::record_request(pipeline, status, elapsed);

        let client = exchange
            .client_addr()
            .map_or_else(|| "-".to_string(), |addr| addr.to_string());
        let account = exchange.account().map_or("-", |a| a.id());

        match self.dump_level {
            0 => {}
            1 => tracing::info!(
                method = %exchange.method(),
                uri = %exchange.uri(),
                status,
                elapsed_ms = elapsed.as_millis() as u64,
                client = %client,
                account = %account,
                pipeline = %pipeline,
                "Request handled"
            ),
            _ => tracing::info!(
                method = %exchange.method(),
                uri = %exchange.uri(),
                status,
                elapsed_ms = elapsed.as_millis() as u64,
                client = %client,
                account = %account,
                pipeline = %pipeline,
                request_headers = %redacted(exchange.headers()),
                response_headers = %redacted(exchange.response().headers()),
                "Request handled"
            ),
        }
    }
}

/// Header dump with credentials hidden.
fn redacted(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if name == AUTHORIZATION || name == COOKIE || name == SET_COOKIE {
                "<redacted>"
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            format!("{name}: {shown}")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_credentials_are_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic secret"));
        headers.insert("accept", HeaderValue::from_static("*/*"));
        let dump = redacted(&headers);
        assert!(dump.contains("authorization: <redacted>"));
        assert!(dump.contains("accept: */*"));
        assert!(!dump.contains("secret"));
    }
}
