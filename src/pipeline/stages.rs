//! Built-in pipeline stages.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::{AUTHORIZATION, HOST};
use axum::http::{HeaderName, HeaderValue};

use crate::error::GatewayError;
use crate::exchange::Exchange;
use crate::pipeline::{Flow, InterceptPoint, InterceptorRegistry, PipelineInfo, Stage};

pub const X_POWERED_BY: &str = "x-powered-by";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_ACCOUNT_ID: &str = "x-forwarded-account-id";
pub const X_FORWARDED_ACCOUNT_ROLES: &str = "x-forwarded-account-roles";

/// Attaches the route's [`PipelineInfo`] to the exchange.
pub struct PipelineInfoInjector {
    info: PipelineInfo,
}

impl PipelineInfoInjector {
    pub fn new(info: PipelineInfo) -> Self {
        Self { info }
    }
}

#[async_trait]
impl Stage for PipelineInfoInjector {
    fn name(&self) -> &'static str {
        "pipeline-info"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        exchange.set_pipeline_info(self.info.clone());
        Ok(Flow::Continue)
    }
}

/// Copies the configured trace headers into the log context and the response.
pub struct TracingInstrumentation {
    headers: Vec<HeaderName>,
}

impl TracingInstrumentation {
    pub fn new(names: &[String]) -> Self {
        let headers = names
            .iter()
            .filter_map(|name| match HeaderName::try_from(name.as_str()) {
                Ok(header) => Some(header),
                Err(_) => {
                    tracing::warn!(header = %name, "Ignoring invalid trace header name");
                    None
                }
            })
            .collect();
        Self { headers }
    }
}

#[async_trait]
impl Stage for TracingInstrumentation {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        let mut found = Vec::new();
        for header in &self.headers {
            if let Some(value) = exchange.headers().get(header).cloned() {
                found.push((header.clone(), value));
            }
        }
        if found.is_empty() {
            return Ok(Flow::Continue);
        }

        let mut rendered = Vec::with_capacity(found.len());
        for (header, value) in found {
            let text = value.to_str().unwrap_or("<binary>").to_string();
            rendered.push(format!("{header}={text}"));
            exchange.add_trace_value(header.as_str(), text);
            exchange.response_mut().headers_mut().insert(header, value);
        }
        tracing::Span::current().record("trace", tracing::field::display(rendered.join(" ")));
        Ok(Flow::Continue)
    }
}

pub struct XPoweredByInjector;

#[async_trait]
impl Stage for XPoweredByInjector {
    fn name(&self) -> &'static str {
        "x-powered-by"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        exchange
            .response_mut()
            .headers_mut()
            .insert(X_POWERED_BY, HeaderValue::from_static("gatehouse"));
        Ok(Flow::Continue)
    }
}

/// Releases buffered request content once the exchange is over.
pub struct ExchangeBuffersCloser;

#[async_trait]
impl Stage for ExchangeBuffersCloser {
    fn name(&self) -> &'static str {
        "buffers-closer"
    }

    async fn handle(&self, _exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        Ok(Flow::Continue)
    }

    fn completed(&self, exchange: &mut Exchange) {
        exchange.release_content();
    }
}

/// Buffers the request content when the next stages need it.
pub struct RequestContentInjector {
    point: InterceptPoint,
    interceptors: Arc<InterceptorRegistry>,
    terminal_requires_content: bool,
}

impl RequestContentInjector {
    pub fn new(
        point: InterceptPoint,
        interceptors: Arc<InterceptorRegistry>,
        terminal_requires_content: bool,
    ) -> Self {
        Self {
            point,
            interceptors,
            terminal_requires_content,
        }
    }
}

#[async_trait]
impl Stage for RequestContentInjector {
    fn name(&self) -> &'static str {
        "content-injector"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        if exchange.in_error() || exchange.is_content_available() {
            return Ok(Flow::Continue);
        }
        if self.terminal_requires_content || self.interceptors.requires_content(self.point, exchange)
        {
            exchange.read_content().await?;
        }
        Ok(Flow::Continue)
    }
}

/// Writes query parameters changed by interceptors back into the URI.
pub struct QueryStringRebuilder;

#[async_trait]
impl Stage for QueryStringRebuilder {
    fn name(&self) -> &'static str {
        "query-string-rebuilder"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        exchange.rebuild_query_string()?;
        Ok(Flow::Continue)
    }
}

/// Keeps client credentials from reaching backends.
pub struct AuthHeadersRemover;

#[async_trait]
impl Stage for AuthHeadersRemover {
    fn name(&self) -> &'static str {
        "auth-headers-remover"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        exchange.headers_mut().remove(AUTHORIZATION);
        Ok(Flow::Continue)
    }
}

/// Adds the `X-Forwarded-*` headers sent to backends.
pub struct ForwardedHeadersInjector;

#[async_trait]
impl Stage for ForwardedHeadersInjector {
    fn name(&self) -> &'static str {
        "forwarded-headers"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        let client_ip = exchange.client_addr().map(|addr| addr.ip().to_string());
        let proto = exchange.uri().scheme_str().unwrap_or("http").to_string();
        let host = exchange.headers().get(HOST).cloned();
        let account = exchange.account().cloned();
        let headers = exchange.headers_mut();

        // Identity headers only ever come from the gateway.
        headers.remove(X_FORWARDED_ACCOUNT_ID);
        headers.remove(X_FORWARDED_ACCOUNT_ROLES);

        if let Some(ip) = client_ip {
            let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(previous) => format!("{previous}, {ip}"),
                None => ip,
            };
            if let Ok(value) = HeaderValue::from_str(&chain) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }
        if let Some(host) = host {
            headers.entry(X_FORWARDED_HOST).or_insert(host);
        }
        if let Ok(value) = HeaderValue::from_str(&proto) {
            headers.entry(X_FORWARDED_PROTO).or_insert(value);
        }
        if let Some(account) = account {
            if let Ok(value) = HeaderValue::from_str(account.id()) {
                headers.insert(X_FORWARDED_ACCOUNT_ID, value);
            }
            let roles = account.roles().iter().cloned().collect::<Vec<_>>().join(",");
            if let Ok(value) = HeaderValue::from_str(&roles) {
                headers.insert(X_FORWARDED_ACCOUNT_ROLES, value);
            }
        }
        Ok(Flow::Continue)
    }
}

/// Terminal stage for paths no route matched.
pub struct RequestNotManaged;

#[async_trait]
impl Stage for RequestNotManaged {
    fn name(&self) -> &'static str {
        "not-managed"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        Err(GatewayError::NotFound(exchange.path().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Account, ContentLimits};
    use axum::body::Body;
    use axum::extract::{ConnectInfo, Request};
    use std::net::SocketAddr;

    fn exchange(request: Request) -> Exchange {
        Exchange::new(request, ContentLimits::default())
    }

    #[tokio::test]
    async fn test_forwarded_headers() {
        let mut request = Request::builder()
            .uri("/api")
            .header(HOST, "gateway.local")
            .header(X_FORWARDED_FOR, "10.0.0.1")
            .header(X_FORWARDED_ACCOUNT_ID, "spoofed")
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = "192.168.1.7:5000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        let mut ex = exchange(request);

        ForwardedHeadersInjector.handle(&mut ex).await.unwrap();
        assert_eq!(ex.header(X_FORWARDED_FOR), Some("10.0.0.1, 192.168.1.7"));
        assert_eq!(ex.header(X_FORWARDED_HOST), Some("gateway.local"));
        assert_eq!(ex.header(X_FORWARDED_PROTO), Some("http"));
        assert!(ex.header(X_FORWARDED_ACCOUNT_ID).is_none());

        ex.set_account(Account::new("alice", ["admin", "user"]));
        ForwardedHeadersInjector.handle(&mut ex).await.unwrap();
        assert_eq!(ex.header(X_FORWARDED_ACCOUNT_ID), Some("alice"));
        assert_eq!(ex.header(X_FORWARDED_ACCOUNT_ROLES), Some("admin,user"));
    }

    #[tokio::test]
    async fn test_auth_header_removed() {
        let request = Request::builder()
            .uri("/api")
            .header(AUTHORIZATION, "Basic YTpi")
            .body(Body::empty())
            .unwrap();
        let mut ex = exchange(request);
        AuthHeadersRemover.handle(&mut ex).await.unwrap();
        assert!(ex.header("authorization").is_none());
    }

    #[tokio::test]
    async fn test_trace_headers_are_echoed() {
        let request = Request::builder()
            .uri("/api")
            .header("x-b3-traceid", "abc123")
            .body(Body::empty())
            .unwrap();
        let mut ex = exchange(request);
        let stage = TracingInstrumentation::new(&["x-b3-traceid".to_string(), "bad header".to_string()]);

        stage.handle(&mut ex).await.unwrap();
        assert_eq!(ex.trace_values(), &[("x-b3-traceid".to_string(), "abc123".to_string())]);
        assert_eq!(ex.response().headers()["x-b3-traceid"], "abc123");
    }

    #[tokio::test]
    async fn test_content_read_only_when_needed() {
        let registry = Arc::new(InterceptorRegistry::default());
        let request = Request::builder().uri("/").body(Body::from("data")).unwrap();

        let mut ex = exchange(request);
        RequestContentInjector::new(InterceptPoint::RequestAfterAuth, registry.clone(), false)
            .handle(&mut ex)
            .await
            .unwrap();
        assert!(!ex.is_content_available());

        RequestContentInjector::new(InterceptPoint::RequestAfterAuth, registry, true)
            .handle(&mut ex)
            .await
            .unwrap();
        assert_eq!(ex.content().unwrap(), "data");
    }

    #[tokio::test]
    async fn test_not_managed() {
        let request = Request::builder().uri("/nowhere").body(Body::empty()).unwrap();
        let err = RequestNotManaged.handle(&mut exchange(request)).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(path) if path == "/nowhere"));
    }
}
