//! Terminal stage forwarding requests to a backend pool.
//!
//! # Responsibilities
//! - Lease a backend host for the duration of the exchange
//! - Build the forwarded request from the exchange
//! - Stream the backend response back, holding the lease until it ends
//! - Report connection failures to the pool

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Uri, Version};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::error::GatewayError;
use crate::exchange::Exchange;
use crate::http::body::guarded;
use crate::load_balancer::{HostLease, HostPool};
use crate::pipeline::{Flow, Stage};
use crate::proxy::headers::{rewrite_host, strip_hop_by_hop};
use crate::proxy::ProxyOptions;

/// Load-balancing HTTP client of one proxy route.
pub struct ProxyDispatcher {
    name: String,
    pool: Arc<HostPool>,
    client: Client<HttpConnector, Body>,
    rewrite_host_header: bool,
}

impl ProxyDispatcher {
    pub fn new(name: impl Into<String>, pool: Arc<HostPool>, options: &ProxyOptions) -> Self {
        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_max_idle_per_host(options.connections_per_thread);
        builder.pool_idle_timeout(options.connections_ttl);

        Self {
            name: name.into(),
            pool,
            client: builder.build(HttpConnector::new()),
            rewrite_host_header: options.rewrite_host_header,
        }
    }

    pub fn pool(&self) -> &Arc<HostPool> {
        &self.pool
    }

    fn forwarded_uri(lease: &HostLease, exchange: &Exchange) -> Result<Uri, GatewayError> {
        let host = lease.host();
        let mut path = format!("{}{}", host.base_path(), exchange.relative_path());
        if path.is_empty() {
            path.push('/');
        }
        let query = exchange
            .uri()
            .query()
            .map(|q| format!("?{q}"))
            .unwrap_or_default();
        format!("http://{}{}{}", host.authority(), path, query)
            .parse()
            .map_err(|e| GatewayError::Internal(format!("invalid forwarded uri: {e}")))
    }

    fn forwarded_request(
        &self,
        lease: &HostLease,
        exchange: &mut Exchange,
    ) -> Result<Request<Body>, GatewayError> {
        let uri = Self::forwarded_uri(lease, exchange)?;
        let mut headers = exchange.headers().clone();
        strip_hop_by_hop(&mut headers);
        if self.rewrite_host_header {
            rewrite_host(&mut headers, lease.host().authority());
        }

        let mut request = Request::new(exchange.take_request_body());
        *request.method_mut() = exchange.method().clone();
        *request.uri_mut() = uri;
        *request.version_mut() = Version::HTTP_11;
        *request.headers_mut() = headers;
        Ok(request)
    }
}

#[async_trait]
impl Stage for ProxyDispatcher {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        let mut lease = self.pool.acquire().await?;
        let request = self.forwarded_request(&lease, exchange)?;
        tracing::debug!(
            proxy = %self.name,
            backend = %request.uri(),
            "Forwarding request"
        );

        let response: axum::http::Response<Incoming> = match self.client.request(request).await {
            Ok(response) => response,
            Err(err) if err.is_connect() => {
                tracing::error!(proxy = %self.name, host = %lease.host(), error = %err, "Backend connection failed");
                self.pool.report_connect_failure(&mut lease);
                return Err(GatewayError::BackendUnavailable(self.name.clone()));
            }
            Err(err) => {
                tracing::error!(proxy = %self.name, host = %lease.host(), error = %err, "Upstream error");
                return Err(GatewayError::Upstream(err.to_string()));
            }
        };
        self.pool.report_success(&mut lease);

        let (mut parts, incoming) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);

        let target = exchange.response_mut();
        target.set_status(parts.status);
        target.headers_mut().extend(parts.headers);
        target.set_stream(guarded(Body::new(incoming), lease));
        Ok(Flow::Continue)
    }
}
