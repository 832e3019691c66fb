//! Per-request state shared by every pipeline stage.
//!
//! # Responsibilities
//! - Hold the request (method, URI, headers, content) and the response being built
//! - Carry the attachments stages hand to each other: pipeline info, account,
//!   relative path, error flag, trace values
//! - Own the request content buffers and release them when the request ends
//!
//! # Data Flow
//! ```text
//! hyper Request → Exchange::new
//!     → stages mutate it in order
//!     → Exchange::into_response → hyper Response
//! ```

pub mod account;
pub mod content;
pub mod response;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::header::CONTENT_LENGTH;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, Method, Uri, Version};
use axum::response::Response;
use bytes::Bytes;

use crate::error::GatewayError;
use crate::http::request::X_REQUEST_ID;
use crate::pipeline::PipelineInfo;

pub use account::Account;
pub use content::{ContentBuffers, ContentLimits};
pub use response::{ExchangeResponse, ResponseBody};

#[derive(Debug)]
enum RequestContent {
    /// Not read yet.
    Pending(Body),
    Buffered(ContentBuffers),
    /// Handed to a backend or released.
    Released,
}

/// A request/response pair flowing through a pipeline.
#[derive(Debug)]
pub struct Exchange {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    client_addr: Option<SocketAddr>,
    request_id: String,
    started: Instant,
    limits: ContentLimits,
    content: RequestContent,
    query: Vec<(String, String)>,
    relative_path: String,
    pipeline_info: Option<PipelineInfo>,
    account: Option<Account>,
    in_error: bool,
    response_interceptors_executed: bool,
    trace_values: Vec<(String, String)>,
    response: ExchangeResponse,
}

impl Exchange {
    pub fn new(request: Request, limits: ContentLimits) -> Self {
        let (parts, body) = request.into_parts();
        let client_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let query = parts
            .uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let relative_path = parts.uri.path().to_string();

        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            client_addr,
            request_id,
            started: Instant::now(),
            limits,
            content: RequestContent::Pending(body),
            query,
            relative_path,
            pipeline_info: None,
            account: None,
            in_error: false,
            response_interceptors_executed: false,
            trace_values: Vec::new(),
            response: ExchangeResponse::default(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn limits(&self) -> ContentLimits {
        self.limits
    }

    // --- Query string ---

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn query_params_mut(&mut self) -> &mut Vec<(String, String)> {
        &mut self.query
    }

    /// Write the query parameters back into the request URI.
    pub fn rebuild_query_string(&mut self) -> Result<(), GatewayError> {
        let path = self.uri.path();
        let path_and_query = if self.query.is_empty() {
            path.to_string()
        } else {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.query.iter())
                .finish();
            format!("{path}?{query}")
        };
        if self.uri.path_and_query().map(PathAndQuery::as_str) == Some(path_and_query.as_str()) {
            return Ok(());
        }

        let mut parts = self.uri.clone().into_parts();
        parts.path_and_query = Some(
            path_and_query
                .parse()
                .map_err(|e| GatewayError::Internal(format!("invalid query string: {e}")))?,
        );
        self.uri = Uri::from_parts(parts)
            .map_err(|e| GatewayError::Internal(format!("invalid request uri: {e}")))?;
        Ok(())
    }

    // --- Attachments ---

    /// Request path with the matched route pattern removed.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn set_relative_path(&mut self, relative_path: impl Into<String>) {
        self.relative_path = relative_path.into();
    }

    pub fn pipeline_info(&self) -> Option<&PipelineInfo> {
        self.pipeline_info.as_ref()
    }

    pub fn set_pipeline_info(&mut self, info: PipelineInfo) {
        self.pipeline_info = Some(info);
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn set_account(&mut self, account: Account) {
        self.account = Some(account);
    }

    pub fn is_authenticated(&self) -> bool {
        self.account.is_some()
    }

    pub fn in_error(&self) -> bool {
        self.in_error
    }

    /// Flag the exchange as failed and replace the response with the error.
    pub fn set_in_error(&mut self, err: &GatewayError) {
        self.in_error = true;
        self.response.set_error(err);
    }

    pub fn response_interceptors_executed(&self) -> bool {
        self.response_interceptors_executed
    }

    pub fn mark_response_interceptors_executed(&mut self) {
        self.response_interceptors_executed = true;
    }

    pub fn trace_values(&self) -> &[(String, String)] {
        &self.trace_values
    }

    pub fn add_trace_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.trace_values.push((name.into(), value.into()));
    }

    // --- Request content ---

    fn declared_len(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Read the request content into buffers. Reading twice is a no-op.
    pub async fn read_content(&mut self) -> Result<(), GatewayError> {
        let declared = self.declared_len();
        if let RequestContent::Pending(body) =
            std::mem::replace(&mut self.content, RequestContent::Released)
        {
            let buffers = content::read_content(body, self.limits, declared).await?;
            self.content = RequestContent::Buffered(buffers);
        }
        Ok(())
    }

    pub fn is_content_available(&self) -> bool {
        matches!(self.content, RequestContent::Buffered(_))
    }

    /// Copy of the buffered content.
    pub fn content(&self) -> Option<Bytes> {
        match &self.content {
            RequestContent::Buffered(buffers) => Some(buffers.to_bytes()),
            _ => None,
        }
    }

    /// Take the request body, buffered or not, for forwarding.
    pub fn take_request_body(&mut self) -> Body {
        match std::mem::replace(&mut self.content, RequestContent::Released) {
            RequestContent::Pending(body) => body,
            RequestContent::Buffered(buffers) => buffers.into_body(),
            RequestContent::Released => Body::empty(),
        }
    }

    /// Drop any buffered content.
    pub fn release_content(&mut self) {
        if let RequestContent::Buffered(_) = self.content {
            self.content = RequestContent::Released;
        }
    }

    // --- Response ---

    pub fn response(&self) -> &ExchangeResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ExchangeResponse {
        &mut self.response
    }

    pub fn into_response(self) -> Response {
        self.response.into_response()
    }
}
