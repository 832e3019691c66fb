//! The response side of an exchange.

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;

use crate::error::GatewayError;
use crate::exchange::content::{read_content, ContentLimits};
use crate::http::response::error_body;

#[derive(Debug, Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Full(Bytes),
    Stream(Body),
}

/// Response under construction.
#[derive(Debug)]
pub struct ExchangeResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl Default for ExchangeResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }
}

impl ExchangeResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Buffered content, if the body is not a stream.
    pub fn content(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Full(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn set_content(&mut self, content: impl Into<Bytes>, content_type: &'static str) {
        self.headers.remove(CONTENT_LENGTH);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.body = ResponseBody::Full(content.into());
    }

    pub fn set_json(&mut self, status: StatusCode, value: &serde_json::Value) {
        self.status = status;
        self.set_content(value.to_string(), "application/json");
    }

    pub fn set_stream(&mut self, body: Body) {
        self.body = ResponseBody::Stream(body);
    }

    /// Replace the response with the error description of `err`.
    pub fn set_error(&mut self, err: &GatewayError) {
        let status = err.status();
        self.set_json(status, &error_body(status, &err.to_string()));
    }

    /// Read a streamed body into memory so it can be inspected.
    pub async fn buffer(&mut self, limits: ContentLimits) -> Result<(), GatewayError> {
        if let ResponseBody::Stream(body) = std::mem::take(&mut self.body) {
            let content = read_content(body, limits, None).await?;
            self.body = ResponseBody::Full(content.to_bytes());
            self.headers.remove(CONTENT_LENGTH);
        }
        Ok(())
    }

    pub fn into_response(self) -> Response {
        let body = match self.body {
            ResponseBody::Empty => Body::empty(),
            ResponseBody::Full(bytes) => Body::from(bytes),
            ResponseBody::Stream(body) => body,
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
