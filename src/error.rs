//! Request-level errors.
//!
//! Every stage of a pipeline reports failures through [`GatewayError`]. The
//! pipeline driver turns the error into the exchange's error response, so a
//! stage never writes error bodies itself.

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::response::error_response;

/// Errors surfaced to clients while handling a request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No route and no fallback resource matched the path.
    #[error("no resource bound to {0}")]
    NotFound(String),

    /// The request body is larger than `max-content-size`.
    #[error("request content exceeds the limit of {limit} bytes")]
    ContentTooLarge { limit: usize },

    /// The request body could not be read or decoded.
    #[error("malformed request content: {0}")]
    MalformedContent(String),

    /// Credentials are missing or wrong.
    #[error("authentication required")]
    Authentication,

    /// The caller is known but not allowed.
    #[error("forbidden")]
    Authorization,

    /// Every backend host of a proxy is marked as a problem.
    #[error("no backend available for {0}")]
    BackendUnavailable(String),

    /// The proxy's wait queue is full.
    #[error("too many requests queued for {0}")]
    QueueFull(String),

    /// The backend could not be reached or the exchange with it failed.
    #[error("backend request failed: {0}")]
    Upstream(String),

    /// The method is not one the gateway serves.
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    /// The gateway refused the request before routing it.
    #[error("request rejected: {0}")]
    Rejected(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status code reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::ContentTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::MalformedContent(_) => StatusCode::BAD_REQUEST,
            GatewayError::Authentication => StatusCode::UNAUTHORIZED,
            GatewayError::Authorization => StatusCode::FORBIDDEN,
            GatewayError::BackendUnavailable(_) | GatewayError::Upstream(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::QueueFull(_) | GatewayError::Rejected(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::NotFound(_) => "not_found",
            GatewayError::ContentTooLarge { .. } => "content_too_large",
            GatewayError::MalformedContent(_) => "malformed_content",
            GatewayError::Authentication => "authentication",
            GatewayError::Authorization => "authorization",
            GatewayError::BackendUnavailable(_) => "backend_unavailable",
            GatewayError::QueueFull(_) => "queue_full",
            GatewayError::Upstream(_) => "upstream",
            GatewayError::MethodNotAllowed(_) => "method_not_allowed",
            GatewayError::Rejected(_) => "rejected",
            GatewayError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        error_response(self.status(), &self.to_string())
    }
}
