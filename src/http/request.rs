//! Request identification.
//!
//! # Responsibilities
//! - Give every request a unique id as early as possible
//! - Open the tracing span the rest of the request is logged under
//!
//! # Design Decisions
//! - Ids are UUID v4 from tower-http's `MakeRequestUuid`; a client supplied
//!   `x-request-id` is kept as is
//! - The span declares an empty `trace` field that is filled once the
//!   configured trace headers have been read

use axum::extract::Request;
use axum::http::HeaderName;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::Span;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer assigning request ids.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

/// Layer copying the request id onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// Span wrapping the handling of one request.
pub fn request_span(request: &Request) -> Span {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
        trace = tracing::field::Empty,
    )
}
