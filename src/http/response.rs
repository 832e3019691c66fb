//! Error responses.
//!
//! # Responsibilities
//! - Render the JSON error body every failed request gets
//!
//! # Design Decisions
//! - One body shape for every error, whichever stage raised it
//! - The status description comes from the status code, never from the stage

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use serde_json::{json, Value};

/// JSON body describing an error.
pub fn error_body(status: StatusCode, message: &str) -> Value {
    json!({
        "http status code": status.as_u16(),
        "http status description": status.canonical_reason().unwrap_or("Unknown"),
        "message": message,
    })
}

/// Complete error response.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    let mut response = Response::new(Body::from(error_body(status, message).to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
