//! Static resource mounts.
//!
//! # Responsibilities
//! - Serve files below a mount point from a directory
//! - Answer the welcome file for directory requests
//!
//! # Design Decisions
//! - File access, content types, ranges and conditional requests are left
//!   to tower-http's `ServeDir`
//! - The mount prefix is stripped before the path reaches `ServeDir` and put
//!   back on redirects

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, Request};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::error::GatewayError;
use crate::exchange::Exchange;
use crate::pipeline::{Flow, Stage};

/// Terminal stage of a static resources pipeline.
pub struct StaticResourceHandler {
    root: PathBuf,
    mount: String,
    welcome_file: String,
}

impl StaticResourceHandler {
    pub fn new(root: impl AsRef<Path>, mount: &str, welcome_file: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            mount: mount.trim_end_matches('/').to_string(),
            welcome_file: welcome_file.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path handed to `ServeDir`.
    fn file_path(&self, relative: &str) -> String {
        if relative.is_empty() || relative == "/" {
            format!("/{}", self.welcome_file)
        } else if relative.ends_with('/') {
            format!("{relative}{}", self.welcome_file)
        } else {
            relative.to_string()
        }
    }
}

#[async_trait]
impl Stage for StaticResourceHandler {
    fn name(&self) -> &'static str {
        "static-resources"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        let path = self.file_path(exchange.relative_path());
        let mut request = Request::new(Body::empty());
        *request.method_mut() = exchange.method().clone();
        *request.uri_mut() = path
            .parse()
            .map_err(|_| GatewayError::NotFound(exchange.path().to_string()))?;
        *request.headers_mut() = exchange.headers().clone();

        let response = match ServeDir::new(&self.root).oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let (mut parts, body) = response.into_parts();

        if parts.status.is_redirection() {
            let location = parts
                .headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|location| format!("{}{}", self.mount, location));
            if let Some(value) = location.and_then(|l| HeaderValue::from_str(&l).ok()) {
                parts.headers.insert(LOCATION, value);
            }
        }

        let target = exchange.response_mut();
        target.set_status(parts.status);
        target.headers_mut().extend(parts.headers);
        target.set_stream(Body::new(body));
        Ok(Flow::Continue)
    }
}
