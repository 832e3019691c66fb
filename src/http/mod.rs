//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, admission)
//!     → request.rs (request id, request span)
//!     → routing table picks the pipeline, pipeline runs
//!     → static_files.rs (terminal stage of static mounts)
//!     → response.rs (error bodies)
//!     → body.rs (permit and lease ride along with the body)
//!     → Send to client
//! ```

pub mod body;
pub mod request;
pub mod response;
pub mod server;
pub mod static_files;

pub use request::X_REQUEST_ID;
pub use server::GatewayServer;
pub use static_files::StaticResourceHandler;
