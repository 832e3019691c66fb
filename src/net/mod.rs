//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     listener.rs (bind the HTTP and HTTPS addresses)
//!     tls.rs (check certificate and key, build the rustls config)
//!
//! Per request:
//!     connection.rs (admission gate: requests-limit, draining)
//!     → Hand off to the HTTP layer
//! ```
//!
//! # Design Decisions
//! - Excess requests are rejected at once with 503, never queued
//! - The gate is shared by the HTTP and HTTPS listeners
//! - TLS material is checked before any listener is bound

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{Rejection, RequestGate, RequestPermit};
pub use listener::{bind_http, bind_https, ListenerError};
pub use tls::{load_tls_config, TlsError};
