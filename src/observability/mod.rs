//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request span (http/request.rs) and pipeline stages:
//!     → logging.rs (tracing-subscriber: EnvFilter + pretty or JSON output)
//!     → metrics.rs (request counts and latency, backend problems, rejections)
//!
//! Outputs:
//!     → stdout
//!     → Prometheus listener, when [metrics] is enabled
//! ```
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured log level
//! - Trace headers are recorded on the request span, not repeated per event
//! - Recording a metric without an exporter installed costs nothing

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
