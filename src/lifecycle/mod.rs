//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! startup.rs:
//!     validate config → load TLS material → build plugins and the frozen
//!     routing table → bind HTTP and HTTPS listeners
//!
//! shutdown.rs:
//!     trigger → every server closes its request gate → in-flight requests
//!     drain up to shutdown-timeout-secs → leftovers are terminated (503)
//!
//! signals.rs:
//!     first SIGINT/SIGTERM triggers shutdown, a second one exits
//! ```
//!
//! # Design Decisions
//! - Nothing is bound before the configuration and TLS material are known good
//! - One broadcast reaches both listeners

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::spawn_signal_listener;
pub use startup::{build_routes, run, StartupError};
