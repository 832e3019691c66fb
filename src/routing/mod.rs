//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     services, proxies, static mounts
//!     → registry.rs (validate pattern, build pipeline, register)
//!     → freeze → immutable RoutingTable
//!
//! Per request:
//!     path → router.rs (exact map, then prefixes longest first)
//!     → Matched(route) or NotFound (fallback pipeline)
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (exact map plus segment-aware prefix scan)
//! - Deterministic: the longest matching prefix wins whatever the
//!   registration order; ties keep registration order
//! - Explicit NotFound rather than silent default

pub mod matcher;
pub mod registry;
pub mod router;

pub use matcher::{MatchPolicy, PathMatcher};
pub use registry::{PluginRegistry, RegistryError};
pub use router::{Resolution, Route, RouteKind, RoutingTable};
