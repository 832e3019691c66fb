//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy route matched → its HostPool
//!     → pool.rs (due problem host? claim one probe)
//!     → round_robin.rs (healthy host with the largest free budget)
//!     → backend.rs (claim a connection slot, RAII lease)
//!     → all busy: wait in the bounded queue until a lease is released
//! ```
//!
//! # Design Decisions
//! - Load balancer is stateless apart from its cursor; hosts track connections
//! - Budgets are per host, not per worker thread
//! - Problem hosts are excluded until their retry delay elapses, then get
//!   exactly one probe request
//! - Failures are reported by the caller; the pool never retries a request

pub mod backend;
pub mod pool;
pub mod round_robin;

use std::sync::Arc;

pub use backend::{BackendHost, BackendUriError, HostLease, HostState};
pub use pool::{HostPool, PoolOptions};
pub use round_robin::BudgetRoundRobin;

/// Picks the next host among the healthy ones.
pub trait LoadBalancer: Send + Sync {
    fn next_host(&self, hosts: &[Arc<BackendHost>]) -> Option<Arc<BackendHost>>;
}
