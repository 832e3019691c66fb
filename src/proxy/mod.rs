//! Reverse proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy pipeline terminal stage
//!     → dispatcher.rs (lease a host from the route's HostPool)
//!     → headers.rs (strip hop-by-hop headers, rewrite Host)
//!     → hyper client round trip
//!     → response streamed back while the lease is held
//! ```
//!
//! # Design Decisions
//! - One pool and one client per proxy route
//! - The request body is forwarded as a stream; buffered content is
//!   handed over, never copied
//! - No retries: a failed connect marks the host and answers 502

pub mod dispatcher;
pub mod headers;

use std::time::Duration;

pub use dispatcher::ProxyDispatcher;

use crate::config::ProxyConfig;
use crate::load_balancer::PoolOptions;

/// Connection options of one proxy route.
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub connections_per_thread: usize,
    pub soft_max_connections_per_thread: usize,
    pub max_queue_size: usize,
    /// Idle connection lifetime; `None` keeps idle connections forever.
    pub connections_ttl: Option<Duration>,
    pub rewrite_host_header: bool,
    pub problem_server_retry: Duration,
}

impl ProxyOptions {
    /// Requests admitted per host at once.
    pub fn max_connections_per_host(&self) -> usize {
        self.soft_max_connections_per_thread
            .min(self.connections_per_thread)
            .max(1)
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections_per_host: self.max_connections_per_host(),
            max_queue_size: self.max_queue_size,
            problem_retry: self.problem_server_retry,
        }
    }
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for ProxyOptions {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            connections_per_thread: config.connections_per_thread,
            soft_max_connections_per_thread: config.soft_max_connections_per_thread,
            max_queue_size: config.max_queue_size,
            connections_ttl: (config.connections_ttl > 0)
                .then(|| Duration::from_secs(config.connections_ttl as u64)),
            rewrite_host_header: config.rewrite_host_header,
            problem_server_retry: Duration::from_secs(config.problem_server_retry),
        }
    }
}
