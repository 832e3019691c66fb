//! gatehouse: a pluggable HTTP gateway.
//!
//! Requests are resolved against a frozen routing table and handed to a
//! per-route pipeline that runs security, interceptors and a terminal
//! handler (a service, a reverse proxy or a static file mount).

pub mod config;
pub mod error;
pub mod exchange;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod plugins;
pub mod proxy;
pub mod routing;
pub mod security;
pub mod session;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use exchange::Exchange;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use routing::{PluginRegistry, RoutingTable};
