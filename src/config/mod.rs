//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors collected)
//!     → GatewayConfig (validated, immutable)
//!     → read once at startup to build plugins and routes
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the routing table built from it is frozen
//! - All fields have defaults to allow minimal configs
//! - Proxy entries are kept as raw TOML values and decoded one by one, so a
//!   malformed entry only drops its own route

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    GatewayConfig, ListenerConfig, LogFormat, LoggingConfig, MethodVetoConfig, MetricsConfig,
    PermissionConfig, PluginArgs, ProxyConfig, ProxyPass, StaticResourceConfig, TlsConfig,
    TokenManagerConfig, UserConfig,
};
pub use validation::{validate_config, ValidationError};
