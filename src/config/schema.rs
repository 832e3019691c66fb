//! Configuration schema definitions.
//!
//! Keys are kebab-case in the TOML file. Every section has defaults, so an
//! empty file yields a gateway listening on plain HTTP with the built-in
//! services only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::loader::ConfigError;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GatewayConfig {
    /// Name reported by the ping service and in logs.
    pub instance_name: String,

    /// HTTP and HTTPS listeners.
    pub listener: ListenerConfig,

    /// Maximum number of requests processed concurrently.
    pub requests_limit: usize,

    /// Size of a single request content buffer, in bytes.
    pub buffer_size: usize,

    /// Maximum request content size, in bytes.
    pub max_content_size: usize,

    /// Upper bound on the time spent on a single request.
    pub request_timeout_secs: u64,

    /// Time granted to in-flight requests once shutdown starts.
    pub shutdown_timeout_secs: u64,

    pub logging: LoggingConfig,

    pub metrics: MetricsConfig,

    /// Reverse proxy entries, decoded individually by [`GatewayConfig::proxy_entries`].
    pub proxies: Vec<toml::Value>,

    /// Static file mounts.
    pub static_resources: Vec<StaticResourceConfig>,

    /// Per-plugin overrides, keyed by plugin name.
    pub plugins_args: BTreeMap<String, PluginArgs>,

    /// Accounts known to the basic authentication mechanism.
    pub users: Vec<UserConfig>,

    /// Permissions granted by the ACL authorizer.
    pub acl: Vec<PermissionConfig>,

    /// Method restrictions enforced by the method vetoer.
    pub method_vetoes: Vec<MethodVetoConfig>,

    pub token_manager: TokenManagerConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            instance_name: "default".to_string(),
            listener: ListenerConfig::default(),
            requests_limit: 100,
            buffer_size: 16 * 1024,
            max_content_size: 16 * 1024 * 1024,
            request_timeout_secs: 60,
            shutdown_timeout_secs: 60,
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            proxies: Vec::new(),
            static_resources: Vec::new(),
            plugins_args: BTreeMap::new(),
            users: Vec::new(),
            acl: Vec::new(),
            method_vetoes: Vec::new(),
            token_manager: TokenManagerConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Decode every proxy entry. Entries that do not match [`ProxyConfig`] are
    /// returned as errors in place.
    pub fn proxy_entries(&self) -> Vec<Result<ProxyConfig, ConfigError>> {
        self.proxies
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                raw.clone()
                    .try_into::<ProxyConfig>()
                    .map_err(|source| ConfigError::ProxyEntry { index, source })
            })
            .collect()
    }

    /// Append a proxy entry.
    pub fn add_proxy(&mut self, proxy: ProxyConfig) -> Result<(), ConfigError> {
        let value = toml::Value::try_from(proxy).map_err(ConfigError::Serialize)?;
        self.proxies.push(value);
        Ok(())
    }

    /// Arguments configured for `plugin`, or the empty set.
    pub fn plugin_args(&self, plugin: &str) -> PluginArgs {
        self.plugins_args.get(plugin).cloned().unwrap_or_default()
    }

    /// Render the effective configuration.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ListenerConfig {
    pub http_listener: bool,
    pub http_host: String,
    pub http_port: u16,

    pub https_listener: bool,
    pub https_host: String,
    pub https_port: u16,

    /// Certificate and key for the HTTPS listener.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http_listener: true,
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            https_listener: false,
            https_host: "0.0.0.0".to_string(),
            https_port: 4443,
            tls: None,
        }
    }
}

impl ListenerConfig {
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn https_address(&self) -> String {
        format!("{}:{}", self.https_host, self.https_port)
    }
}

/// TLS configuration for the HTTPS listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,
    /// Path to private key file (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub log_level: String,

    pub log_format: LogFormat,

    /// 0 disables request logging, 1 logs one line per request, 2 adds headers.
    pub log_exchange_dump: u8,

    /// Request headers copied into the log context and echoed on the response.
    pub requests_log_trace_headers: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            log_exchange_dump: 1,
            requests_log_trace_headers: Vec::new(),
        }
    }
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// The `proxy-pass` value: one backend URI or a list of them.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ProxyPass {
    One(String),
    Many(Vec<toml::Value>),
}

impl ProxyPass {
    /// Split the value into string entries and entries of any other type.
    pub fn partition(&self) -> (Vec<String>, Vec<String>) {
        match self {
            ProxyPass::One(uri) => (vec![uri.clone()], Vec::new()),
            ProxyPass::Many(values) => {
                let mut uris = Vec::new();
                let mut invalid = Vec::new();
                for value in values {
                    match value.as_str() {
                        Some(uri) => uris.push(uri.to_string()),
                        None => invalid.push(value.to_string()),
                    }
                }
                (uris, invalid)
            }
        }
    }
}

/// One reverse proxy entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// Path prefix the proxy is bound to.
    pub location: Option<String>,

    /// Backend base URI(s).
    pub proxy_pass: Option<ProxyPass>,

    /// Defaults to the location.
    pub name: Option<String>,

    pub connections_per_thread: usize,

    /// 0 means unbounded.
    pub max_queue_size: usize,

    pub soft_max_connections_per_thread: usize,

    /// Idle connection lifetime in seconds; negative means no limit.
    pub connections_ttl: i64,

    pub rewrite_host_header: bool,

    /// Seconds before a problem backend host is tried again.
    pub problem_server_retry: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            location: None,
            proxy_pass: None,
            name: None,
            connections_per_thread: 10,
            max_queue_size: 0,
            soft_max_connections_per_thread: 5,
            connections_ttl: -1,
            rewrite_host_header: true,
            problem_server_retry: 10,
        }
    }
}

/// One static file mount.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StaticResourceConfig {
    /// Directory served.
    pub what: String,

    /// Path the directory is mounted at.
    #[serde(rename = "where")]
    pub mount: String,

    #[serde(default = "default_welcome_file")]
    pub welcome_file: String,
}

fn default_welcome_file() -> String {
    "index.html".to_string()
}

/// Overrides applied to a plugin's registration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct PluginArgs {
    pub enabled: Option<bool>,
    pub secured: Option<bool>,
    pub uri: Option<String>,

    /// Plugin specific arguments.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl PluginArgs {
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.extra.get(key).and_then(|v| v.as_bool())
    }
}

/// An account for the basic authentication mechanism.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserConfig {
    pub userid: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A permission granted to a role on a path prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PermissionConfig {
    pub role: String,
    pub path: String,
    /// Empty means every method.
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Methods refused on a path prefix, whoever the caller is.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MethodVetoConfig {
    pub path: String,
    pub methods: Vec<String>,
}

/// Auth token issuing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TokenManagerConfig {
    pub enabled: bool,
    pub ttl_minutes: u64,
}

impl Default for TokenManagerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_minutes: 15,
        }
    }
}
