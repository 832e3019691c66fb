//! Route registration.
//!
//! # Responsibilities
//! - Validate patterns and plugin metadata
//! - Build the pipeline of every route
//! - Reject registrations once the table is frozen
//!
//! # Design Decisions
//! - Configuration problems skip the entry with a log line, never abort
//! - Duplicate exact patterns are errors; a duplicate prefix is shadowed
//!   by the first registration

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::Uri;
use thiserror::Error;

use crate::config::{ConfigError, ProxyConfig, StaticResourceConfig};
use crate::http::static_files::StaticResourceHandler;
use crate::load_balancer::{BackendHost, HostPool};
use crate::pipeline::{Pipeline, PipelineFactory, PipelineInfo};
use crate::plugins::{PluginRecord, Service, ServiceHandler};
use crate::proxy::{ProxyDispatcher, ProxyOptions};
use crate::routing::{MatchPolicy, PathMatcher, Route, RouteKind, RoutingTable};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid pattern {0:?}, patterns must start with /")]
    InvalidPattern(String),

    #[error("routing table is frozen")]
    Frozen,

    #[error("pattern {0} is already bound")]
    Duplicate(String),

    #[error("plugin {0} has no uri")]
    MissingUri(String),

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("invalid backend {uri}: {reason}")]
    InvalidBackend { uri: String, reason: String },

    #[error("proxy {0} has no valid backend")]
    NoBackends(String),

    #[error("directory {0} not found")]
    MissingDirectory(PathBuf),
}

/// Collects routes at startup, then freezes them into a [`RoutingTable`].
pub struct PluginRegistry {
    factory: PipelineFactory,
    exact: HashMap<String, Arc<Route>>,
    prefixes: Vec<Arc<Route>>,
    frozen: Option<Arc<RoutingTable>>,
}

impl PluginRegistry {
    pub fn new(factory: PipelineFactory) -> Self {
        Self {
            factory,
            exact: HashMap::new(),
            prefixes: Vec::new(),
            frozen: None,
        }
    }

    /// Bind a pipeline to a pattern.
    pub fn register(
        &mut self,
        pattern: &str,
        policy: MatchPolicy,
        pipeline: Arc<Pipeline>,
        kind: RouteKind,
        secured: bool,
        name: &str,
    ) -> Result<(), RegistryError> {
        if self.frozen.is_some() {
            return Err(RegistryError::Frozen);
        }
        let matcher = PathMatcher::new(pattern, policy)?;
        let pattern = matcher.pattern().to_string();
        let route = Arc::new(Route::new(matcher, name, kind, secured, pipeline));

        match policy {
            MatchPolicy::Exact => {
                if self.exact.contains_key(&pattern) {
                    return Err(RegistryError::Duplicate(pattern));
                }
                self.exact.insert(pattern.clone(), route);
            }
            MatchPolicy::Prefix => {
                if let Some(first) = self.prefixes.iter().find(|r| r.pattern() == pattern) {
                    tracing::warn!(
                        pattern = %pattern,
                        bound_to = %first.name(),
                        ignored = %name,
                        "Prefix already bound, later registration is shadowed"
                    );
                    return Ok(());
                }
                self.prefixes.push(route);
            }
        }

        tracing::info!(
            pattern = %pattern,
            policy = ?policy,
            kind = ?kind,
            name = %name,
            secured,
            "URI bound"
        );
        Ok(())
    }

    /// Bind a service plugin at its configured or default uri.
    pub fn register_service(&mut self, record: &PluginRecord<dyn Service>) -> Result<(), RegistryError> {
        if !record.is_enabled() {
            tracing::debug!(plugin = %record.name(), "Service disabled");
            return Ok(());
        }
        let service = record.instance().clone();
        let uri = record
            .uri()
            .or_else(|| service.default_uri())
            .map(str::to_string)
            .ok_or_else(|| RegistryError::MissingUri(record.name().to_string()))?;
        let policy = service.match_policy();
        let matcher = PathMatcher::new(&uri, policy)?;
        tracing::debug!(
            plugin = %record.name(),
            description = %record.description(),
            uri = %uri,
            "Registering service"
        );

        let info = PipelineInfo {
            kind: RouteKind::Service,
            pattern: matcher.pattern().to_string(),
            name: record.name().to_string(),
            secured: record.is_secured(),
        };
        let requires_content = service.requires_content();
        let pipeline = self
            .factory
            .service(info, Arc::new(ServiceHandler::new(service)), requires_content);

        self.register(
            &uri,
            policy,
            Arc::new(pipeline),
            RouteKind::Service,
            record.is_secured(),
            record.name(),
        )
    }

    /// Bind a reverse proxy. Proxied routes are always secured.
    pub fn register_proxy(
        &mut self,
        location: &str,
        name: &str,
        backends: &[String],
        options: &ProxyOptions,
    ) -> Result<(), RegistryError> {
        let matcher = PathMatcher::new(location, MatchPolicy::Prefix)?;

        let mut hosts = Vec::with_capacity(backends.len());
        for uri in backends {
            match parse_backend(uri, options.max_connections_per_host()) {
                Ok(host) => hosts.push(Arc::new(host)),
                Err(err) => tracing::warn!(proxy = %name, error = %err, "Skipping backend"),
            }
        }
        if hosts.is_empty() {
            return Err(RegistryError::NoBackends(name.to_string()));
        }

        let uris: Vec<String> = hosts.iter().map(|h| h.to_string()).collect();
        let pool = Arc::new(HostPool::new(name, hosts, options.pool_options()));
        let dispatcher = Arc::new(ProxyDispatcher::new(name, pool, options));
        let info = PipelineInfo {
            kind: RouteKind::Proxy,
            pattern: matcher.pattern().to_string(),
            name: name.to_string(),
            secured: true,
        };
        let pipeline = self.factory.proxy(info, dispatcher);

        self.register(
            location,
            MatchPolicy::Prefix,
            Arc::new(pipeline),
            RouteKind::Proxy,
            true,
            name,
        )?;
        tracing::info!(proxy = %name, backends = ?uris, "Proxy backends");
        Ok(())
    }

    /// Mount a directory.
    pub fn register_static(
        &mut self,
        mount: &str,
        directory: &Path,
        welcome_file: &str,
    ) -> Result<(), RegistryError> {
        let matcher = PathMatcher::new(mount, MatchPolicy::Prefix)?;
        if !directory.is_dir() {
            return Err(RegistryError::MissingDirectory(directory.to_path_buf()));
        }

        let name = directory.display().to_string();
        let handler = StaticResourceHandler::new(directory, matcher.pattern(), welcome_file);
        let info = PipelineInfo {
            kind: RouteKind::Static,
            pattern: matcher.pattern().to_string(),
            name: name.clone(),
            secured: false,
        };
        let pipeline = self.factory.static_resources(info, Arc::new(handler));

        self.register(
            mount,
            MatchPolicy::Prefix,
            Arc::new(pipeline),
            RouteKind::Static,
            false,
            &name,
        )
    }

    pub fn plug_services(&mut self, services: &[PluginRecord<dyn Service>]) {
        for record in services {
            if let Err(err) = self.register_service(record) {
                tracing::error!(plugin = %record.name(), error = %err, "Service not bound");
            }
        }
    }

    pub fn plug_proxies(&mut self, entries: Vec<Result<ProxyConfig, ConfigError>>) {
        for entry in entries {
            match entry {
                Ok(proxy) => {
                    if let Err(err) = self.plug_proxy(&proxy) {
                        tracing::warn!(location = ?proxy.location, error = %err, "Skipping proxy entry");
                    }
                }
                Err(err) => tracing::warn!(error = %err, "Skipping proxy entry"),
            }
        }
    }

    fn plug_proxy(&mut self, proxy: &ProxyConfig) -> Result<(), RegistryError> {
        let location = proxy
            .location
            .as_deref()
            .ok_or(RegistryError::MissingField("location"))?;
        let pass = proxy
            .proxy_pass
            .as_ref()
            .ok_or(RegistryError::MissingField("proxy-pass"))?;
        let name = proxy.name.as_deref().unwrap_or(location);

        let (uris, invalid) = pass.partition();
        for value in invalid {
            tracing::warn!(proxy = %name, value = %value, "Ignoring non string backend");
        }
        self.register_proxy(location, name, &uris, &ProxyOptions::from(proxy))
    }

    pub fn plug_static_resources(&mut self, mounts: &[StaticResourceConfig]) {
        for mount in mounts {
            let directory = Path::new(&mount.what);
            if let Err(err) = self.register_static(&mount.mount, directory, &mount.welcome_file) {
                tracing::error!(
                    mount = %mount.mount,
                    what = %mount.what,
                    error = %err,
                    "Static resources not bound"
                );
            }
        }
    }

    /// Build the immutable routing table. Later registrations fail.
    pub fn freeze(&mut self) -> Arc<RoutingTable> {
        if let Some(table) = &self.frozen {
            return table.clone();
        }
        let table = Arc::new(RoutingTable::new(
            std::mem::take(&mut self.exact),
            std::mem::take(&mut self.prefixes),
            Arc::new(self.factory.not_managed()),
        ));
        self.frozen = Some(table.clone());
        table
    }
}

fn parse_backend(uri: &str, max_connections: usize) -> Result<BackendHost, RegistryError> {
    let parsed: Uri = uri.parse().map_err(|e: axum::http::uri::InvalidUri| {
        RegistryError::InvalidBackend {
            uri: uri.to_string(),
            reason: e.to_string(),
        }
    })?;
    BackendHost::new(parsed, max_connections).map_err(|e| RegistryError::InvalidBackend {
        uri: uri.to_string(),
        reason: e.to_string(),
    })
}
