//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build the security chain, pipelines and the frozen routing table
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: an invalid config or missing TLS material aborts before any
//!   listener is bound
//! - Bad route entries are not fatal; the registry logs and skips them
//! - Every listener is bound before any of them serves; one failed bind
//!   aborts startup with nothing served

use std::sync::Arc;

use thiserror::Error;

use crate::config::{validate_config, ConfigError, GatewayConfig};
use crate::http::GatewayServer;
use crate::lifecycle::Shutdown;
use crate::net::{bind_http, bind_https, load_tls_config, ListenerError, TlsError};
use crate::pipeline::{InterceptorRegistry, PipelineFactory, RequestLogSettings};
use crate::plugins::PluginSet;
use crate::routing::{PluginRegistry, RoutingTable};
use crate::security::SecurityChain;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("https-listener is enabled but no tls section is configured")]
    MissingTls,

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build every route from the config and the plugin set.
pub fn build_routes(config: &GatewayConfig, plugins: &PluginSet) -> Arc<RoutingTable> {
    let security = Arc::new(SecurityChain::new(
        plugins.mechanisms.clone(),
        plugins.authorizers.clone(),
        plugins.token_manager.clone(),
    ));
    let interceptors = Arc::new(InterceptorRegistry::new(plugins.interceptors.clone()));
    let factory = PipelineFactory::new(
        security,
        interceptors,
        RequestLogSettings::from(&config.logging),
    );

    let mut registry = PluginRegistry::new(factory);
    registry.plug_services(&plugins.services);
    registry.plug_proxies(config.proxy_entries());
    registry.plug_static_resources(&config.static_resources);

    let table = registry.freeze();
    tracing::info!(routes = table.len(), "Routing table ready");
    table
}

/// Start the gateway and serve until `shutdown` fires.
pub async fn run(
    config: GatewayConfig,
    plugins: PluginSet,
    shutdown: Arc<Shutdown>,
) -> Result<(), StartupError> {
    validate_config(&config).map_err(ConfigError::Validation)?;

    let tls = if config.listener.https_listener {
        let tls = config.listener.tls.as_ref().ok_or(StartupError::MissingTls)?;
        Some(load_tls_config(tls).await?)
    } else {
        None
    };

    let routes = build_routes(&config, &plugins);
    let server = GatewayServer::new(&config, routes);
    let http = bind_http(&config.listener).await?;
    let https = match (bind_https(&config.listener)?, tls) {
        (Some(listener), Some(tls)) => Some((listener, tls)),
        _ => None,
    };

    tracing::info!(
        instance = %config.instance_name,
        requests_limit = config.requests_limit,
        "Gateway started"
    );

    let http_server = {
        let server = server.clone();
        let signal = shutdown.subscribe();
        async move {
            match http {
                Some(listener) => server.run(listener, signal).await,
                None => Ok(()),
            }
        }
    };
    let https_server = {
        let signal = shutdown.subscribe();
        async move {
            match https {
                Some((listener, tls)) => server.run_tls(listener, tls, signal).await,
                None => Ok(()),
            }
        }
    };

    let (http_result, https_result) = tokio::join!(http_server, https_server);
    http_result?;
    https_result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
