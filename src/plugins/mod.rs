//! Plugin records and the built-in plugin set.
//!
//! # Responsibilities
//! - Wrap every plugin instance with its registration metadata
//! - Instantiate the built-in services and security plugins from config
//!
//! # Design Decisions
//! - Plugins are shared trait objects; records are cheap to clone
//! - Config overrides (`plugins-args.<name>`) are applied here, once, so
//!   the registry only sees final values

pub mod ping;
pub mod roles;
pub mod service;

use std::fmt;
use std::sync::Arc;

use crate::config::schema::GatewayConfig;
use crate::pipeline::Interceptor;
use crate::security::{
    AclAuthorizer, AuthMechanism, Authorizer, BasicAuthMechanism, FullAuthorizer,
    MethodVetoer, RandomTokenManager, TokenAuthMechanism, TokenManager,
};

pub use ping::PingService;
pub use roles::RolesService;
pub use service::{Service, ServiceHandler};

/// A plugin instance with its registration metadata.
pub struct PluginRecord<T: ?Sized> {
    name: String,
    description: String,
    enabled: bool,
    secured: bool,
    uri: Option<String>,
    instance: Arc<T>,
}

impl<T: ?Sized> PluginRecord<T> {
    pub fn new(name: impl Into<String>, instance: Arc<T>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            enabled: true,
            secured: false,
            uri: None,
            instance,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_secured(mut self, secured: bool) -> Self {
        self.secured = secured;
        self
    }

    pub fn with_uri(mut self, uri: Option<String>) -> Self {
        self.uri = uri;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_secured(&self) -> bool {
        self.secured
    }

    /// Configured URI, overriding the plugin's default.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn instance(&self) -> &Arc<T> {
        &self.instance
    }
}

impl<T: ?Sized> Clone for PluginRecord<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            enabled: self.enabled,
            secured: self.secured,
            uri: self.uri.clone(),
            instance: Arc::clone(&self.instance),
        }
    }
}

impl<T: ?Sized> fmt::Debug for PluginRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRecord")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("secured", &self.secured)
            .field("uri", &self.uri)
            .finish()
    }
}

/// Every plugin the gateway is started with.
#[derive(Clone, Default)]
pub struct PluginSet {
    pub services: Vec<PluginRecord<dyn Service>>,
    pub mechanisms: Vec<PluginRecord<dyn AuthMechanism>>,
    pub authorizers: Vec<PluginRecord<dyn Authorizer>>,
    pub token_manager: Option<PluginRecord<dyn TokenManager>>,
    pub interceptors: Vec<PluginRecord<dyn Interceptor>>,
}

impl PluginSet {
    /// Built-in plugins, configured from `config`.
    pub fn builtin(config: &GatewayConfig) -> Self {
        let mut set = PluginSet::default();

        set.services.push(configured(
            config,
            "ping",
            "Responds with a greeting",
            Arc::new(PingService::new(config.instance_name.clone())) as Arc<dyn Service>,
            true,
        ));
        set.services.push(configured(
            config,
            "roles",
            "Returns the roles of the authenticated account",
            Arc::new(RolesService) as Arc<dyn Service>,
            true,
        ));

        let token_manager = config.token_manager.enabled.then(|| {
            Arc::new(RandomTokenManager::new(std::time::Duration::from_secs(
                config.token_manager.ttl_minutes * 60,
            )))
        });
        if let Some(manager) = &token_manager {
            set.token_manager = Some(configured(
                config,
                "randomTokenManager",
                "Issues random auth tokens",
                manager.clone() as Arc<dyn TokenManager>,
                true,
            ));
            set.mechanisms.push(configured(
                config,
                "tokenAuthMechanism",
                "Authenticates with auth tokens",
                Arc::new(TokenAuthMechanism::new(manager.clone())) as Arc<dyn AuthMechanism>,
                true,
            ));
        }
        set.mechanisms.push(configured(
            config,
            "basicAuthMechanism",
            "HTTP basic authentication",
            Arc::new(BasicAuthMechanism::from_config(&config.users)) as Arc<dyn AuthMechanism>,
            true,
        ));

        if !config.acl.is_empty() {
            set.authorizers.push(configured(
                config,
                "aclAuthorizer",
                "Role based permissions",
                Arc::new(AclAuthorizer::from_config(&config.acl)) as Arc<dyn Authorizer>,
                true,
            ));
        }
        let full = config.plugin_args("fullAuthorizer");
        set.authorizers.push(configured(
            config,
            "fullAuthorizer",
            "Allows every request",
            Arc::new(FullAuthorizer::new(
                full.flag("authentication-required").unwrap_or(false),
            )) as Arc<dyn Authorizer>,
            false,
        ));
        for (index, veto) in config.method_vetoes.iter().enumerate() {
            set.authorizers.push(configured(
                config,
                &format!("methodVetoer-{index}"),
                "Refuses methods on a path",
                Arc::new(MethodVetoer::from_config(veto)) as Arc<dyn Authorizer>,
                true,
            ));
        }

        set
    }
}

fn configured<T: ?Sized>(
    config: &GatewayConfig,
    name: &str,
    description: &str,
    instance: Arc<T>,
    enabled_by_default: bool,
) -> PluginRecord<T> {
    let args = config.plugin_args(name);
    PluginRecord::new(name, instance)
        .with_description(description)
        .with_enabled(args.enabled.unwrap_or(enabled_by_default))
        .with_secured(args.secured.unwrap_or(false))
        .with_uri(args.uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{PermissionConfig, PluginArgs};

    #[test]
    fn test_builtin_defaults() {
        let set = PluginSet::builtin(&GatewayConfig::default());
        let services: Vec<&str> = set.services.iter().map(|s| s.name()).collect();
        assert_eq!(services, vec!["ping", "roles"]);
        assert!(set.token_manager.is_some());
        assert_eq!(set.mechanisms.len(), 2);
        assert_eq!(set.authorizers.len(), 1);
        assert!(!set.authorizers[0].is_enabled());
    }

    #[test]
    fn test_overrides_are_applied() {
        let mut config = GatewayConfig::default();
        config.plugins_args.insert(
            "ping".into(),
            PluginArgs {
                enabled: Some(false),
                uri: Some("/health".into()),
                ..Default::default()
            },
        );
        config.acl.push(PermissionConfig {
            role: "admin".into(),
            path: "/".into(),
            methods: vec![],
        });
        config.token_manager.enabled = false;

        let set = PluginSet::builtin(&config);
        assert!(!set.services[0].is_enabled());
        assert_eq!(set.services[0].uri(), Some("/health"));
        assert!(set.token_manager.is_none());
        assert_eq!(set.mechanisms.len(), 1);
        assert_eq!(set.authorizers[0].name(), "aclAuthorizer");
    }
}
