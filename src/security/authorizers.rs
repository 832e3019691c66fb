//! Authorizers: allowers grant access, vetoers take it away.

use axum::http::Method;

use crate::config::schema::{MethodVetoConfig, PermissionConfig};
use crate::exchange::Exchange;
use crate::routing::{MatchPolicy, PathMatcher};

/// Role matched by callers that did not authenticate.
pub const UNAUTHENTICATED_ROLE: &str = "$unauthenticated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizerType {
    Allower,
    Vetoer,
}

pub trait Authorizer: Send + Sync {
    fn authorizer_type(&self) -> AuthorizerType;

    fn is_allowed(&self, exchange: &Exchange) -> bool;
}

/// Allows every request, or every authenticated one.
pub struct FullAuthorizer {
    authentication_required: bool,
}

impl FullAuthorizer {
    pub fn new(authentication_required: bool) -> Self {
        Self {
            authentication_required,
        }
    }
}

impl Authorizer for FullAuthorizer {
    fn authorizer_type(&self) -> AuthorizerType {
        AuthorizerType::Allower
    }

    fn is_allowed(&self, exchange: &Exchange) -> bool {
        !self.authentication_required || exchange.is_authenticated()
    }
}

fn parse_methods(methods: &[String]) -> Vec<Method> {
    methods
        .iter()
        .filter_map(|m| match Method::from_bytes(m.to_ascii_uppercase().as_bytes()) {
            Ok(method) => Some(method),
            Err(_) => {
                tracing::warn!(method = %m, "Ignoring invalid HTTP method");
                None
            }
        })
        .collect()
}

fn path_matcher(path: &str) -> Option<PathMatcher> {
    match PathMatcher::new(path, MatchPolicy::Prefix) {
        Ok(matcher) => Some(matcher),
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "Ignoring invalid permission path");
            None
        }
    }
}

struct Permission {
    role: String,
    path: PathMatcher,
    /// Empty means every method.
    methods: Vec<Method>,
}

impl Permission {
    fn grants(&self, roles: &[&str], exchange: &Exchange) -> bool {
        roles.contains(&self.role.as_str())
            && self.path.matches(exchange.path())
            && (self.methods.is_empty() || self.methods.contains(exchange.method()))
    }
}

/// Grants requests by role, path prefix and method.
pub struct AclAuthorizer {
    permissions: Vec<Permission>,
}

impl AclAuthorizer {
    pub fn from_config(permissions: &[PermissionConfig]) -> Self {
        let permissions = permissions
            .iter()
            .filter_map(|p| {
                Some(Permission {
                    role: p.role.clone(),
                    path: path_matcher(&p.path)?,
                    methods: parse_methods(&p.methods),
                })
            })
            .collect();
        Self { permissions }
    }
}

impl Authorizer for AclAuthorizer {
    fn authorizer_type(&self) -> AuthorizerType {
        AuthorizerType::Allower
    }

    fn is_allowed(&self, exchange: &Exchange) -> bool {
        let roles: Vec<&str> = match exchange.account() {
            Some(account) => account.roles().iter().map(String::as_str).collect(),
            None => vec![UNAUTHENTICATED_ROLE],
        };
        self.permissions.iter().any(|p| p.grants(&roles, exchange))
    }
}

/// Forbids a set of methods under a path prefix.
pub struct MethodVetoer {
    path: Option<PathMatcher>,
    methods: Vec<Method>,
}

impl MethodVetoer {
    pub fn from_config(config: &MethodVetoConfig) -> Self {
        Self {
            path: path_matcher(&config.path),
            methods: parse_methods(&config.methods),
        }
    }
}

impl Authorizer for MethodVetoer {
    fn authorizer_type(&self) -> AuthorizerType {
        AuthorizerType::Vetoer
    }

    fn is_allowed(&self, exchange: &Exchange) -> bool {
        let Some(path) = &self.path else {
            return true;
        };
        !(path.matches(exchange.path()) && self.methods.contains(exchange.method()))
    }
}
