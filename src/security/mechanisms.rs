//! Authentication mechanisms.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderValue;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use subtle::ConstantTimeEq;

use crate::config::schema::UserConfig;
use crate::exchange::{Account, Exchange};
use crate::security::TokenManager;

/// Result of one mechanism looking at a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(Account),
    /// The request carries no credentials for this mechanism.
    NotAttempted,
    /// Credentials were present and wrong.
    Failed,
}

#[async_trait]
pub trait AuthMechanism: Send + Sync {
    async fn authenticate(&self, exchange: &mut Exchange) -> AuthOutcome;

    /// `WWW-Authenticate` value sent when authentication is required.
    fn challenge(&self) -> Option<HeaderValue> {
        None
    }
}

/// Credentials of the `Authorization` header for `scheme`, if present.
fn credentials<'a>(exchange: &'a Exchange, scheme: &str) -> Option<&'a str> {
    let value = exchange.header(AUTHORIZATION.as_str())?;
    let (given, rest) = value.split_once(' ')?;
    given.eq_ignore_ascii_case(scheme).then(|| rest.trim())
}

struct User {
    password: String,
    roles: Vec<String>,
}

/// HTTP basic authentication against the configured users.
pub struct BasicAuthMechanism {
    users: HashMap<String, User>,
}

impl BasicAuthMechanism {
    pub fn from_config(users: &[UserConfig]) -> Self {
        let users = users
            .iter()
            .map(|u| {
                (
                    u.userid.clone(),
                    User {
                        password: u.password.clone(),
                        roles: u.roles.clone(),
                    },
                )
            })
            .collect();
        Self { users }
    }

    fn verify(&self, encoded: &str) -> AuthOutcome {
        let Ok(decoded) = BASE64.decode(encoded) else {
            return AuthOutcome::Failed;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return AuthOutcome::Failed;
        };
        let Some((userid, password)) = decoded.split_once(':') else {
            return AuthOutcome::Failed;
        };
        match self.users.get(userid) {
            Some(user) if bool::from(user.password.as_bytes().ct_eq(password.as_bytes())) => {
                AuthOutcome::Authenticated(Account::new(userid, user.roles.iter().cloned()))
            }
            _ => {
                tracing::debug!(userid = %userid, "Basic authentication failed");
                AuthOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl AuthMechanism for BasicAuthMechanism {
    async fn authenticate(&self, exchange: &mut Exchange) -> AuthOutcome {
        match credentials(exchange, "Basic") {
            Some(encoded) => self.verify(encoded),
            None => AuthOutcome::NotAttempted,
        }
    }

    fn challenge(&self) -> Option<HeaderValue> {
        Some(HeaderValue::from_static("Basic realm=\"gatehouse\""))
    }
}

/// Bearer tokens issued by the token manager.
pub struct TokenAuthMechanism {
    tokens: Arc<dyn TokenManager>,
}

impl TokenAuthMechanism {
    pub fn new(tokens: Arc<dyn TokenManager>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl AuthMechanism for TokenAuthMechanism {
    async fn authenticate(&self, exchange: &mut Exchange) -> AuthOutcome {
        match credentials(exchange, "Bearer") {
            Some(token) => match self.tokens.verify(token) {
                Some(account) => AuthOutcome::Authenticated(account),
                None => AuthOutcome::Failed,
            },
            None => AuthOutcome::NotAttempted,
        }
    }

    fn challenge(&self) -> Option<HeaderValue> {
        Some(HeaderValue::from_static("Bearer realm=\"gatehouse\""))
    }
}
