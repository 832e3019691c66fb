//! Auth tokens.
//!
//! A successful authentication may be answered with a token the client
//! sends back as `Authorization: Bearer <token>` on later requests.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::http::HeaderValue;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use dashmap::DashMap;
use rand::RngCore;
use thiserror::Error;

use crate::exchange::{Account, Exchange};

pub const AUTH_TOKEN: &str = "auth-token";
pub const AUTH_TOKEN_VALID_UNTIL: &str = "auth-token-valid-until";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("cannot issue token: {0}")]
    Issue(String),
}

/// An issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    valid_until: SystemTime,
}

impl Token {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn valid_until(&self) -> SystemTime {
        self.valid_until
    }
}

#[async_trait]
pub trait TokenManager: Send + Sync {
    /// Account owning `token`, if the token is known and not expired.
    fn verify(&self, token: &str) -> Option<Account>;

    /// Token for `account`, reusing a still valid one.
    async fn issue(&self, account: &Account) -> Result<Token, TokenError>;

    /// Expose `token` on the response.
    fn inject_token_headers(&self, exchange: &mut Exchange, token: &Token) {
        let valid_until = token
            .valid_until()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let headers = exchange.response_mut().headers_mut();
        if let Ok(value) = HeaderValue::from_str(token.value()) {
            headers.insert(AUTH_TOKEN, value);
        }
        headers.insert(AUTH_TOKEN_VALID_UNTIL, HeaderValue::from(valid_until));
    }
}

#[derive(Debug, Clone)]
struct Entry {
    account: Account,
    valid_until: SystemTime,
}

/// Random opaque tokens kept in memory.
pub struct RandomTokenManager {
    ttl: Duration,
    tokens: DashMap<String, Entry>,
    by_account: DashMap<String, String>,
}

impl RandomTokenManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: DashMap::new(),
            by_account: DashMap::new(),
        }
    }

    fn generate() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenManager for RandomTokenManager {
    fn verify(&self, token: &str) -> Option<Account> {
        let entry = self.tokens.get(token)?.value().clone();
        if entry.valid_until <= SystemTime::now() {
            self.tokens.remove(token);
            self.by_account
                .remove_if(entry.account.id(), |_, current| current == token);
            return None;
        }
        Some(entry.account)
    }

    async fn issue(&self, account: &Account) -> Result<Token, TokenError> {
        let valid_until = SystemTime::now() + self.ttl;

        let existing = self.by_account.get(account.id()).map(|v| v.value().clone());
        if let Some(value) = existing {
            if let Some(mut entry) = self.tokens.get_mut(&value) {
                if entry.valid_until > SystemTime::now() {
                    entry.valid_until = valid_until;
                    entry.account = account.clone();
                    return Ok(Token { value, valid_until });
                }
            }
            self.tokens.remove(&value);
        }

        let value = Self::generate();
        self.tokens.insert(
            value.clone(),
            Entry {
                account: account.clone(),
                valid_until,
            },
        );
        self.by_account.insert(account.id().to_string(), value.clone());
        tracing::debug!(account = %account.id(), "Issued auth token");
        Ok(Token { value, valid_until })
    }
}
