//! The security stage of service and proxy pipelines.

use async_trait::async_trait;
use axum::http::header::WWW_AUTHENTICATE;

use crate::error::GatewayError;
use crate::exchange::Exchange;
use crate::pipeline::{Flow, Stage};
use crate::plugins::PluginRecord;
use crate::security::{AuthMechanism, AuthOutcome, Authorizer, AuthorizerType, TokenManager};

/// Authentication, authorization and token issuing, run as one stage.
pub struct SecurityChain {
    mechanisms: Vec<PluginRecord<dyn AuthMechanism>>,
    allowers: Vec<PluginRecord<dyn Authorizer>>,
    vetoers: Vec<PluginRecord<dyn Authorizer>>,
    token_manager: Option<PluginRecord<dyn TokenManager>>,
}

impl SecurityChain {
    /// Keep the enabled plugins. Missing allowers or mechanisms are logged.
    pub fn new(
        mechanisms: Vec<PluginRecord<dyn AuthMechanism>>,
        authorizers: Vec<PluginRecord<dyn Authorizer>>,
        token_manager: Option<PluginRecord<dyn TokenManager>>,
    ) -> Self {
        let mechanisms: Vec<_> = mechanisms.into_iter().filter(|m| m.is_enabled()).collect();
        let (allowers, vetoers): (Vec<_>, Vec<_>) = authorizers
            .into_iter()
            .filter(|a| a.is_enabled())
            .partition(|a| a.instance().authorizer_type() == AuthorizerType::Allower);
        let token_manager = token_manager.filter(|t| t.is_enabled());

        if allowers.is_empty() {
            tracing::warn!("No authorizer of type ALLOWER is enabled, every secured request will be forbidden");
        }
        if mechanisms.is_empty() {
            tracing::warn!("No authentication mechanism is enabled");
        }
        for m in &mechanisms {
            tracing::info!(mechanism = %m.name(), "Authentication mechanism enabled");
        }
        for a in allowers.iter().chain(vetoers.iter()) {
            tracing::info!(authorizer = %a.name(), "Authorizer enabled");
        }

        Self {
            mechanisms,
            allowers,
            vetoers,
            token_manager,
        }
    }

    pub fn has_allowers(&self) -> bool {
        !self.allowers.is_empty()
    }

    /// Run the mechanisms until one of them attempts authentication.
    async fn authenticate(&self, exchange: &mut Exchange) -> Result<(), GatewayError> {
        for record in &self.mechanisms {
            match record.instance().authenticate(exchange).await {
                AuthOutcome::NotAttempted => continue,
                AuthOutcome::Authenticated(account) => {
                    tracing::debug!(mechanism = %record.name(), account = %account.id(), "Authenticated");
                    exchange.set_account(account);
                    return Ok(());
                }
                AuthOutcome::Failed => {
                    tracing::debug!(mechanism = %record.name(), "Authentication failed");
                    self.add_challenges(exchange);
                    return Err(GatewayError::Authentication);
                }
            }
        }
        Ok(())
    }

    /// At least one allower grants and no vetoer forbids.
    pub fn is_allowed(&self, exchange: &Exchange) -> bool {
        self.allowers.iter().any(|a| a.instance().is_allowed(exchange))
            && self.vetoers.iter().all(|v| v.instance().is_allowed(exchange))
    }

    fn denial(&self, exchange: &mut Exchange) -> GatewayError {
        if self.has_allowers() && !exchange.is_authenticated() && !self.mechanisms.is_empty() {
            self.add_challenges(exchange);
            GatewayError::Authentication
        } else {
            GatewayError::Authorization
        }
    }

    fn add_challenges(&self, exchange: &mut Exchange) {
        for record in &self.mechanisms {
            if let Some(challenge) = record.instance().challenge() {
                exchange
                    .response_mut()
                    .headers_mut()
                    .append(WWW_AUTHENTICATE, challenge);
            }
        }
    }

    async fn issue_token(&self, exchange: &mut Exchange) {
        let (Some(record), Some(account)) = (&self.token_manager, exchange.account().cloned())
        else {
            return;
        };
        match record.instance().issue(&account).await {
            Ok(token) => record.instance().inject_token_headers(exchange, &token),
            Err(err) => {
                tracing::warn!(account = %account.id(), error = %err, "Cannot issue auth token")
            }
        }
    }
}

#[async_trait]
impl Stage for SecurityChain {
    fn name(&self) -> &'static str {
        "security"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        self.authenticate(exchange).await?;

        let secured = exchange.pipeline_info().is_some_and(|info| info.secured);
        if secured && !self.is_allowed(exchange) {
            let err = self.denial(exchange);
            tracing::debug!(path = %exchange.path(), error = %err, "Request denied");
            return Err(err);
        }

        self.issue_token(exchange).await;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{MethodVetoConfig, UserConfig};
    use crate::exchange::{Account, ContentLimits};
    use crate::pipeline::PipelineInfo;
    use crate::routing::RouteKind;
    use crate::security::{
        BasicAuthMechanism, FullAuthorizer, MethodVetoer, RandomTokenManager, AUTH_TOKEN,
    };
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::header::AUTHORIZATION;
    use axum::http::Method;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use std::sync::Arc;
    use std::time::Duration;

    fn basic() -> PluginRecord<dyn AuthMechanism> {
        let mechanism: Arc<dyn AuthMechanism> = Arc::new(BasicAuthMechanism::from_config(&[
            UserConfig {
                userid: "admin".into(),
                password: "secret".into(),
                roles: vec!["admin".into()],
            },
        ]));
        PluginRecord::new("basicAuthMechanism", mechanism)
    }

    fn allow_authenticated() -> PluginRecord<dyn Authorizer> {
        let authorizer: Arc<dyn Authorizer> = Arc::new(FullAuthorizer::new(true));
        PluginRecord::new("fullAuthorizer", authorizer)
    }

    fn veto_delete() -> PluginRecord<dyn Authorizer> {
        let authorizer: Arc<dyn Authorizer> = Arc::new(MethodVetoer::from_config(&MethodVetoConfig {
            path: "/".into(),
            methods: vec!["DELETE".into()],
        }));
        PluginRecord::new("methodVetoer", authorizer)
    }

    fn exchange(method: Method, credentials: Option<(&str, &str)>, secured: bool) -> Exchange {
        let mut builder = Request::builder().method(method).uri("/resource");
        if let Some((user, password)) = credentials {
            let encoded = BASE64.encode(format!("{user}:{password}"));
            builder = builder.header(AUTHORIZATION, format!("Basic {encoded}"));
        }
        let mut ex = Exchange::new(builder.body(Body::empty()).unwrap(), ContentLimits::default());
        ex.set_pipeline_info(PipelineInfo {
            kind: RouteKind::Service,
            pattern: "/resource".into(),
            name: "resource".into(),
            secured,
        });
        ex
    }

    #[tokio::test]
    async fn test_no_allower_forbids_everything_secured() {
        let chain = SecurityChain::new(vec![basic()], vec![], None);

        let anonymous = chain.handle(&mut exchange(Method::GET, None, true)).await;
        assert!(matches!(anonymous, Err(GatewayError::Authorization)));

        let authenticated = chain
            .handle(&mut exchange(Method::GET, Some(("admin", "secret")), true))
            .await;
        assert!(matches!(authenticated, Err(GatewayError::Authorization)));
    }

    #[tokio::test]
    async fn test_unsecured_routes_allow_anonymous() {
        let chain = SecurityChain::new(vec![basic()], vec![], None);
        let mut ex = exchange(Method::GET, None, false);
        assert_eq!(chain.handle(&mut ex).await.unwrap(), Flow::Continue);
        assert!(!ex.is_authenticated());
    }

    #[tokio::test]
    async fn test_unauthenticated_gets_challenge() {
        let chain = SecurityChain::new(vec![basic()], vec![allow_authenticated()], None);
        let mut ex = exchange(Method::GET, None, true);

        let result = chain.handle(&mut ex).await;
        assert!(matches!(result, Err(GatewayError::Authentication)));
        assert_eq!(
            ex.response().headers()[WWW_AUTHENTICATE],
            "Basic realm=\"gatehouse\""
        );
    }

    #[tokio::test]
    async fn test_wrong_credentials_fail_even_on_unsecured_routes() {
        let chain = SecurityChain::new(vec![basic()], vec![allow_authenticated()], None);
        let result = chain
            .handle(&mut exchange(Method::GET, Some(("admin", "wrong")), false))
            .await;
        assert!(matches!(result, Err(GatewayError::Authentication)));
    }

    #[tokio::test]
    async fn test_vetoer_overrides_allower() {
        let chain = SecurityChain::new(
            vec![basic()],
            vec![allow_authenticated(), veto_delete()],
            None,
        );

        let get = chain
            .handle(&mut exchange(Method::GET, Some(("admin", "secret")), true))
            .await;
        assert!(get.is_ok());

        let delete = chain
            .handle(&mut exchange(Method::DELETE, Some(("admin", "secret")), true))
            .await;
        assert!(matches!(delete, Err(GatewayError::Authorization)));
    }

    #[tokio::test]
    async fn test_no_mechanism_means_forbidden() {
        let chain = SecurityChain::new(vec![], vec![allow_authenticated()], None);
        let result = chain.handle(&mut exchange(Method::GET, None, true)).await;
        assert!(matches!(result, Err(GatewayError::Authorization)));
    }

    #[tokio::test]
    async fn test_disabled_plugins_are_ignored() {
        let chain = SecurityChain::new(
            vec![basic().with_enabled(false)],
            vec![allow_authenticated().with_enabled(false)],
            None,
        );
        assert!(!chain.has_allowers());
    }

    #[tokio::test]
    async fn test_token_issued_after_authentication() {
        let manager: Arc<dyn TokenManager> =
            Arc::new(RandomTokenManager::new(Duration::from_secs(60)));
        let chain = SecurityChain::new(
            vec![basic()],
            vec![allow_authenticated()],
            Some(PluginRecord::new("randomTokenManager", manager.clone())),
        );

        let mut ex = exchange(Method::GET, Some(("admin", "secret")), true);
        chain.handle(&mut ex).await.unwrap();

        let token = ex.response().headers()[AUTH_TOKEN].to_str().unwrap().to_string();
        assert_eq!(manager.verify(&token), Some(Account::new("admin", ["admin"])));
    }
}
