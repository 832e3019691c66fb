use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::exchange::Exchange;
use crate::pipeline::{Flow, Stage};
use crate::routing::MatchPolicy;

/// A plugin answering requests itself.
#[async_trait]
pub trait Service: Send + Sync {
    /// Path the service binds to when config does not override it.
    fn default_uri(&self) -> Option<&str> {
        None
    }

    fn match_policy(&self) -> MatchPolicy {
        MatchPolicy::Prefix
    }

    /// Whether the request content must be buffered before `handle`.
    fn requires_content(&self) -> bool {
        false
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<(), GatewayError>;
}

/// Terminal stage of a service pipeline.
pub struct ServiceHandler {
    service: Arc<dyn Service>,
}

impl ServiceHandler {
    pub fn new(service: Arc<dyn Service>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Stage for ServiceHandler {
    fn name(&self) -> &'static str {
        "service"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        self.service.handle(exchange).await?;
        Ok(Flow::Continue)
    }
}
