use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::error::GatewayError;
use crate::exchange::Exchange;
use crate::plugins::Service;
use crate::routing::MatchPolicy;

/// Liveness check answering `GET /ping`.
pub struct PingService {
    instance_name: String,
}

impl PingService {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
        }
    }
}

#[async_trait]
impl Service for PingService {
    fn default_uri(&self) -> Option<&str> {
        Some("/ping")
    }

    fn match_policy(&self) -> MatchPolicy {
        MatchPolicy::Exact
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<(), GatewayError> {
        let method = exchange.method().clone();
        let response = exchange.response_mut();
        if method == Method::OPTIONS {
            response.set_status(StatusCode::OK);
            return Ok(());
        }
        if method != Method::GET {
            response.set_status(StatusCode::METHOD_NOT_ALLOWED);
            return Ok(());
        }
        response.set_json(
            StatusCode::OK,
            &json!({
                "message": "Greetings from gatehouse!",
                "instance": self.instance_name,
            }),
        );
        Ok(())
    }
}
