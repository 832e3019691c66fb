use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::error::GatewayError;
use crate::exchange::Exchange;
use crate::plugins::Service;

/// Returns the id and roles of the caller.
pub struct RolesService;

#[async_trait]
impl Service for RolesService {
    fn default_uri(&self) -> Option<&str> {
        Some("/roles")
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<(), GatewayError> {
        if exchange.method() != Method::GET {
            exchange
                .response_mut()
                .set_status(StatusCode::METHOD_NOT_ALLOWED);
            return Ok(());
        }

        let account = exchange.account().ok_or(GatewayError::Authentication)?;
        let body = json!({
            "authenticated": true,
            "id": account.id(),
            "roles": account.roles(),
        });
        exchange.response_mut().set_json(StatusCode::OK, &body);
        Ok(())
    }
}
