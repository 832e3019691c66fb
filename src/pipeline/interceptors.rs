//! Interceptor plugins and the stages that run them.
//!
//! Interceptors are registered once at startup and run on every route
//! whose exchange they resolve. Request interceptors run at one of two
//! points, before or after authentication; response interceptors run after
//! the terminal handler.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::exchange::Exchange;
use crate::pipeline::{Flow, Stage};
use crate::plugins::PluginRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptPoint {
    RequestBeforeAuth,
    RequestAfterAuth,
    Response,
}

/// Plugin inspecting or modifying exchanges.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn intercept_point(&self) -> InterceptPoint;

    /// Whether the content must be buffered before `handle` runs.
    fn requires_content(&self) -> bool {
        false
    }

    /// Whether this interceptor applies to `exchange`.
    fn resolve(&self, _exchange: &Exchange) -> bool {
        true
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<(), GatewayError>;
}

/// Enabled interceptors, in registration order.
#[derive(Default)]
pub struct InterceptorRegistry {
    interceptors: Vec<PluginRecord<dyn Interceptor>>,
}

impl InterceptorRegistry {
    pub fn new(records: Vec<PluginRecord<dyn Interceptor>>) -> Self {
        let interceptors = records
            .into_iter()
            .filter(|record| {
                if !record.is_enabled() {
                    tracing::debug!(interceptor = record.name(), "Interceptor disabled");
                }
                record.is_enabled()
            })
            .collect();
        Self { interceptors }
    }

    pub fn at(&self, point: InterceptPoint) -> impl Iterator<Item = &PluginRecord<dyn Interceptor>> {
        self.interceptors
            .iter()
            .filter(move |record| record.instance().intercept_point() == point)
    }

    /// Whether an interceptor at `point` that applies to `exchange` needs content.
    pub fn requires_content(&self, point: InterceptPoint, exchange: &Exchange) -> bool {
        self.at(point).any(|record| {
            let interceptor = record.instance();
            interceptor.requires_content() && interceptor.resolve(exchange)
        })
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

/// Runs the request interceptors of one intercept point.
pub struct RequestInterceptorsExecutor {
    point: InterceptPoint,
    registry: Arc<InterceptorRegistry>,
}

impl RequestInterceptorsExecutor {
    pub fn new(point: InterceptPoint, registry: Arc<InterceptorRegistry>) -> Self {
        Self { point, registry }
    }
}

#[async_trait]
impl Stage for RequestInterceptorsExecutor {
    fn name(&self) -> &'static str {
        match self.point {
            InterceptPoint::RequestBeforeAuth => "request-interceptors-before-auth",
            _ => "request-interceptors-after-auth",
        }
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        if exchange.in_error() {
            return Ok(Flow::Continue);
        }

        for record in self.registry.at(self.point) {
            let interceptor = record.instance();
            if !interceptor.resolve(exchange) {
                continue;
            }
            if let Err(err) = interceptor.handle(exchange).await {
                tracing::warn!(interceptor = record.name(), error = %err, "Request interceptor failed");
                return Err(err);
            }
            if exchange.in_error() {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }
}

/// Runs the response interceptors, at most once per exchange.
pub struct ResponseInterceptorsExecutor {
    registry: Arc<InterceptorRegistry>,
}

impl ResponseInterceptorsExecutor {
    pub fn new(registry: Arc<InterceptorRegistry>) -> Self {
        Self { registry }
    }

    pub async fn execute(&self, exchange: &mut Exchange) {
        if exchange.response_interceptors_executed() {
            return;
        }
        exchange.mark_response_interceptors_executed();

        let applicable: Vec<&PluginRecord<dyn Interceptor>> = self
            .registry
            .at(InterceptPoint::Response)
            .filter(|record| record.instance().resolve(exchange))
            .collect();
        if applicable.is_empty() {
            return;
        }

        if applicable.iter().any(|r| r.instance().requires_content()) {
            let limits = exchange.limits();
            if let Err(err) = exchange.response_mut().buffer(limits).await {
                tracing::warn!(error = %err, "Cannot buffer response content for interceptors");
                exchange.set_in_error(&err);
                return;
            }
        }

        for record in applicable {
            if let Err(err) = record.instance().handle(exchange).await {
                tracing::error!(interceptor = record.name(), error = %err, "Response interceptor failed");
                exchange.set_in_error(&err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ContentLimits;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::HeaderValue;

    struct Tagger {
        point: InterceptPoint,
        only_path: &'static str,
    }

    #[async_trait]
    impl Interceptor for Tagger {
        fn intercept_point(&self) -> InterceptPoint {
            self.point
        }

        fn resolve(&self, exchange: &Exchange) -> bool {
            exchange.path() == self.only_path
        }

        async fn handle(&self, exchange: &mut Exchange) -> Result<(), GatewayError> {
            exchange
                .headers_mut()
                .append("x-tagged", HeaderValue::from_static("yes"));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Interceptor for Failing {
        fn intercept_point(&self) -> InterceptPoint {
            InterceptPoint::RequestAfterAuth
        }

        async fn handle(&self, _exchange: &mut Exchange) -> Result<(), GatewayError> {
            Err(GatewayError::MalformedContent("bad".into()))
        }
    }

    fn exchange(path: &str) -> Exchange {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        Exchange::new(request, ContentLimits::default())
    }

    fn registry() -> Arc<InterceptorRegistry> {
        Arc::new(InterceptorRegistry::new(vec![
            PluginRecord::new(
                "tagger",
                Arc::new(Tagger {
                    point: InterceptPoint::RequestBeforeAuth,
                    only_path: "/tagged",
                }) as Arc<dyn Interceptor>,
            ),
            PluginRecord::new("failing", Arc::new(Failing) as Arc<dyn Interceptor>),
            PluginRecord::new(
                "disabled",
                Arc::new(Tagger {
                    point: InterceptPoint::RequestBeforeAuth,
                    only_path: "/tagged",
                }) as Arc<dyn Interceptor>,
            )
            .with_enabled(false),
        ]))
    }

    #[tokio::test]
    async fn test_only_resolving_interceptors_run() {
        let executor = RequestInterceptorsExecutor::new(InterceptPoint::RequestBeforeAuth, registry());

        let mut tagged = exchange("/tagged");
        executor.handle(&mut tagged).await.unwrap();
        assert_eq!(tagged.headers().get_all("x-tagged").iter().count(), 1);

        let mut other = exchange("/other");
        executor.handle(&mut other).await.unwrap();
        assert!(other.headers().get("x-tagged").is_none());
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let executor = RequestInterceptorsExecutor::new(InterceptPoint::RequestAfterAuth, registry());
        let err = executor.handle(&mut exchange("/any")).await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedContent(_)));
    }

    #[tokio::test]
    async fn test_skipped_when_exchange_failed() {
        let executor = RequestInterceptorsExecutor::new(InterceptPoint::RequestAfterAuth, registry());
        let mut ex = exchange("/any");
        ex.set_in_error(&GatewayError::Authentication);
        assert_eq!(executor.handle(&mut ex).await.unwrap(), Flow::Continue);
    }

    #[test]
    fn test_disabled_interceptors_are_dropped() {
        assert_eq!(registry().len(), 2);
    }
}
