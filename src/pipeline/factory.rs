//! Pipeline assembly for each kind of route.

use std::sync::Arc;

use crate::pipeline::stages::{
    AuthHeadersRemover, ExchangeBuffersCloser, ForwardedHeadersInjector, PipelineInfoInjector,
    QueryStringRebuilder, RequestContentInjector, RequestNotManaged, TracingInstrumentation,
    XPoweredByInjector,
};
use crate::pipeline::{
    InterceptPoint, InterceptorRegistry, Pipeline, PipelineInfo, RequestInterceptorsExecutor,
    RequestLogSettings, RequestLogger, ResponseInterceptorsExecutor, Stage,
};
use crate::security::SecurityChain;

/// Builds pipelines sharing one security chain and interceptor registry.
#[derive(Clone)]
pub struct PipelineFactory {
    security: Arc<SecurityChain>,
    interceptors: Arc<InterceptorRegistry>,
    logging: RequestLogSettings,
}

impl PipelineFactory {
    pub fn new(
        security: Arc<SecurityChain>,
        interceptors: Arc<InterceptorRegistry>,
        logging: RequestLogSettings,
    ) -> Self {
        Self {
            security,
            interceptors,
            logging,
        }
    }

    /// Pipeline ending in a service.
    pub fn service(
        &self,
        info: PipelineInfo,
        terminal: Arc<dyn Stage>,
        requires_content: bool,
    ) -> Pipeline {
        self.secured(info, terminal, requires_content, false)
    }

    /// Pipeline ending in a proxy dispatcher.
    pub fn proxy(&self, info: PipelineInfo, terminal: Arc<dyn Stage>) -> Pipeline {
        self.secured(info, terminal, false, true)
    }

    /// Pipeline serving files; no security, request interceptors or content handling.
    pub fn static_resources(&self, info: PipelineInfo, terminal: Arc<dyn Stage>) -> Pipeline {
        Pipeline::builder()
            .stage(PipelineInfoInjector::new(info))
            .stage(TracingInstrumentation::new(&self.logging.trace_headers))
            .stage(RequestLogger::new(self.logging.dump_level))
            .stage(XPoweredByInjector)
            .shared(terminal)
            .response_interceptors(self.response_interceptors())
            .build()
    }

    /// Fallback pipeline for paths no route matched.
    pub fn not_managed(&self) -> Pipeline {
        Pipeline::builder()
            .stage(TracingInstrumentation::new(&self.logging.trace_headers))
            .stage(RequestLogger::new(self.logging.dump_level))
            .stage(XPoweredByInjector)
            .stage(RequestNotManaged)
            .response_interceptors(self.response_interceptors())
            .build()
    }

    fn response_interceptors(&self) -> ResponseInterceptorsExecutor {
        ResponseInterceptorsExecutor::new(self.interceptors.clone())
    }

    fn secured(
        &self,
        info: PipelineInfo,
        terminal: Arc<dyn Stage>,
        terminal_requires_content: bool,
        proxied: bool,
    ) -> Pipeline {
        let interceptors = &self.interceptors;
        let mut builder = Pipeline::builder()
            .stage(PipelineInfoInjector::new(info))
            .stage(TracingInstrumentation::new(&self.logging.trace_headers))
            .stage(RequestLogger::new(self.logging.dump_level))
            .stage(ExchangeBuffersCloser)
            .stage(XPoweredByInjector)
            .stage(RequestContentInjector::new(
                InterceptPoint::RequestBeforeAuth,
                interceptors.clone(),
                false,
            ))
            .stage(RequestInterceptorsExecutor::new(
                InterceptPoint::RequestBeforeAuth,
                interceptors.clone(),
            ))
            .stage(QueryStringRebuilder)
            .shared(self.security.clone());

        if proxied {
            builder = builder
                .stage(AuthHeadersRemover)
                .stage(ForwardedHeadersInjector);
        }

        builder
            .stage(RequestContentInjector::new(
                InterceptPoint::RequestAfterAuth,
                interceptors.clone(),
                terminal_requires_content,
            ))
            .stage(RequestInterceptorsExecutor::new(
                InterceptPoint::RequestAfterAuth,
                interceptors.clone(),
            ))
            .stage(QueryStringRebuilder)
            .shared(terminal)
            .response_interceptors(self.response_interceptors())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::exchange::{ContentLimits, Exchange};
    use crate::pipeline::Interceptor;
    use crate::plugins::{PingService, PluginRecord, Service, ServiceHandler};
    use crate::routing::RouteKind;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECURED_HEAD: [&str; 9] = [
        "pipeline-info",
        "tracing",
        "request-logger",
        "buffers-closer",
        "x-powered-by",
        "content-injector",
        "request-interceptors-before-auth",
        "query-string-rebuilder",
        "security",
    ];

    const SECURED_TAIL: [&str; 3] = [
        "content-injector",
        "request-interceptors-after-auth",
        "query-string-rebuilder",
    ];

    fn factory() -> PipelineFactory {
        PipelineFactory::new(
            Arc::new(SecurityChain::new(vec![], vec![], None)),
            Arc::new(InterceptorRegistry::default()),
            RequestLogSettings::default(),
        )
    }

    struct StampResponse(Arc<AtomicUsize>);

    #[async_trait]
    impl Interceptor for StampResponse {
        fn intercept_point(&self) -> InterceptPoint {
            InterceptPoint::Response
        }

        async fn handle(&self, _exchange: &mut Exchange) -> Result<(), GatewayError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn info(kind: RouteKind) -> PipelineInfo {
        PipelineInfo {
            kind,
            pattern: "/x".into(),
            name: "x".into(),
            secured: false,
        }
    }

    fn terminal() -> Arc<dyn Stage> {
        let service: Arc<dyn Service> = Arc::new(PingService::new("test"));
        Arc::new(ServiceHandler::new(service))
    }

    #[test]
    fn test_proxy_only_stages() {
        let proxy = factory().proxy(info(RouteKind::Proxy), terminal()).stage_names();
        let service = factory()
            .service(info(RouteKind::Service), terminal(), false)
            .stage_names();

        assert!(proxy.contains(&"auth-headers-remover"));
        assert!(proxy.contains(&"forwarded-headers"));
        assert!(!service.contains(&"auth-headers-remover"));
        assert_eq!(proxy.len(), service.len() + 2);
    }

    #[test]
    fn test_security_precedes_terminal() {
        let names = factory()
            .service(info(RouteKind::Service), terminal(), false)
            .stage_names();
        let security = names.iter().position(|n| *n == "security").unwrap();
        let service = names.iter().position(|n| *n == "service").unwrap();
        assert!(security < service);
        assert_eq!(names.first(), Some(&"pipeline-info"));
    }

    #[test]
    fn test_static_pipeline_has_no_security() {
        let names = factory()
            .static_resources(info(RouteKind::Static), terminal())
            .stage_names();
        assert!(!names.contains(&"security"));
    }

    #[test]
    fn test_service_stage_order() {
        let names = factory()
            .service(info(RouteKind::Service), terminal(), true)
            .stage_names();
        let expected: Vec<&str> = SECURED_HEAD
            .iter()
            .chain(SECURED_TAIL.iter())
            .chain(["service"].iter())
            .copied()
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_proxy_stage_order() {
        let names = factory().proxy(info(RouteKind::Proxy), terminal()).stage_names();
        let expected: Vec<&str> = SECURED_HEAD
            .iter()
            .chain(["auth-headers-remover", "forwarded-headers"].iter())
            .chain(SECURED_TAIL.iter())
            .chain(["service"].iter())
            .copied()
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_static_and_fallback_stage_order() {
        let factory = factory();
        assert_eq!(
            factory
                .static_resources(info(RouteKind::Static), terminal())
                .stage_names(),
            ["pipeline-info", "tracing", "request-logger", "x-powered-by", "service"]
        );
        assert_eq!(
            factory.not_managed().stage_names(),
            ["tracing", "request-logger", "x-powered-by", "not-managed"]
        );
    }

    #[tokio::test]
    async fn test_response_interceptors_run_on_every_pipeline() {
        let count = Arc::new(AtomicUsize::new(0));
        let interceptor: Arc<dyn Interceptor> = Arc::new(StampResponse(count.clone()));
        let factory = PipelineFactory::new(
            Arc::new(SecurityChain::new(vec![], vec![], None)),
            Arc::new(InterceptorRegistry::new(vec![PluginRecord::new("stamp", interceptor)])),
            RequestLogSettings::default(),
        );

        let pipelines = [
            factory.service(info(RouteKind::Service), terminal(), false),
            factory.proxy(info(RouteKind::Proxy), terminal()),
            factory.static_resources(info(RouteKind::Static), terminal()),
            factory.not_managed(),
        ];
        assert!(pipelines.iter().all(Pipeline::has_response_interceptors));

        let request = Request::builder().uri("/missing").body(Body::empty()).unwrap();
        let mut exchange = Exchange::new(request, ContentLimits::default());
        factory.not_managed().execute(&mut exchange).await;
        assert_eq!(exchange.response().status(), StatusCode::NOT_FOUND);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
