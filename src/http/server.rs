//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the single dispatch handler
//! - Wire up middleware (request id, tracing span, timeout, admission)
//! - Serve plain HTTP and HTTPS listeners
//! - Drain in-flight requests on shutdown, terminate them after the timeout
//!
//! # Design Decisions
//! - Routing happens in the gateway's own table, not in Axum's router
//! - Admission is checked before the exchange is built, so rejected
//!   requests never touch a pipeline
//! - The admission permit rides along with the response body, so a streamed
//!   body counts as in flight until the client has read it
//! - Listeners are bound by the caller; serving never binds

use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header::ALLOW, HeaderValue, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::exchange::{ContentLimits, Exchange};
use crate::http::body::guarded;
use crate::http::request::{propagate_request_id_layer, request_span, set_request_id_layer};
use crate::lifecycle::ShutdownSignal;
use crate::net::RequestGate;
use crate::routing::{Resolution, RoutingTable};

/// Time left to terminated requests and open connections before the
/// server task is aborted.
const TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Methods served by the gateway; anything else is answered with 405.
const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
];

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RoutingTable>,
    pub limits: ContentLimits,
    pub gate: RequestGate,
}

/// HTTP server of the gateway.
#[derive(Clone)]
pub struct GatewayServer {
    router: Router,
    gate: RequestGate,
    shutdown_timeout: Duration,
}

impl GatewayServer {
    pub fn new(config: &GatewayConfig, routes: Arc<RoutingTable>) -> Self {
        let gate = RequestGate::new(config.requests_limit);
        let state = AppState {
            routes,
            limits: ContentLimits::new(config.max_content_size, config.buffer_size),
            gate: gate.clone(),
        };
        let router = Self::build_router(config, state);
        Self {
            router,
            gate,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let gate = state.gate.clone();
        Router::new()
            .fallback(dispatch)
            .with_state(state)
            .layer(middleware::from_fn_with_state(gate, admit))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| request_span(request)))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    /// Serve plain HTTP until `shutdown` fires, then drain.
    pub async fn run(self, listener: TcpListener, shutdown: ShutdownSignal) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let stop = CancellationToken::new();
        let app = self
            .router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>();
        let server = tokio::spawn(
            axum::serve(listener, app)
                .with_graceful_shutdown(stop.clone().cancelled_owned())
                .into_future(),
        );

        shutdown.recv().await;
        self.gate.close();
        stop.cancel();
        let result = self.finish(server).await;
        tracing::info!(address = %addr, "HTTP server stopped");
        result
    }

    /// Serve HTTPS on an already bound listener until `shutdown` fires, then drain.
    pub async fn run_tls(
        self,
        listener: std::net::TcpListener,
        tls: RustlsConfig,
        shutdown: ShutdownSignal,
    ) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let app = self
            .router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>();
        let server = tokio::spawn(
            axum_server::from_tcp_rustls(listener, tls)
                .handle(handle.clone())
                .serve(app),
        );

        shutdown.recv().await;
        self.gate.close();
        handle.graceful_shutdown(Some(self.shutdown_timeout + TERMINATION_GRACE));
        let result = self.finish(server).await;
        tracing::info!(address = %addr, "HTTPS server stopped");
        result
    }

    /// Wait for in-flight requests, then for the server task.
    async fn finish(&self, mut server: JoinHandle<io::Result<()>>) -> io::Result<()> {
        if !self.gate.drain(self.shutdown_timeout).await {
            tracing::warn!(
                in_flight = self.gate.in_flight(),
                timeout_secs = self.shutdown_timeout.as_secs(),
                "Shutdown timeout expired, terminating requests"
            );
            self.gate.terminate();
        }

        match tokio::time::timeout(TERMINATION_GRACE, &mut server).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(io::Error::other(join)),
            Err(_) => {
                tracing::warn!("Connections still open, closing them");
                server.abort();
                Ok(())
            }
        }
    }
}

/// Admission middleware: draining, requests-limit, then allowed methods.
async fn admit(State(gate): State<RequestGate>, request: Request, next: Next) -> Response {
    let permit = match gate.try_admit() {
        Ok(permit) => permit,
        Err(rejection) => return GatewayError::from(rejection).into_response(),
    };

    if !ALLOWED_METHODS.contains(request.method()) {
        tracing::debug!(method = %request.method(), "Method not allowed");
        let mut response = GatewayError::MethodNotAllowed(request.method().clone()).into_response();
        response.headers_mut().insert(
            ALLOW,
            HeaderValue::from_static("GET, POST, PUT, DELETE, PATCH, OPTIONS"),
        );
        return response;
    }

    let (parts, body) = next.run(request).await.into_parts();
    Response::from_parts(parts, guarded(body, permit))
}

/// Resolve the route and run its pipeline.
async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let mut exchange = Exchange::new(request, state.limits);

    let pipeline = match state.routes.resolve(&path) {
        Resolution::Matched(route) => {
            exchange.set_relative_path(route.matcher().relative_path(&path));
            route.pipeline().clone()
        }
        Resolution::NotFound => state.routes.not_managed().clone(),
    };

    let completed = tokio::select! {
        _ = pipeline.execute(&mut exchange) => true,
        _ = state.gate.terminated() => false,
    };
    if completed {
        exchange.into_response()
    } else {
        tracing::warn!(path = %path, "Request terminated by shutdown");
        GatewayError::Rejected("server is shutting down").into_response()
    }
}
