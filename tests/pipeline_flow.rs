//! In-process tests of the request pipelines.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use base64::{engine::general_purpose::STANDARD, Engine};
use gatehouse::config::{GatewayConfig, MethodVetoConfig};
use gatehouse::exchange::Exchange;
use gatehouse::lifecycle::build_routes;
use gatehouse::plugins::{PluginRecord, PluginSet, Service};
use gatehouse::{GatewayError, GatewayServer};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

/// Answers with the size of the request content.
struct EchoService;

#[async_trait]
impl Service for EchoService {
    fn default_uri(&self) -> Option<&str> {
        Some("/echo")
    }

    fn requires_content(&self) -> bool {
        true
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<(), GatewayError> {
        let length = exchange.content().map(|c| c.len()).unwrap_or(0);
        exchange
            .response_mut()
            .set_json(StatusCode::OK, &json!({ "length": length }));
        Ok(())
    }
}

fn server_with_echo(config: &GatewayConfig, secured: bool) -> GatewayServer {
    let mut plugins = PluginSet::builtin(config);
    let echo: Arc<dyn Service> = Arc::new(EchoService);
    plugins
        .services
        .push(PluginRecord::new("echo", echo).with_secured(secured));
    GatewayServer::new(config, build_routes(config, &plugins))
}

fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

async fn send(server: &GatewayServer, request: Request<Body>) -> Response {
    server.router().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_unknown_path_is_404_json() {
    let server = common::server(&GatewayConfig::default());
    let response = send(&server, get("/nothing/here")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let body = json_body(response).await;
    assert_eq!(body["http status code"], 404);
    assert_eq!(body["http status description"], "Not Found");
}

#[tokio::test]
async fn test_ping() {
    let server = common::server(&GatewayConfig::default());
    let response = send(&server, get("/ping")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-powered-by"], "gatehouse");
    let body = json_body(response).await;
    assert_eq!(body["message"], "Greetings from gatehouse!");
}

#[tokio::test]
async fn test_roles_requires_authentication() {
    let server = common::server(&common::open_config());

    let response = send(&server, get("/roles")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/roles")
        .header(header::AUTHORIZATION, basic("alice", "secret"))
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("auth-token"));
    let body = json_body(response).await;
    assert_eq!(body["id"], "alice");
    assert_eq!(body["roles"], json!(["admin"]));
}

#[tokio::test]
async fn test_wrong_password_is_challenged() {
    let server = common::server(&common::open_config());
    let request = Request::builder()
        .uri("/roles")
        .header(header::AUTHORIZATION, basic("alice", "wrong"))
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenges: Vec<_> = response
        .headers()
        .get_all(header::WWW_AUTHENTICATE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(challenges.contains(&r#"Basic realm="gatehouse""#.to_string()));
}

#[tokio::test]
async fn test_issued_token_authenticates() {
    let server = common::server(&common::open_config());
    let request = Request::builder()
        .uri("/roles")
        .header(header::AUTHORIZATION, basic("alice", "secret"))
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;
    let token = response.headers()["auth-token"].to_str().unwrap().to_string();

    let request = Request::builder()
        .uri("/roles")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["id"], "alice");
}

#[tokio::test]
async fn test_secured_route_without_allower_is_forbidden() {
    // No allower enabled: fail closed, even for a valid account.
    let mut config = common::open_config();
    config.plugins_args.clear();
    let server = server_with_echo(&config, true);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .header(header::AUTHORIZATION, basic("alice", "secret"))
        .body(Body::from("hello"))
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let anonymous = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .body(Body::from("hello"))
        .unwrap();
    assert_eq!(send(&server, anonymous).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_secured_route_asks_anonymous_callers_to_authenticate() {
    let mut config = common::open_config();
    config.plugins_args.get_mut("fullAuthorizer").unwrap().extra.insert(
        "authentication-required".into(),
        toml::Value::Boolean(true),
    );
    let server = server_with_echo(&config, true);

    let anonymous = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .body(Body::from("hello"))
        .unwrap();
    let response = send(&server, anonymous).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .header(header::AUTHORIZATION, basic("alice", "secret"))
        .body(Body::from("hello"))
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["length"], 5);
}

#[tokio::test]
async fn test_method_vetoer() {
    let mut config = common::open_config();
    config.method_vetoes.push(MethodVetoConfig {
        path: "/echo".into(),
        methods: vec!["DELETE".into()],
    });
    let server = server_with_echo(&config, true);

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/echo")
        .header(header::AUTHORIZATION, basic("alice", "secret"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&server, request).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_content_size_limit() {
    let mut config = GatewayConfig::default();
    config.max_content_size = 64;
    config.buffer_size = 16;
    let server = server_with_echo(&config, false);

    let exact = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .body(Body::from(vec![b'a'; 64]))
        .unwrap();
    let response = send(&server, exact).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["length"], 64);

    let too_large = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .body(Body::from(vec![b'a'; 65]))
        .unwrap();
    let response = send(&server, too_large).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(response).await["http status code"], 413);
}

#[tokio::test]
async fn test_requests_limit() {
    let mut config = GatewayConfig::default();
    config.requests_limit = 1;
    let server = common::server(&config);

    let _held = server.gate().try_admit().unwrap();
    assert_eq!(
        send(&server, get("/ping")).await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_only_listed_methods_are_served() {
    let server = server_with_echo(&GatewayConfig::default(), false);

    for method in ["TRACE", "PURGE"] {
        let request = Request::builder()
            .method(method)
            .uri("/echo")
            .body(Body::empty())
            .unwrap();
        let response = send(&server, request).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers().contains_key(header::ALLOW));
        assert_eq!(json_body(response).await["http status code"], 405);
    }

    let options = Request::builder()
        .method(Method::OPTIONS)
        .uri("/echo")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&server, options).await.status(), StatusCode::OK);
}
