//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gatehouse::config::{GatewayConfig, PluginArgs, UserConfig};
use gatehouse::lifecycle::{build_routes, Shutdown};
use gatehouse::plugins::PluginSet;
use gatehouse::GatewayServer;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A backend answering every request with a JSON description of it.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start a mock backend on a free port.
pub async fn start_mock_backend(name: &'static str) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = answer(socket, name).await;
            });
        }
    });

    MockBackend { addr, hits }
}

async fn answer(mut socket: TcpStream, name: &str) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();

    let header = |name: &str| -> Option<String> {
        head.split("\r\n").skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    };

    let content_length: usize = header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body_len = buf.len() - head_end;
    while body_len < content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body_len += n;
    }

    let body = json!({
        "backend": name,
        "method": method,
        "target": target,
        "host": header("host"),
        "authorization": header("authorization"),
        "account": header("x-forwarded-account-id"),
        "forwarded-for": header("x-forwarded-for"),
        "body-length": body_len,
    })
    .to_string();

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

/// An address nothing listens on.
pub fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Config with one user and an allower for every request.
pub fn open_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.users.push(UserConfig {
        userid: "alice".into(),
        password: "secret".into(),
        roles: vec!["admin".into()],
    });
    config.plugins_args.insert(
        "fullAuthorizer".into(),
        PluginArgs {
            enabled: Some(true),
            ..Default::default()
        },
    );
    config
}

pub fn server(config: &GatewayConfig) -> GatewayServer {
    let plugins = PluginSet::builtin(config);
    GatewayServer::new(config, build_routes(config, &plugins))
}

/// A gateway serving on a free port.
pub struct RunningGateway {
    pub addr: SocketAddr,
    pub shutdown: Arc<Shutdown>,
    pub task: JoinHandle<std::io::Result<()>>,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_gateway(config: &GatewayConfig) -> RunningGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Arc::new(Shutdown::new());

    let server = server(config);
    let signal = shutdown.subscribe();
    let task = tokio::spawn(async move { server.run(listener, signal).await });

    RunningGateway {
        addr,
        shutdown,
        task,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
