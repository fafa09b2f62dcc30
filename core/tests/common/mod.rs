//! Shared utilities for integration tests.

use std::net::SocketAddr;

use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use marketingkreis_edge_core::config::{BackendBase, Config};
use marketingkreis_edge_core::proxy::ProxyServer;
use tokio::net::TcpListener;
use tower::ServiceExt;

/// Serve `app` as a mock backend on an ephemeral port.
pub async fn start_mock_backend(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    addr
}

/// Config with short deadlines and retry delays so failure paths run fast.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.timeouts.read_ms = 300;
    config.timeouts.write_ms = 500;
    config.timeouts.long_running_ms = 800;
    config.timeouts.cold_start_ms = 1_000;
    config.registration.retry_delays_ms = vec![120, 240];
    config.server.public_origin = Some("https://app.example.ch".to_string());
    config
}

pub fn edge_router(config: &Config, backend: SocketAddr) -> Router {
    let base = BackendBase::parse(&format!("http://{}", backend)).unwrap();
    ProxyServer::new(config, base).unwrap().router()
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
