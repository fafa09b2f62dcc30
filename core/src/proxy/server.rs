//! Edge Server - Axum HTTP server

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{any, get, post, MethodRouter},
    Router,
};
use bytes::Bytes;
use tower_http::trace::TraceLayer;

use crate::config::{BackendBase, Config};
use crate::error::{error_envelope, EnvelopeKey};
use crate::proxy::forward::Forwarder;
use crate::proxy::handlers::{auth, resources};
use crate::proxy::routes::{ResourceRoute, LOGOUT, REGISTER, RESOURCE_ROUTES};
use crate::proxy::timeouts::TimeoutPolicy;
use crate::proxy::upstream::client::BackendClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<Forwarder>,
    pub registration: Arc<auth::RegistrationPolicy>,
}

/// Edge server instance
pub struct ProxyServer {
    host: String,
    port: u16,
    body_limit: usize,
    state: AppState,
}

impl ProxyServer {
    /// Build the server against an already resolved backend.
    pub fn new(config: &Config, backend: BackendBase) -> anyhow::Result<Self> {
        let client = BackendClient::new(backend, config.logging.trace_backend_calls)?;
        let forwarder = Forwarder::new(
            client,
            TimeoutPolicy::from_config(&config.timeouts),
            config.server.public_origin.clone(),
        );

        let state = AppState {
            forwarder: Arc::new(forwarder),
            registration: Arc::new(auth::RegistrationPolicy::from_config(&config.registration)),
        };

        Ok(Self {
            host: config.server.host.clone(),
            port: config.server.port,
            body_limit: config.server.body_limit_bytes(),
            state,
        })
    }

    /// Resolve the backend from environment and config, then build.
    /// A missing backend URL in production fails here, before binding.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let backend = config.backend.resolve()?;
        Self::new(config, backend)
    }

    pub fn backend_url(&self) -> &BackendBase {
        self.state.forwarder.backend().base_url()
    }

    pub fn router(&self) -> Router {
        let mut router = Router::new()
            // Health check
            .route("/healthz", get(health_check_handler))
            .route("/health", get(health_check_handler))
            // Auth flows with local behaviour
            .route(LOGOUT.prefix, post(auth::handle_logout))
            .route(REGISTER.prefix, post(auth::handle_register));

        for route in RESOURCE_ROUTES {
            router = router
                .route(route.prefix, resource_handler(route))
                .route(&format!("{}/*rest", route.prefix), resource_handler(route));
        }

        router
            .fallback(not_found_handler)
            .layer(DefaultBodyLimit::max(self.body_limit))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the edge server (blocking)
    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Edge server listening on {} -> {}", addr, self.backend_url());

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Edge server stopped");
        Ok(())
    }
}

fn resource_handler(route: &'static ResourceRoute) -> MethodRouter<AppState> {
    any(
        move |State(state): State<AppState>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes| async move {
            resources::forward_resource(state, route, method, uri, headers, body).await
        },
    )
}

/// Health check handler
async fn health_check_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "backend": state.forwarder.backend().base_url().as_str(),
        })),
    )
        .into_response()
}

async fn not_found_handler() -> Response {
    error_envelope(StatusCode::NOT_FOUND, EnvelopeKey::Detail, "Not found")
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
