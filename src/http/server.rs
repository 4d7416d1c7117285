//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router: liveness endpoint plus a catch-all into the engine
//! - Wire up middleware (request ID, tracing, timeouts, panic guard)
//! - Bind server to listener and serve until shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::TraceLayer,
};

use crate::config::{RouterConfig, ServerConfig};
use crate::error::BuildError;
use crate::http::guard::panic_guard;
use crate::http::request::MakeRequestUuid;
use crate::observability::{Instrumentation, PrometheusInstrumentation};
use crate::routing::RoutingEngine;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RoutingEngine>,
}

/// HTTP server for the canary router.
pub struct HttpServer {
    router: Router,
    config: RouterConfig,
}

impl HttpServer {
    /// Create a server reporting to the Prometheus recorder.
    pub fn new(config: RouterConfig, version: &str) -> Result<Self, BuildError> {
        Self::with_instrumentation(config, version, Arc::new(PrometheusInstrumentation))
    }

    /// Create a server with a custom instrumentation bridge.
    pub fn with_instrumentation(
        config: RouterConfig,
        version: &str,
        instrumentation: Arc<dyn Instrumentation>,
    ) -> Result<Self, BuildError> {
        let engine = RoutingEngine::from_config(&config, version, instrumentation)?;
        let state = AppState {
            engine: Arc::new(engine),
        };
        let router = build_router(&config.server, state);
        Ok(Self { router, config })
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The assembled router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Build the Axum router with all middleware layers.
///
/// A request still unanswered after the write timeout gets 504: the wait is
/// on the decision service or a backend, never on the client.
pub fn build_router(server: &ServerConfig, state: AppState) -> Router {
    Router::new()
        .route(&server.health_path, get(liveness))
        .fallback(proxy_handler)
        .with_state(state)
        .layer(middleware::from_fn(panic_guard))
        .layer(RequestBodyTimeoutLayer::new(server.read_timeout()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            server.write_timeout(),
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Liveness probe. Does not touch the routing engine.
async fn liveness() -> &'static str {
    "OK"
}

/// Catch-all handler: everything else goes through the routing engine.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    match state.engine.handle(request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}
