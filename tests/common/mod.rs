//! Shared utilities for integration testing.
//!
//! Every helper binds to `127.0.0.1:0` so tests never compete for ports.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use canary_router::config::{RouterConfig, TargetConfig};
use canary_router::observability::{Instrumentation, InstrumentationError};
use canary_router::routing::context::{RoutingContext, RoutingTags};
use canary_router::{HttpServer, Shutdown};

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Start a backend that answers every request with a JSON description of it.
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    let router = Router::new().fallback(
        move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| async move {
            let header = |key: &str| {
                headers
                    .get(key)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            Json(json!({
                "backend": name,
                "method": method.as_str(),
                "path": uri.path(),
                "query": uri.query().unwrap_or_default(),
                "host": header("host"),
                "forwarded_for": header("x-forwarded-for"),
                "body": String::from_utf8_lossy(&body),
            }))
        },
    );
    serve(router).await
}

/// Programmable decision service: answers with whatever `respond` returns for
/// the zero-based call index, and remembers every body it was sent.
#[derive(Clone)]
pub struct MockSidecar {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Bytes>>>,
}

impl MockSidecar {
    pub async fn start<F, B>(respond: F) -> Self
    where
        F: Fn(usize) -> (u16, B) + Send + Sync + 'static,
        B: Into<Bytes>,
    {
        Self::start_with_delay(Duration::ZERO, respond).await
    }

    pub async fn start_with_delay<F, B>(delay: Duration, respond: F) -> Self
    where
        F: Fn(usize) -> (u16, B) + Send + Sync + 'static,
        B: Into<Bytes>,
    {
        let calls = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let state = SidecarState {
            calls: calls.clone(),
            bodies: bodies.clone(),
            respond: Arc::new(move |index: usize| -> (u16, Bytes) {
                let (status, body) = respond(index);
                (status, body.into())
            }),
            delay,
        };
        let router = Router::new().fallback(sidecar_handler).with_state(state);
        let addr = serve(router).await;
        Self { addr, calls, bodies }
    }

    /// Sidecar that always answers with one status.
    pub async fn fixed(status: u16) -> Self {
        Self::start(move |_| (status, "")).await
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<Bytes> {
        self.bodies.lock().unwrap().clone()
    }
}

type Respond = Arc<dyn Fn(usize) -> (u16, Bytes) + Send + Sync>;

#[derive(Clone)]
struct SidecarState {
    calls: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Bytes>>>,
    respond: Respond,
    delay: Duration,
}

async fn sidecar_handler(State(state): State<SidecarState>, body: Bytes) -> impl IntoResponse {
    let index = state.calls.fetch_add(1, Ordering::SeqCst);
    state.bodies.lock().unwrap().push(body);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    let (status, body) = (state.respond)(index);
    (StatusCode::from_u16(status).unwrap(), Body::from(body))
}

/// Address with nothing listening on it.
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Instrumentation keeping the tags of every recorded request.
#[derive(Default)]
pub struct RecordingInstrumentation {
    recorded: Mutex<Vec<RoutingTags>>,
}

impl RecordingInstrumentation {
    pub fn recorded(&self) -> Vec<RoutingTags> {
        self.recorded.lock().unwrap().clone()
    }
}

impl Instrumentation for RecordingInstrumentation {
    fn record_latency(&self, ctx: &RoutingContext) -> Result<(), InstrumentationError> {
        ctx.elapsed()?;
        let tags = ctx.tags().cloned().ok_or(InstrumentationError::Untracked)?;
        self.recorded.lock().unwrap().push(tags);
        Ok(())
    }
}

/// Router configuration pointing at the given backends, metrics off.
pub fn router_config(main: SocketAddr, canary: SocketAddr) -> RouterConfig {
    let mut config = RouterConfig::default();
    config.main = TargetConfig {
        url: format!("http://{main}"),
        ..TargetConfig::default()
    };
    config.canary = TargetConfig {
        url: format!("http://{canary}"),
        ..TargetConfig::default()
    };
    config.observability.metrics_enabled = false;
    config
}

/// Attach a decision service with main = 200, canary = 201.
pub fn with_sidecar(mut config: RouterConfig, url: String) -> RouterConfig {
    config.sidecar.url = url;
    config.sidecar.main_status = Some(200);
    config.sidecar.canary_status = Some(201);
    config
}

/// Start the router on an ephemeral port. Drop or trigger the returned
/// `Shutdown` to stop it.
pub async fn spawn_router(
    config: RouterConfig,
    instrumentation: Arc<RecordingInstrumentation>,
) -> (SocketAddr, Shutdown) {
    let server = HttpServer::with_instrumentation(config, "test", instrumentation).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });
    (addr, shutdown)
}

/// HTTP client that ignores proxy environment variables.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Decode the echo backend's description of a request.
pub async fn echoed(response: reqwest::Response) -> Value {
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    response.json().await.unwrap()
}
