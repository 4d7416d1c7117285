//! Decision service client.
//!
//! # Responsibilities
//! - Replay a request to the decision service through its own proxy
//! - Capture the response in memory; it never reaches the real client
//! - Map the captured status code to a `DecisionOutcome`
//!
//! # Wire Contract
//! ```text
//! <main_status>    → RouteMain
//! <canary_status>  → RouteCanary (still subject to quota)
//! 503              → Unavailable, body is the diagnostic text
//! anything else    → NonStandard
//! ```
//!
//! Transport failures to the decision service are turned into 503 + error
//! text by the proxy's error handler, so they arrive here as `Unavailable`.

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, Response, StatusCode};
use axum::response::IntoResponse;
use futures_util::StreamExt;

use crate::config::SidecarConfig;
use crate::error::BuildError;
use crate::http::body::BodyError;
use crate::http::proxy::{ForwardingProxy, ProxyError};

/// Reserved status meaning the decision could not be made.
pub const STATUS_SIDECAR_ERROR: StatusCode = StatusCode::SERVICE_UNAVAILABLE;

/// Upper bound on the captured decision-service body; the rest is discarded.
pub const MAX_CAPTURED_BODY: usize = 64 * 1024;

/// Why no decision is available.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionError {
    /// The decision service (or its proxy) reported an error.
    #[error("{0}")]
    Sidecar(String),

    #[error(transparent)]
    Body(#[from] BodyError),
}

/// Result of consulting the decision service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    RouteMain { status: StatusCode },
    RouteCanary { status: StatusCode },
    Unavailable(DecisionError),
    NonStandard(StatusCode),
}

impl DecisionOutcome {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DecisionOutcome::RouteMain { .. } => "main",
            DecisionOutcome::RouteCanary { .. } => "canary",
            DecisionOutcome::Unavailable(_) => "unavailable",
            DecisionOutcome::NonStandard(_) => "non_standard",
        }
    }
}

/// Something that can be asked where a request should go.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn consult(&self, request: Request<Body>) -> DecisionOutcome;
}

/// Status codes the decision service answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionCodes {
    pub main: StatusCode,
    pub canary: StatusCode,
}

impl DecisionCodes {
    pub fn from_config(config: &SidecarConfig) -> Result<Self, BuildError> {
        Ok(Self {
            main: status_code("main_status", config.main_status)?,
            canary: status_code("canary_status", config.canary_status)?,
        })
    }

    /// Interpret a captured response.
    pub fn interpret(&self, captured: &CapturedResponse) -> DecisionOutcome {
        let status = captured.status;
        if status == self.main {
            DecisionOutcome::RouteMain { status }
        } else if status == self.canary {
            DecisionOutcome::RouteCanary { status }
        } else if status == STATUS_SIDECAR_ERROR {
            DecisionOutcome::Unavailable(DecisionError::Sidecar(captured.body_text()))
        } else {
            DecisionOutcome::NonStandard(status)
        }
    }
}

fn status_code(field: &'static str, value: Option<u16>) -> Result<StatusCode, BuildError> {
    let value = value.ok_or(BuildError::MissingDecisionStatus(field))?;
    StatusCode::from_u16(value).map_err(|_| BuildError::InvalidDecisionStatus { field, value })
}

/// In-memory response sink: status, headers and body, detached from any connection.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedResponse {
    /// Drain `response` into memory. Never fails: the status is always kept,
    /// and the body is cut at `MAX_CAPTURED_BODY` or at the first read error.
    pub async fn record(response: Response<Body>) -> Self {
        let (parts, body) = response.into_parts();
        let mut chunks = body.into_data_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(chunk) => {
                    let room = MAX_CAPTURED_BODY - buffer.len();
                    buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
                    if buffer.len() == MAX_CAPTURED_BODY {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "Decision service body ended early");
                    break;
                }
            }
        }

        Self {
            status: parts.status,
            headers: parts.headers,
            body: Bytes::from(buffer),
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Error handler for the decision-service proxy: 503 with the error as body.
pub fn sidecar_error(name: &str, err: &ProxyError) -> Response<Body> {
    tracing::warn!(proxy = name, error = %err, "Decision service call failed");
    (STATUS_SIDECAR_ERROR, err.to_string()).into_response()
}

/// Decision service reached over HTTP.
#[derive(Debug, Clone)]
pub struct DecisionClient {
    proxy: ForwardingProxy,
    codes: DecisionCodes,
}

impl DecisionClient {
    pub fn new(proxy: ForwardingProxy, codes: DecisionCodes) -> Self {
        Self {
            proxy: proxy.with_error_handler(sidecar_error),
            codes,
        }
    }

    /// Build from config; `None` when no decision service URL is set.
    pub fn from_config(config: &SidecarConfig) -> Result<Option<Self>, BuildError> {
        if !config.is_enabled() {
            return Ok(None);
        }
        let proxy = ForwardingProxy::new("sidecar", &config.url, "", &config.client)?;
        Ok(Some(Self::new(proxy, DecisionCodes::from_config(config)?)))
    }

    pub fn codes(&self) -> DecisionCodes {
        self.codes
    }
}

#[async_trait]
impl DecisionService for DecisionClient {
    async fn consult(&self, request: Request<Body>) -> DecisionOutcome {
        let response = self.proxy.serve(request).await;
        let captured = CapturedResponse::record(response).await;
        self.codes.interpret(&captured)
    }
}
