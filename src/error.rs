//! Router-wide error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Startup construction failure. Fatal: the router must not serve traffic.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid {name} target URL {url:?}: {reason}")]
    InvalidTarget {
        name: &'static str,
        url: String,
        reason: String,
    },

    #[error("invalid {name} host header {value:?}")]
    InvalidHostHeader { name: &'static str, value: String },

    #[error("sidecar is configured without {0}")]
    MissingDecisionStatus(&'static str),

    #[error("sidecar {field} is not a valid status code: {value}")]
    InvalidDecisionStatus { field: &'static str, value: u16 },
}

/// Failure inside the per-request pipeline that the engine did not recover from.
///
/// Surfaces to the client as a 500 carrying the description.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("failed to rewrite request path {path:?}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: axum::http::uri::InvalidUriParts,
    },

    #[error("invalid request path {path:?}: {source}")]
    InvalidPathAndQuery {
        path: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request pipeline failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
