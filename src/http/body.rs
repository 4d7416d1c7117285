//! Request body replication.
//!
//! # Responsibilities
//! - Buffer an inbound body so it can be replayed to the decision service
//! - Hand back the original request with an equivalent body on every path
//!
//! # Design Decisions
//! - The restored request is returned unconditionally, success or failure;
//!   callers cannot lose the body by returning early
//! - Over-limit bodies are not replayed, but the restored body is the buffered
//!   prefix followed by the unread remainder, so the backend sees every byte
//! - A read failure is re-raised to whoever reads the restored body, after the
//!   bytes that did arrive

use std::io;
use std::net::SocketAddr;

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::Request;
use futures_util::{stream, StreamExt};

/// Why a body could not be replicated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BodyError {
    #[error("failed to read request body: {0}")]
    Read(String),

    #[error("request body exceeds replay limit of {limit} bytes")]
    TooLarge { limit: usize },
}

/// Outcome of splitting a request body in two.
#[derive(Debug)]
pub struct Replicated {
    /// The original request, body restored. Always present.
    pub restored: Request<Body>,
    /// Independent copy for the decision service.
    pub replay: Result<Request<Body>, BodyError>,
}

/// Read the whole body of `request` (up to `limit` bytes) and produce two
/// independent requests carrying it.
pub async fn replicate(request: Request<Body>, limit: usize) -> Replicated {
    let (parts, body) = request.into_parts();
    let mut chunks = body.into_data_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(chunk) if buffer.len() + chunk.len() > limit => {
                buffer.extend_from_slice(&chunk);
                let prefix = Bytes::from(buffer);
                let rest = stream::once(async move { Ok::<_, axum::Error>(prefix) }).chain(chunks);
                return Replicated {
                    restored: Request::from_parts(parts, Body::from_stream(rest)),
                    replay: Err(BodyError::TooLarge { limit }),
                };
            }
            Ok(chunk) => buffer.extend_from_slice(&chunk),
            Err(err) => {
                let message = err.to_string();
                let replayed_failure = io::Error::other(message.clone());
                let prefix = stream::iter([Ok(Bytes::from(buffer)), Err(replayed_failure)]);
                return Replicated {
                    restored: Request::from_parts(parts, Body::from_stream(prefix)),
                    replay: Err(BodyError::Read(message)),
                };
            }
        }
    }

    let bytes = Bytes::from(buffer);
    let mut replay = Request::builder()
        .method(parts.method.clone())
        .uri(parts.uri.clone())
        .version(parts.version);
    if let Some(headers) = replay.headers_mut() {
        headers.extend(parts.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(connect_info) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        replay = replay.extension(*connect_info);
    }

    let replay = replay
        .body(Body::from(bytes.clone()))
        .map_err(|e| BodyError::Read(e.to_string()));

    Replicated {
        restored: Request::from_parts(parts, Body::from(bytes)),
        replay,
    }
}
