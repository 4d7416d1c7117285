//! Forwarding proxies.
//!
//! # Responsibilities
//! - Rewrite the request URI onto a fixed upstream base URL
//! - Optionally override the Host header
//! - Strip hop-by-hop headers, append X-Forwarded-For
//! - Forward with a per-target pooled client and response deadline
//! - Map transport failures to a response via a per-proxy error handler
//!
//! # Design Decisions
//! - Immutable after construction; safe to share across requests
//! - Construction validates the target URL, request-time code never does
//! - Dropping the returned future abandons the upstream call

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri, Version};
use axum::response::IntoResponse;
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::config::validation::parse_target_url;
use crate::config::{ClientConfig, TargetConfig};
use crate::error::BuildError;

/// Headers that apply to a single connection and must not be forwarded.
static HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Upstream call failure.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),
}

/// Maps an upstream failure to the response the caller receives.
pub type ErrorHandler = fn(&str, &ProxyError) -> Response<Body>;

/// Default handler: 504 on deadline, 502 otherwise.
pub fn bad_gateway(name: &str, err: &ProxyError) -> Response<Body> {
    tracing::error!(proxy = name, error = %err, "Upstream error");
    let status = match err {
        ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    };
    status.into_response()
}

/// A reverse proxy bound to one upstream.
#[derive(Clone)]
pub struct ForwardingProxy {
    name: &'static str,
    scheme: String,
    authority: String,
    base_path: String,
    base_query: String,
    host_header: Option<HeaderValue>,
    timeout: Option<Duration>,
    client: Client<HttpConnector, Body>,
    on_error: ErrorHandler,
}

impl fmt::Debug for ForwardingProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingProxy")
            .field("name", &self.name)
            .field("scheme", &self.scheme)
            .field("authority", &self.authority)
            .field("base_path", &self.base_path)
            .field("host_header", &self.host_header)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ForwardingProxy {
    /// Build a proxy for a configured target.
    pub fn from_target(name: &'static str, target: &TargetConfig) -> Result<Self, BuildError> {
        Self::new(name, &target.url, &target.host_header, &target.client)
    }

    /// Build a proxy for `url`. An empty `host_header` keeps the client's Host.
    pub fn new(
        name: &'static str,
        url: &str,
        host_header: &str,
        client: &ClientConfig,
    ) -> Result<Self, BuildError> {
        let target = parse_target_url(url).map_err(|reason| BuildError::InvalidTarget {
            name,
            url: url.to_string(),
            reason,
        })?;

        let host_header = if host_header.is_empty() {
            None
        } else {
            Some(HeaderValue::from_str(host_header).map_err(|_| BuildError::InvalidHostHeader {
                name,
                value: host_header.to_string(),
            })?)
        };

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(client.connect_timeout_ms)));

        let http_client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(client.idle_timeout_secs))
            .pool_max_idle_per_host(client.max_idle_per_host)
            .build(connector);

        Ok(Self {
            name,
            scheme: target.scheme().to_string(),
            authority: target[url::Position::BeforeHost..url::Position::AfterPort].to_string(),
            base_path: target.path().to_string(),
            base_query: target.query().unwrap_or_default().to_string(),
            host_header,
            timeout: client.timeout(),
            client: http_client,
            on_error: bad_gateway,
        })
    }

    /// Replace the transport error handler.
    pub fn with_error_handler(mut self, on_error: ErrorHandler) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Forward and always produce a response; failures go through the error handler.
    pub async fn serve(&self, request: Request<Body>) -> Response<Body> {
        match self.forward(request).await {
            Ok(response) => response,
            Err(err) => (self.on_error)(self.name, &err),
        }
    }

    /// Forward `request` upstream.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let (mut parts, body) = request.into_parts();

        parts.uri = self.rewrite_uri(&parts.uri)?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        if let Some(host) = &self.host_header {
            parts.headers.insert(header::HOST, host.clone());
        }
        if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(&mut parts.headers, peer.ip());
        }

        tracing::debug!(proxy = self.name, uri = %parts.uri, "Forwarding request");

        let pending = self.client.request(Request::from_parts(parts, body));
        let response: Response<Incoming> = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| ProxyError::Timeout(limit))??,
            None => pending.await?,
        };

        Ok(into_downstream(response))
    }

    /// Map a request URI onto the upstream: single-slash path join, `&`-joined query.
    pub fn rewrite_uri(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let path = join_paths(&self.base_path, uri.path());
        let query = match (self.base_query.as_str(), uri.query().unwrap_or_default()) {
            ("", "") => String::new(),
            (base, "") => format!("?{base}"),
            ("", query) => format!("?{query}"),
            (base, query) => format!("?{base}&{query}"),
        };

        Uri::builder()
            .scheme(self.scheme.as_str())
            .authority(self.authority.as_str())
            .path_and_query(format!("{path}{query}"))
            .build()
    }
}

/// Turn an upstream response into one the server can send: hop-by-hop
/// headers removed, body streamed through unbuffered.
fn into_downstream(response: Response<Incoming>) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

/// Join two URL paths with exactly one slash between them.
pub fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.is_empty() => format!("{prior}, {client}"),
        _ => client.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
