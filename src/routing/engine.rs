//! Routing engine.
//!
//! # State Machine
//! ```text
//! Start
//!   → X-Canary exactly "true"/"false"  → Dispatch (canary/main)
//!   → no decision service              → Dispatch (main)
//!   → quota exhausted (pre-check)      → Dispatch (main)
//!   → DecisionLookup
//!       Unavailable | RouteMain | NonStandard → Dispatch (main)
//!       RouteCanary → Admit
//!           admitted     → Dispatch (canary)
//!           not admitted → Dispatch (main)
//!   → Dispatch → tag + record latency → Terminal
//! ```
//!
//! # Design Decisions
//! - The quota is only touched by the atomic admit; no lock spans the
//!   decision-service call, so the post-decision admit closes the race
//! - Every fallback goes to main; the client never sees decision internals
//! - A taken admission is not refunded if the request is later abandoned

use std::sync::Arc;

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{Request, Response, Uri};

use crate::config::RouterConfig;
use crate::error::{BuildError, RouterError};
use crate::http::body::{replicate, Replicated};
use crate::http::proxy::ForwardingProxy;
use crate::observability::metrics;
use crate::observability::Instrumentation;
use crate::routing::context::{Route, RoutingContext, Target};
use crate::routing::decision::{DecisionClient, DecisionError, DecisionOutcome, DecisionService};
use crate::routing::override_header::{Override, X_CANARY};
use crate::routing::quota::CanaryQuota;

/// Default replay limit when none is configured.
const DEFAULT_MAX_REPLAY_BYTES: usize = 2 * 1024 * 1024;

/// Per-request routing between the main and canary proxies.
pub struct RoutingEngine {
    main: ForwardingProxy,
    canary: ForwardingProxy,
    decision: Option<Arc<dyn DecisionService>>,
    quota: Arc<CanaryQuota>,
    instrumentation: Arc<dyn Instrumentation>,
    version: String,
    trim_prefix: String,
    max_replay_bytes: usize,
}

impl RoutingEngine {
    pub fn new(
        main: ForwardingProxy,
        canary: ForwardingProxy,
        quota: Arc<CanaryQuota>,
        instrumentation: Arc<dyn Instrumentation>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            main,
            canary,
            decision: None,
            quota,
            instrumentation,
            version: version.into(),
            trim_prefix: String::new(),
            max_replay_bytes: DEFAULT_MAX_REPLAY_BYTES,
        }
    }

    /// Build every component from a validated configuration.
    pub fn from_config(
        config: &RouterConfig,
        version: impl Into<String>,
        instrumentation: Arc<dyn Instrumentation>,
    ) -> Result<Self, BuildError> {
        let main = ForwardingProxy::from_target("main", &config.main)?;
        let canary = ForwardingProxy::from_target("canary", &config.canary)?;
        let quota = Arc::new(CanaryQuota::new(config.circuit_breaker.request_limit_canary));

        let mut engine = Self::new(main, canary, quota, instrumentation, version)
            .with_trim_prefix(config.trim_prefix.clone())
            .with_max_replay_bytes(config.sidecar.max_body_bytes);

        if let Some(client) = DecisionClient::from_config(&config.sidecar)? {
            engine = engine.with_decision_service(Arc::new(client));
        }

        if let Some(remaining) = engine.quota.remaining() {
            metrics::record_quota_remaining(remaining);
        }

        tracing::info!(
            sidecar_enabled = engine.decision.is_some(),
            canary_limit = ?engine.quota.remaining(),
            trim_prefix = %engine.trim_prefix,
            "Routing engine ready"
        );
        Ok(engine)
    }

    pub fn with_decision_service(mut self, decision: Arc<dyn DecisionService>) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn with_trim_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.trim_prefix = prefix.into();
        self
    }

    pub fn with_max_replay_bytes(mut self, limit: usize) -> Self {
        self.max_replay_bytes = limit;
        self
    }

    pub fn quota(&self) -> &CanaryQuota {
        &self.quota
    }

    /// Full pipeline for one request: normalize, route, dispatch, record.
    pub async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, RouterError> {
        let ctx = RoutingContext::tracked();
        let request = self.normalize_path(request)?;
        let (request, route) = self.route(request).await;
        Ok(self.dispatch(request, route, ctx).await)
    }

    /// Remove the configured prefix from the request path.
    pub fn normalize_path(&self, request: Request<Body>) -> Result<Request<Body>, RouterError> {
        if self.trim_prefix.is_empty() {
            return Ok(request);
        }
        let Some(trimmed) = request.uri().path().strip_prefix(self.trim_prefix.as_str()) else {
            return Ok(request);
        };

        let mut path = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        if let Some(query) = request.uri().query() {
            path.push('?');
            path.push_str(query);
        }

        let (mut parts, body) = request.into_parts();
        let path_and_query =
            PathAndQuery::try_from(path.as_str()).map_err(|source| RouterError::InvalidPathAndQuery {
                path: path.clone(),
                source,
            })?;
        let mut uri_parts = parts.uri.clone().into_parts();
        uri_parts.path_and_query = Some(path_and_query);
        parts.uri = Uri::from_parts(uri_parts).map_err(|source| RouterError::InvalidPath { path, source })?;

        Ok(Request::from_parts(parts, body))
    }

    /// Decide where `request` goes. The returned request carries the original body.
    pub async fn route(&self, request: Request<Body>) -> (Request<Body>, Route) {
        let header = Override::from_headers(request.headers());
        if let Some(value) = header.header_value() {
            let reason = format!("routed via header override: {X_CANARY}={value}");
            let route = match header {
                Override::Canary => Route::canary(reason),
                _ => Route::main(reason),
            };
            return (request, route);
        }

        let Some(decision) = &self.decision else {
            return (request, Route::main("no decision service configured"));
        };

        if self.quota.is_exhausted() {
            return (request, Route::main("canary limit reached"));
        }

        let Replicated { restored, replay } = replicate(request, self.max_replay_bytes).await;
        let outcome = match replay {
            Ok(replay) => decision.consult(replay).await,
            Err(err) => DecisionOutcome::Unavailable(DecisionError::Body(err)),
        };
        metrics::record_decision(outcome.label());

        let route = match outcome {
            DecisionOutcome::Unavailable(err) => {
                tracing::warn!(error = %err, "Decision service unavailable, falling back to main");
                Route::main(format!("decision service unavailable: {err}"))
            }
            DecisionOutcome::RouteMain { status } => {
                Route::main(format!("decision service returned status {}", status.as_u16()))
            }
            DecisionOutcome::NonStandard(status) => {
                tracing::warn!(status = status.as_u16(), "Decision service returned non-standard status");
                Route::main(format!(
                    "decision service returned non-standard status {}",
                    status.as_u16()
                ))
            }
            DecisionOutcome::RouteCanary { status } => self.admit(status.as_u16()),
        };

        (restored, route)
    }

    fn admit(&self, status: u16) -> Route {
        let admitted = self.quota.try_admit();
        if let Some(remaining) = self.quota.remaining() {
            metrics::record_quota_remaining(remaining);
        }
        if admitted {
            Route::canary(format!("decision service returned status {status}"))
        } else {
            Route::main(format!(
                "decision service returned status {status}, but canary limit reached after decision"
            ))
        }
    }

    async fn dispatch(&self, request: Request<Body>, route: Route, mut ctx: RoutingContext) -> Response<Body> {
        if let Err(err) = self.instrumentation.attach_reason(&mut ctx, &route.reason) {
            tracing::warn!(error = %err, "Failed to attach routing reason");
        }

        tracing::info!(
            backend = %route.target,
            reason = %route.reason,
            method = %request.method(),
            path = %request.uri().path(),
            "Routed request"
        );

        let response = match route.target {
            Target::Main => self.main.serve(request).await,
            Target::Canary => self.canary.serve(request).await,
        };

        self.record(&mut ctx, route.target);
        response
    }

    fn record(&self, ctx: &mut RoutingContext, target: Target) {
        if let Err(err) = self.instrumentation.attach_target(ctx, target) {
            tracing::warn!(error = %err, "Failed to attach target tag");
        }
        if let Err(err) = self.instrumentation.attach_version(ctx, &self.version) {
            tracing::warn!(error = %err, "Failed to attach version tag");
        }
        if let Err(err) = self.instrumentation.record_latency(ctx) {
            tracing::warn!(error = %err, "Failed to record latency");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::observability::NoopInstrumentation;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Decision service returning a fixed outcome and remembering replayed bodies.
    struct Scripted {
        outcome: DecisionOutcome,
        calls: AtomicUsize,
        bodies: Mutex<Vec<Vec<u8>>>,
    }

    impl Scripted {
        fn new(outcome: DecisionOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
                bodies: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DecisionService for Scripted {
        async fn consult(&self, request: Request<Body>) -> DecisionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = axum::body::to_bytes(request.into_body(), usize::MAX)
                .await
                .unwrap();
            self.bodies.lock().unwrap().push(body.to_vec());
            self.outcome.clone()
        }
    }

    fn engine(quota: u64) -> RoutingEngine {
        let client = ClientConfig::default();
        RoutingEngine::new(
            ForwardingProxy::new("main", "http://127.0.0.1:9", "", &client).unwrap(),
            ForwardingProxy::new("canary", "http://127.0.0.1:9", "", &client).unwrap(),
            Arc::new(CanaryQuota::new(quota)),
            Arc::new(NoopInstrumentation),
            "test",
        )
    }

    /// Recorder capturing the last value set on the quota gauge.
    #[derive(Default)]
    struct QuotaGauge(Mutex<Option<f64>>);

    impl ::metrics::GaugeFn for QuotaGauge {
        fn increment(&self, _value: f64) {}
        fn decrement(&self, _value: f64) {}
        fn set(&self, value: f64) {
            *self.0.lock().unwrap() = Some(value);
        }
    }

    struct GaugeRecorder(Arc<QuotaGauge>);

    impl ::metrics::Recorder for GaugeRecorder {
        fn describe_counter(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}
        fn describe_gauge(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}
        fn describe_histogram(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}

        fn register_counter(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Counter {
            ::metrics::Counter::noop()
        }

        fn register_gauge(&self, key: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Gauge {
            if key.name() == "canary_router_canary_quota_remaining" {
                ::metrics::Gauge::from_arc(self.0.clone())
            } else {
                ::metrics::Gauge::noop()
            }
        }

        fn register_histogram(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Histogram {
            ::metrics::Histogram::noop()
        }
    }

    fn built_with_limit(limit: u64) -> Option<f64> {
        let mut config = RouterConfig::default();
        config.main.url = "http://127.0.0.1:9".into();
        config.canary.url = "http://127.0.0.1:9".into();
        config.circuit_breaker.request_limit_canary = limit;

        let gauge = Arc::new(QuotaGauge::default());
        let recorder = GaugeRecorder(gauge.clone());
        ::metrics::with_local_recorder(&recorder, || {
            RoutingEngine::from_config(&config, "test", Arc::new(NoopInstrumentation)).unwrap()
        });
        let value = *gauge.0.lock().unwrap();
        value
    }

    #[test]
    fn test_quota_gauge_published_at_startup() {
        assert_eq!(built_with_limit(5), Some(5.0));
        assert_eq!(built_with_limit(0), None);
    }

    fn canary_outcome() -> DecisionOutcome {
        DecisionOutcome::RouteCanary { status: StatusCode::CREATED }
    }

    fn request(override_value: Option<&str>, body: &'static str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/orders");
        if let Some(value) = override_value {
            builder = builder.header("X-Canary", value);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn body_of(request: Request<Body>) -> String {
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_header_override_skips_decision_service() {
        let decision = Scripted::new(DecisionOutcome::RouteMain { status: StatusCode::OK });
        let engine = engine(1).with_decision_service(decision.clone());
        // Exhaust the quota: override must still win.
        assert!(engine.quota().try_admit());

        let (_, route) = engine.route(request(Some("true"), "")).await;
        assert_eq!(route.target, Target::Canary);
        assert!(route.reason.contains("header override"));

        let (_, route) = engine.route(request(Some("false"), "")).await;
        assert_eq!(route.target, Target::Main);

        assert_eq!(decision.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_override_falls_through() {
        let decision = Scripted::new(canary_outcome());
        let engine = engine(0).with_decision_service(decision.clone());

        for value in ["TRUE", "1", "", "no"] {
            let (_, route) = engine.route(request(Some(value), "")).await;
            assert_eq!(route.target, Target::Canary, "value {value:?}");
            assert!(!route.reason.contains("header override"));
        }
        assert_eq!(decision.calls(), 4);
    }

    #[tokio::test]
    async fn test_no_decision_service_routes_main() {
        let engine = engine(0);
        let (_, route) = engine.route(request(None, "")).await;
        assert_eq!(route, Route::main("no decision service configured"));
    }

    #[tokio::test]
    async fn test_quota_exhausted_short_circuits() {
        let decision = Scripted::new(canary_outcome());
        let engine = engine(1).with_decision_service(decision.clone());

        let (_, first) = engine.route(request(None, "")).await;
        assert_eq!(first.target, Target::Canary);
        assert!(first.reason.contains("201"));

        let (_, second) = engine.route(request(None, "")).await;
        assert_eq!(second.target, Target::Main);
        assert!(second.reason.contains("limit reached"));

        assert_eq!(decision.calls(), 1);
    }

    #[tokio::test]
    async fn test_race_after_decision_routes_main() {
        /// Drains the quota while "deciding", like a concurrent request would.
        struct Draining(Arc<CanaryQuota>);

        #[async_trait]
        impl DecisionService for Draining {
            async fn consult(&self, _request: Request<Body>) -> DecisionOutcome {
                while self.0.try_admit() {}
                DecisionOutcome::RouteCanary { status: StatusCode::CREATED }
            }
        }

        let engine = engine(3);
        let quota = engine.quota.clone();
        let engine = engine.with_decision_service(Arc::new(Draining(quota)));

        let (_, route) = engine.route(request(None, "")).await;
        assert_eq!(route.target, Target::Main);
        assert!(route.reason.contains("limit reached after decision"));
    }

    #[tokio::test]
    async fn test_fallbacks_route_main() {
        let cases = [
            (
                DecisionOutcome::Unavailable(DecisionError::Sidecar("timeout".into())),
                "timeout",
            ),
            (DecisionOutcome::RouteMain { status: StatusCode::OK }, "200"),
            (DecisionOutcome::NonStandard(StatusCode::IM_A_TEAPOT), "non-standard status 418"),
        ];

        for (outcome, expected) in cases {
            let engine = engine(0).with_decision_service(Scripted::new(outcome));
            let (_, route) = engine.route(request(None, "")).await;
            assert_eq!(route.target, Target::Main);
            assert!(route.reason.contains(expected), "reason {:?}", route.reason);
        }
    }

    #[tokio::test]
    async fn test_body_restored_after_consultation() {
        let decision = Scripted::new(canary_outcome());
        let engine = engine(0).with_decision_service(decision.clone());

        let (restored, _) = engine.route(request(None, "payload-bytes")).await;

        assert_eq!(body_of(restored).await, "payload-bytes");
        assert_eq!(decision.bodies.lock().unwrap()[0], b"payload-bytes");
    }

    #[tokio::test]
    async fn test_oversized_body_falls_back_with_body_intact() {
        let decision = Scripted::new(canary_outcome());
        let engine = engine(0)
            .with_decision_service(decision.clone())
            .with_max_replay_bytes(4);

        let (restored, route) = engine.route(request(None, "0123456789")).await;

        assert_eq!(route.target, Target::Main);
        assert!(route.reason.contains("replay limit"));
        assert_eq!(decision.calls(), 0);
        assert_eq!(body_of(restored).await, "0123456789");
    }

    #[test]
    fn test_normalize_path() {
        let engine = engine(0).with_trim_prefix("/api");

        let req = Request::builder()
            .uri("/api/v1/orders?id=3")
            .body(Body::empty())
            .unwrap();
        let req = engine.normalize_path(req).unwrap();
        assert_eq!(req.uri(), "/v1/orders?id=3");

        let req = Request::builder().uri("/api").body(Body::empty()).unwrap();
        assert_eq!(engine.normalize_path(req).unwrap().uri(), "/");

        let req = Request::builder().uri("/other").body(Body::empty()).unwrap();
        assert_eq!(engine.normalize_path(req).unwrap().uri(), "/other");
    }
}
