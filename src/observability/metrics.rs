//! Metrics collection and exposition.
//!
//! # Metrics
//! - `canary_router_requests_total` (counter): requests by target, version, reason
//! - `canary_router_request_duration_seconds` (histogram): latency distribution
//! - `canary_router_decisions_total` (counter): decision service outcomes
//! - `canary_router_canary_quota_remaining` (gauge): admissions left
//!
//! # Design Decisions
//! - Uses the `metrics` facade; the Prometheus exporter is installed by the binary
//! - Without an installed recorder every call is a no-op

use std::net::SocketAddr;

use metrics::Label;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::observability::instrumentation::{Instrumentation, InstrumentationError};
use crate::routing::context::RoutingContext;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one decision service outcome.
pub fn record_decision(outcome: &'static str) {
    metrics::counter!("canary_router_decisions_total", "outcome" => outcome).increment(1);
}

/// Publish the remaining canary quota.
pub fn record_quota_remaining(remaining: u64) {
    metrics::gauge!("canary_router_canary_quota_remaining").set(remaining as f64);
}

/// Instrumentation backed by the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusInstrumentation;

impl Instrumentation for PrometheusInstrumentation {
    fn record_latency(&self, ctx: &RoutingContext) -> Result<(), InstrumentationError> {
        let elapsed = ctx.elapsed()?;
        let tags = ctx.tags().ok_or(InstrumentationError::Untracked)?;
        let target = tags.target.ok_or(InstrumentationError::MissingTarget)?;

        let labels = vec![
            Label::new("target", target.as_str()),
            Label::new("version", tags.version.clone().unwrap_or_default()),
            Label::new("reason", tags.reason.clone().unwrap_or_default()),
        ];

        metrics::counter!("canary_router_requests_total", labels.clone()).increment(1);
        metrics::histogram!("canary_router_request_duration_seconds", labels)
            .record(elapsed.as_secs_f64());
        Ok(())
    }
}
