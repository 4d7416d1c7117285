//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Routing engine produces:
//!     → logging.rs (structured log events)
//!     → instrumentation.rs (target/version/reason tags, latency)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows from the inbound request to every backend
//! - Instrumentation failures never abort a request

pub mod instrumentation;
pub mod logging;
pub mod metrics;

pub use instrumentation::{Instrumentation, InstrumentationError, NoopInstrumentation};
pub use metrics::PrometheusInstrumentation;
