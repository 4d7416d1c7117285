//! Canary deployment traffic router.
//!
//! Sits in front of a stable ("main") and a candidate ("canary") deployment
//! of the same service and decides per request where it goes: an explicit
//! `X-Canary` header wins, otherwise an optional decision service is asked,
//! and the number of canary admissions is capped for the process lifetime.
//! Every failure routes to main.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::RouterConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::RoutingEngine;
