//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path already trimmed, headers, body)
//!     → override_header.rs (X-Canary: exactly "true"/"false")
//!     → quota.rs (advisory pre-check)
//!     → decision.rs (replay to decision service, interpret status)
//!     → quota.rs (binding admit)
//!     → Return: Route { target, reason }
//!
//! Engine construction (at startup):
//!     RouterConfig
//!     → build main/canary/decision proxies
//!     → fixed CanaryQuota
//!     → Freeze as immutable RoutingEngine
//! ```
//!
//! # Design Decisions
//! - Engine immutable at runtime; the quota counter is the only shared mutable state
//! - Every fallback goes to main
//! - Each route carries a human-readable reason for operators

pub mod context;
pub mod decision;
pub mod engine;
pub mod override_header;
pub mod quota;

pub use context::{Route, RoutingContext, Target};
pub use decision::{DecisionClient, DecisionOutcome, DecisionService};
pub use engine::RoutingEngine;
pub use override_header::{Override, X_CANARY};
pub use quota::CanaryQuota;
