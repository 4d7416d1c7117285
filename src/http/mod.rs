//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeouts)
//!     → guard.rs (panic isolation for the whole pipeline)
//!     → [routing engine decides main or canary]
//!         → body.rs (replicate body for the decision service)
//!         → proxy.rs (decision service call, captured in memory)
//!     → proxy.rs (forward to the chosen backend)
//!     → Send to client
//! ```

pub mod body;
pub mod guard;
pub mod proxy;
pub mod request;
pub mod server;

pub use proxy::{ForwardingProxy, ProxyError};
pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{build_router, AppState, HttpServer};
