//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!     → consumed once at startup to build proxies, quota and engine
//! ```
//!
//! # Design Decisions
//! - Config is immutable for the process lifetime; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Decision status codes have no defaults; they belong to the decision service's contract
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CircuitBreakerConfig, ClientConfig, LogFormat, ObservabilityConfig, RouterConfig,
    ServerConfig, SidecarConfig, TargetConfig,
};
pub use validation::{validate_config, ValidationError};
