//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check target URLs are absolute plain-HTTP URLs with a host
//! - Check decision status codes are present, distinct and not reserved
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::StatusCode;
use url::Url;

use crate::config::schema::RouterConfig;
use crate::routing::decision::STATUS_SIDECAR_ERROR;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be set")]
    Missing { field: &'static str },

    #[error("{field} is not a valid URL ({value}): {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field} must be a valid HTTP status code, got {value}")]
    InvalidStatus { field: &'static str, value: u16 },

    #[error("{field} must not be {reserved}, it is reserved for decision service errors")]
    ReservedStatus { field: &'static str, reserved: u16 },

    #[error("sidecar.main_status and sidecar.canary_status must differ (both {0})")]
    DuplicateStatus(u16),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must start with '/', got {value:?}")]
    NotAbsolutePath { field: &'static str, value: String },

    #[error("server.bind_address is not a socket address: {0}")]
    InvalidBindAddress(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_target_url("main.url", &config.main.url, &mut errors);
    check_target_url("canary.url", &config.canary.url, &mut errors);

    if config.sidecar.is_enabled() {
        check_target_url("sidecar.url", &config.sidecar.url, &mut errors);

        let main = check_status("sidecar.main_status", config.sidecar.main_status, &mut errors);
        let canary = check_status("sidecar.canary_status", config.sidecar.canary_status, &mut errors);
        if let (Some(main), Some(canary)) = (main, canary) {
            if main == canary {
                errors.push(ValidationError::DuplicateStatus(main));
            }
        }
    }

    if config.sidecar.max_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "sidecar.max_body_bytes" });
    }

    if config.server.read_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "server.read_timeout_secs" });
    }
    if config.server.write_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "server.write_timeout_secs" });
    }
    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.server.bind_address.clone()));
    }

    check_path("server.health_path", &config.server.health_path, false, &mut errors);
    check_path("trim_prefix", &config.trim_prefix, true, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse an upstream URL, accepting only absolute `http` URLs with a host.
pub(crate) fn parse_target_url(value: &str) -> Result<Url, String> {
    let url = Url::parse(value).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme {:?}, only http is supported", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(url)
}

fn check_target_url(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.is_empty() {
        errors.push(ValidationError::Missing { field });
        return;
    }
    if let Err(reason) = parse_target_url(value) {
        errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
            reason,
        });
    }
}

fn check_status(
    field: &'static str,
    value: Option<u16>,
    errors: &mut Vec<ValidationError>,
) -> Option<u16> {
    let Some(code) = value else {
        errors.push(ValidationError::Missing { field });
        return None;
    };
    if StatusCode::from_u16(code).is_err() {
        errors.push(ValidationError::InvalidStatus { field, value: code });
        return None;
    }
    if code == STATUS_SIDECAR_ERROR.as_u16() {
        errors.push(ValidationError::ReservedStatus {
            field,
            reserved: code,
        });
        return None;
    }
    Some(code)
}

fn check_path(field: &'static str, value: &str, allow_empty: bool, errors: &mut Vec<ValidationError>) {
    if value.is_empty() && allow_empty {
        return;
    }
    if !value.starts_with('/') {
        errors.push(ValidationError::NotAbsolutePath {
            field,
            value: value.to_string(),
        });
    }
}
