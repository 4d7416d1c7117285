//! Client-supplied routing override.
//!
//! Only the exact values `"true"` and `"false"` count. Anything else, including
//! `"TRUE"`, `"1"` or an empty value, is treated as if the header were absent.

use axum::http::HeaderMap;

/// Name of the override header.
pub const X_CANARY: &str = "x-canary";

/// Parsed override header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override {
    /// `X-Canary: true`
    Canary,
    /// `X-Canary: false`
    Main,
    /// Header absent or not exactly `true`/`false`.
    NotPresent,
}

impl Override {
    /// Read the override from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match headers.get(X_CANARY).map(|v| v.as_bytes()) {
            Some(b"true") => Override::Canary,
            Some(b"false") => Override::Main,
            _ => Override::NotPresent,
        }
    }

    /// The literal header value that produced this override.
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            Override::Canary => Some("true"),
            Override::Main => Some("false"),
            Override::NotPresent => None,
        }
    }
}
