//! Per-request routing context.

use std::fmt;
use std::time::{Duration, Instant};

use crate::observability::instrumentation::InstrumentationError;

/// Backend a request is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Main,
    Canary,
}

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Target::Main => "main",
            Target::Canary => "canary",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tags attached to a tracked request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTags {
    pub target: Option<Target>,
    pub version: Option<String>,
    pub reason: Option<String>,
}

/// Request-scoped routing state: latency start marker plus observability tags.
///
/// Created at request entry and dropped with the response. Never shared.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    tracking: Option<(Instant, RoutingTags)>,
}

impl RoutingContext {
    /// A context with latency tracking started now.
    pub fn tracked() -> Self {
        Self {
            tracking: Some((Instant::now(), RoutingTags::default())),
        }
    }

    /// A context without tracking. Tagging it fails.
    pub fn untracked() -> Self {
        Self::default()
    }

    pub fn is_tracked(&self) -> bool {
        self.tracking.is_some()
    }

    pub fn tags(&self) -> Option<&RoutingTags> {
        self.tracking.as_ref().map(|(_, tags)| tags)
    }

    pub fn tags_mut(&mut self) -> Result<&mut RoutingTags, InstrumentationError> {
        self.tracking
            .as_mut()
            .map(|(_, tags)| tags)
            .ok_or(InstrumentationError::Untracked)
    }

    /// Time since tracking started.
    pub fn elapsed(&self) -> Result<Duration, InstrumentationError> {
        self.tracking
            .as_ref()
            .map(|(start, _)| start.elapsed())
            .ok_or(InstrumentationError::Untracked)
    }
}

/// Final routing choice for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub target: Target,
    pub reason: String,
}

impl Route {
    pub fn main(reason: impl Into<String>) -> Self {
        Self {
            target: Target::Main,
            reason: reason.into(),
        }
    }

    pub fn canary(reason: impl Into<String>) -> Self {
        Self {
            target: Target::Canary,
            reason: reason.into(),
        }
    }
}
