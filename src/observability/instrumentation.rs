//! Instrumentation bridge.
//!
//! # Responsibilities
//! - Tag a request's routing context with target, version and reason
//! - Record request latency once the response is produced
//!
//! # Design Decisions
//! - Tagging lives in `RoutingContext`; implementations only decide where
//!   recorded latencies go
//! - Every operation is fallible; callers log failures and carry on

use crate::routing::context::{RoutingContext, Target};

/// Failure to tag or record a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentationError {
    #[error("latency tracking was not initialized for this request")]
    Untracked,

    #[error("cannot record latency before a target is attached")]
    MissingTarget,
}

/// Narrow observability interface called by the routing engine.
pub trait Instrumentation: Send + Sync {
    fn attach_reason(&self, ctx: &mut RoutingContext, reason: &str) -> Result<(), InstrumentationError> {
        ctx.tags_mut()?.reason = Some(reason.to_string());
        Ok(())
    }

    fn attach_target(&self, ctx: &mut RoutingContext, target: Target) -> Result<(), InstrumentationError> {
        ctx.tags_mut()?.target = Some(target);
        Ok(())
    }

    fn attach_version(&self, ctx: &mut RoutingContext, version: &str) -> Result<(), InstrumentationError> {
        ctx.tags_mut()?.version = Some(version.to_string());
        Ok(())
    }

    fn record_latency(&self, ctx: &RoutingContext) -> Result<(), InstrumentationError>;
}

/// Instrumentation that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInstrumentation;

impl Instrumentation for NoopInstrumentation {
    fn record_latency(&self, ctx: &RoutingContext) -> Result<(), InstrumentationError> {
        ctx.elapsed().map(|_| ())
    }
}
