//! Canary quota limiter.
//!
//! # Responsibilities
//! - Hold the remaining number of requests allowed onto the canary target
//! - Admit atomically: decrement only while the count is above zero
//! - Never refill; exhaustion lasts until process restart
//!
//! # Design Decisions
//! - Lock-free: a single atomic counter, no lock held across I/O
//! - `remaining()` is an advisory pre-check; `try_admit()` is the binding gate
//! - Capacity 0 means unlimited

use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed budget of canary admissions shared by all concurrent requests.
#[derive(Debug)]
pub struct CanaryQuota {
    remaining: AtomicU64,
    limited: bool,
}

impl CanaryQuota {
    /// Create a quota of `capacity` admissions. A capacity of 0 is unlimited.
    pub fn new(capacity: u64) -> Self {
        Self {
            remaining: AtomicU64::new(capacity),
            limited: capacity != 0,
        }
    }

    /// A quota that admits every request.
    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Whether a finite capacity was configured.
    pub fn is_limited(&self) -> bool {
        self.limited
    }

    /// Remaining admissions, `None` when unlimited.
    ///
    /// The value may be stale as soon as it is returned.
    pub fn remaining(&self) -> Option<u64> {
        self.limited
            .then(|| self.remaining.load(Ordering::Acquire))
    }

    /// Cheap advisory check: true when a limited quota has nothing left.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Take one admission if any remain.
    pub fn try_admit(&self) -> bool {
        if !self.limited {
            return true;
        }
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}
