// blis-latency/src/traits.rs
// ============================================================================
// Module: Latency Backend Contract
// Description: The pure-function trait every step-duration implementation
//              satisfies.
// Purpose: Let `blis-cluster` swap blackbox/roofline backends without
//          knowing which one is in effect, per `spec.md` §4.6.
// Dependencies: crate::{step, error}
// ============================================================================

//! ## Overview
//! A `LatencyBackend` prices exactly two quantities, both pure functions of
//! their inputs: the wall-clock duration of one batch step, and the extra
//! queueing overhead folded into a request's time-to-first-token. Backends
//! MUST be deterministic — same inputs, same microseconds, every call.

use crate::error::BackendError;
use crate::step::StepConfig;

/// Microseconds, kept as a bare `u64` in this crate to stay independent of
/// `blis-core`'s newtype of the same name.
pub type Microseconds = u64;

/// Shape of a single request as seen by `queueing_overhead`: only the
/// fields that influence queueing delay are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueingContext {
    /// Total input (prompt) token count of the request.
    pub input_len: u32,
}

/// A pluggable, pure, deterministic pricing function for batch steps and
/// queueing overhead.
///
/// # Invariants
/// - Calling either method twice with identical inputs returns identical
///   output (no hidden RNG, no wall-clock reads).
pub trait LatencyBackend {
    /// Prices the duration of one batch step.
    ///
    /// # Errors
    /// Returns [`BackendError`] if `step_config` cannot be priced (e.g. no
    /// coefficient row matches, or the step has no participants).
    fn step_time(&self, step_config: &StepConfig) -> Result<Microseconds, BackendError>;

    /// Prices the queueing overhead added to a request's time-to-first-token.
    ///
    /// # Errors
    /// Returns [`BackendError`] if no coefficient row matches this backend's
    /// configured key.
    fn queueing_overhead(
        &self,
        context: QueueingContext,
        now: Microseconds,
    ) -> Result<Microseconds, BackendError>;
}
