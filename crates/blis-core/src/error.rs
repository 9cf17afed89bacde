// blis-core/src/error.rs
// ============================================================================
// Module: Invariant Violation
// Description: The single error type a simulator handler raises when an
//              internal invariant is broken.
// Purpose: Distinguish programming-error abort conditions from expected
//          runtime back-pressure, per `spec.md` §7.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! `InvariantViolation` is raised only for conditions `spec.md` §4.1/§7
//! classify as simulator bugs: a handler scheduling an event in the past, a
//! request crossing a forbidden lifecycle edge, or KV block accounting that
//! does not balance. Expected runtime conditions (allocation failure,
//! admission rejection, preemption) are never represented by this type —
//! they are counted in metrics instead.

use thiserror::Error;

use crate::ids::InstanceId;
use crate::ids::RequestId;
use crate::request::RequestState;
use crate::time::Microseconds;

/// A broken core invariant. Raising this aborts the run (exit code 1).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A handler attempted to schedule an event strictly before the
    /// current clock.
    #[error("scheduled event at {attempted} before current clock {clock}")]
    EventInPast {
        /// The timestamp the handler attempted to schedule at.
        attempted: Microseconds,
        /// The current simulated clock.
        clock: Microseconds,
    },
    /// A request attempted an illegal lifecycle transition.
    #[error("request {request_id} attempted illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// The request that attempted the transition.
        request_id: RequestId,
        /// The state it was in.
        from: RequestState,
        /// The state it attempted to move to.
        to: RequestState,
    },
    /// An instance's KV block accounting does not balance
    /// (`blocks_in_use + blocks_free != capacity`, or the sum of per-request
    /// holdings does not equal `blocks_in_use`).
    #[error("KV accounting imbalance on {instance_id}: {detail}")]
    KvImbalance {
        /// The instance whose accounting is broken.
        instance_id: InstanceId,
        /// Human-readable detail of which equality failed.
        detail: String,
    },
    /// The cluster-wide request count does not conserve
    /// (`injected != completed + queued + running + rejected`).
    #[error("conservation violated: injected={injected} completed={completed} queued={queued} running={running} rejected={rejected}")]
    ConservationViolated {
        /// Total requests injected by the workload stream.
        injected: u64,
        /// Total completed.
        completed: u64,
        /// Total still queued at run end.
        queued: u64,
        /// Total still running at run end.
        running: u64,
        /// Total rejected at admission.
        rejected: u64,
    },
}
