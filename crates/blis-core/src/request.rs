// blis-core/src/request.rs
// ============================================================================
// Module: Request Lifecycle
// Description: The `Request` record and its lifecycle state machine.
// Purpose: Model a single inference request from workload-stream creation
//          through completion or rejection.
// Dependencies: crate::ids, crate::time
// ============================================================================

//! ## Overview
//! A `Request` is owned by exactly one of: the workload stream (before
//! arrival), the cluster admission buffer (at its arrival instant), an
//! instance wait-queue, or an instance running batch — never two at once.
//! Ownership transfer is enforced by the crates that move requests between
//! those containers (`blis-cluster`), not by this type; `Request` itself is
//! a plain data record plus the lifecycle edge validation in
//! [`RequestState::can_transition_to`].

use serde::Deserialize;
use serde::Serialize;

use crate::ids::ClientId;
use crate::ids::PrefixGroupId;
use crate::ids::RequestId;
use crate::ids::SessionId;
use crate::ids::SloClass;
use crate::ids::TenantId;
use crate::time::Microseconds;

// ============================================================================
// SECTION: Lifecycle State
// ============================================================================

/// Lifecycle state of a request.
///
/// There is no separate `Preempted` variant: a preemption is the
/// instantaneous `Running -> Queued` edge below, matching how a preempted
/// request rejoins the wait-queue in the very same step it is evicted (see
/// `DESIGN.md`'s blis-cluster section for why this collapse is deliberate).
///
/// # Invariants
/// - Legal edges (INV-2): `Queued -> Running`, `Running -> Completed`,
///   `Queued -> Rejected` (admission only), `Running -> Queued` with
///   `progress` reset to zero (preemption only). Any other transition is a
///   programming error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Waiting in an instance's wait-queue (or not yet absorbed).
    Queued,
    /// Admitted into an instance's running batch.
    Running,
    /// All planned output tokens have been emitted.
    Completed,
    /// Rejected by the admission policy before routing.
    Rejected,
}

impl RequestState {
    /// Returns whether a transition from `self` to `next` is a legal
    /// lifecycle edge.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Queued, Self::Rejected)
                | (Self::Running, Self::Queued)
        )
    }
}

// ============================================================================
// SECTION: Multi-Turn Context
// ============================================================================

/// Links a request to the multi-turn session it belongs to, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnContext {
    /// Session this request's conversation belongs to.
    pub session_id: SessionId,
    /// Zero-based round number within the session.
    pub round: u32,
}

// ============================================================================
// SECTION: Request Record
// ============================================================================

/// A single inference request tracked end-to-end by the simulator.
///
/// # Invariants
/// - `progress <= planned_output_tokens`.
/// - `progress == 0` whenever `state == RequestState::Queued` and the
///   request has never run (first arrival) or was just preempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Deterministic, globally unique request identifier.
    pub id: RequestId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Workload-spec client that generated this request.
    pub client_id: ClientId,
    /// SLO class used by admission, scheduling, and priority policies.
    pub slo_class: SloClass,
    /// Input token sequence (prompt + accumulated multi-turn context).
    pub input_tokens: Vec<u64>,
    /// Planned number of output tokens to emit.
    pub planned_output_tokens: u32,
    /// Simulated arrival timestamp.
    pub arrival_time: Microseconds,
    /// Current lifecycle state.
    pub state: RequestState,
    /// Count of output tokens already emitted (prefill chunks count toward
    /// this once the covered input range has been processed is tracked
    /// separately by the batch formation procedure; this field is the
    /// decode-token progress index described in `spec.md` §3).
    pub progress: u32,
    /// Priority score, recomputed at every batch formation pass.
    pub priority: f64,
    /// Optional prefix-group label shared by requests with identical
    /// leading token blocks.
    pub prefix_group: Option<PrefixGroupId>,
    /// Multi-turn session linkage, if this request is part of a session.
    pub turn: Option<TurnContext>,
    /// Count of times this request has been preempted.
    pub preemption_count: u32,
    /// Simulated timestamp of the first emitted token, set once.
    pub first_token_time: Option<Microseconds>,
    /// Simulated timestamp of completion, set once.
    pub completion_time: Option<Microseconds>,
}

impl Request {
    /// Returns the number of input tokens.
    #[must_use]
    pub fn input_len(&self) -> usize {
        self.input_tokens.len()
    }

    /// Returns whether this request has reached its planned output length.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.progress >= self.planned_output_tokens
    }

    /// Resets progress and first-token bookkeeping for a full re-prefill
    /// after preemption. `completion_time` is untouched since a preempted
    /// request was never completed.
    pub fn reset_for_preemption(&mut self) {
        self.progress = 0;
        self.first_token_time = None;
        self.preemption_count += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests assert directly on fixture data")]
mod tests {
    use super::*;

    #[test]
    fn legal_edges_are_accepted() {
        assert!(RequestState::Queued.can_transition_to(RequestState::Running));
        assert!(RequestState::Running.can_transition_to(RequestState::Completed));
        assert!(RequestState::Queued.can_transition_to(RequestState::Rejected));
        assert!(RequestState::Running.can_transition_to(RequestState::Queued));
    }

    #[test]
    fn illegal_edges_are_rejected() {
        assert!(!RequestState::Completed.can_transition_to(RequestState::Running));
        assert!(!RequestState::Rejected.can_transition_to(RequestState::Running));
        assert!(!RequestState::Queued.can_transition_to(RequestState::Completed));
    }

    #[test]
    fn is_done_reflects_progress() {
        let mut req = sample_request();
        assert!(!req.is_done());
        req.progress = req.planned_output_tokens;
        assert!(req.is_done());
    }

    #[test]
    fn preemption_resets_progress_and_counts() {
        let mut req = sample_request();
        req.progress = 5;
        req.first_token_time = Some(Microseconds::new(100));
        req.reset_for_preemption();
        assert_eq!(req.progress, 0);
        assert_eq!(req.first_token_time, None);
        assert_eq!(req.preemption_count, 1);
    }

    fn sample_request() -> Request {
        Request {
            id: RequestId(1),
            tenant_id: TenantId("t0".to_owned()),
            client_id: ClientId("c0".to_owned()),
            slo_class: SloClass::Interactive,
            input_tokens: vec![1, 2, 3],
            planned_output_tokens: 10,
            arrival_time: Microseconds::ZERO,
            state: RequestState::Queued,
            progress: 0,
            priority: 0.0,
            prefix_group: None,
            turn: None,
            preemption_count: 0,
            first_token_time: None,
            completion_time: None,
        }
    }
}
