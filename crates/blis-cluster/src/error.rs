// blis-cluster/src/error.rs
// ============================================================================
// Module: Cluster Error
// Description: Failure types the cluster event loop can raise.
// Purpose: `spec.md` §7's error table: invariant violations abort the run
//          (exit 1); expected back-pressure (allocation failure,
//          admission rejection, preemption) is never an error and never
//          reaches this type.
// Dependencies: thiserror, blis_core, blis_kv, blis_latency, blis_policy
// ============================================================================

//! ## Overview
//! Mirrors the teacher's `decision-gate-broker::BrokerError` shape: one
//! enum composing the failure types of every crate this one wires
//! together via `#[from]`, plus a handful of variants local to the event
//! loop itself. Every variant here is a bug or a configuration problem
//! that must abort the run; routine back-pressure (a failed KV
//! allocation that triggers preemption, an admission rejection) is
//! handled internally and never constructed as a [`ClusterError`].

use blis_core::InvariantViolation;
use blis_core::ids::InstanceId;
use blis_core::ids::RequestId;
use blis_kv::KvError;
use blis_latency::BackendError;
use blis_policy::PolicyError;
use thiserror::Error;

/// Failure raised by the cluster event loop.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A simulator invariant (conservation, clock monotonicity, KV
    /// accounting, lifecycle edge) was violated. This is always a bug.
    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
    /// A policy factory or routing evaluation failed.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
    /// A KV cache's conservation check failed outside the expected
    /// allocation-failure back-pressure path.
    #[error("kv cache error: {0}")]
    Kv(#[from] KvError),
    /// The configured latency backend could not price a step (missing
    /// coefficients); this is a configuration-time problem, not runtime
    /// back-pressure.
    #[error("latency backend error: {0}")]
    Backend(#[from] BackendError),
    /// Batch formation exhausted its bounded re-admission attempts for
    /// one `StepTick` without making progress (`spec.md` §9: preemption
    /// cascade guard).
    #[error("preemption cascade on {instance_id} while admitting {request_id}: exceeded {limit} attempts")]
    PreemptionCascade {
        /// The instance where the cascade occurred.
        instance_id: InstanceId,
        /// The request that could not be admitted.
        request_id: RequestId,
        /// The configured bound that was exceeded.
        limit: u32,
    },
    /// An event referenced a request that the in-flight admission/routing
    /// buffer did not hold. Always a bug in the event loop's buffer
    /// bookkeeping, never triggered by routine back-pressure.
    #[error("request {0} missing from in-flight buffer")]
    BufferInconsistency(RequestId),
    /// [`crate::builder::ClusterBuilder`] was asked to build without any
    /// instances configured.
    #[error("cluster builder has no instances configured")]
    NoInstances,
    /// [`crate::builder::ClusterBuilder`] is missing a required field.
    #[error("cluster builder is missing required field: {0}")]
    BuilderIncomplete(&'static str),
}
