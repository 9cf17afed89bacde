// blis-kv/src/error.rs
// ============================================================================
// Module: KV Cache Error
// Description: Failure and invariant-violation types raised by the KV
//              cache implementations.
// Purpose: Distinguish expected back-pressure (allocation failure) from a
//          broken internal invariant, mirroring `blis-core::InvariantViolation`.
// Dependencies: thiserror, blis-core
// ============================================================================

use blis_core::InstanceId;
use thiserror::Error;

/// Failure raised by a KV cache operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KvError {
    /// No free or evictable block was available to satisfy an allocation.
    /// This is expected back-pressure, not a bug; callers preempt and
    /// retry.
    #[error("no free or evictable block available on {instance_id}")]
    AllocationFailed {
        /// The instance whose cache could not satisfy the request.
        instance_id: InstanceId,
    },
    /// Block accounting does not balance
    /// (`blocks_in_use + blocks_free != capacity`).
    #[error("KV accounting imbalance on {instance_id}: {detail}")]
    Imbalance {
        /// The instance whose accounting is broken.
        instance_id: InstanceId,
        /// Human-readable detail of which equality failed.
        detail: String,
    },
}
