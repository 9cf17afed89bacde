// blis-workload/src/error.rs
// ============================================================================
// Module: Workload Error
// Description: Failure raised while validating a workload specification.
// Purpose: Reject malformed specs before generation rather than panicking
//          mid-run.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Failure raised by [`crate::spec::WorkloadSpec`] validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkloadError {
    /// No clients were configured.
    #[error("workload spec has no clients")]
    NoClients,
    /// A client's rate fraction was not strictly positive.
    #[error("client {client_id} has non-positive rate fraction {rate_fraction}")]
    NonPositiveRateFraction {
        /// The offending client's id.
        client_id: u64,
        /// The rate fraction that failed validation.
        rate_fraction: f64,
    },
    /// Two clients shared the same id.
    #[error("duplicate client id {client_id}")]
    DuplicateClientId {
        /// The repeated id.
        client_id: u64,
    },
}
