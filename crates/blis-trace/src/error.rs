// blis-trace/src/error.rs
// ============================================================================
// Module: Trace Error
// Description: Failure types raised while building the results contract.
// Purpose: `spec.md` §7's error table: a trace/metrics problem is always a
//          configuration or programming error, never routine back-pressure.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Failure raised while aggregating a run's results.
#[derive(Debug, Error)]
pub enum TraceError {
    /// `counterfactual_k` was requested but no routing decisions were
    /// recorded because the configured trace level was below `decisions`.
    #[error("counterfactual regret requested but trace level is below 'decisions'")]
    RegretUnavailable,
}
