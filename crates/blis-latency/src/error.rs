// blis-latency/src/error.rs
// ============================================================================
// Module: Backend Error
// Description: The error a backend raises when it cannot price a step.
// Purpose: Distinguish missing-coefficient lookups from malformed input so
//          callers can tell a config problem from a backend bug.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Failure raised by a [`crate::LatencyBackend`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No coefficient row matched the requested `(model, hardware, tp)`
    /// key.
    #[error("no coefficients for model={model:?} hardware={hardware:?} tp={tp}")]
    MissingCoefficients {
        /// The model identifier that was looked up.
        model: String,
        /// The hardware identifier that was looked up.
        hardware: String,
        /// The tensor-parallel degree that was looked up.
        tp: u32,
    },
    /// A `StepConfig` was empty (no prefill and no decode participants);
    /// backends have nothing to price.
    #[error("step config has no prefill or decode participants")]
    EmptyStep,
}
