// blis-latency/src/lib.rs
// ============================================================================
// Module: BLIS Latency Backend Library
// Description: Public API surface for pluggable step-duration backends.
// Purpose: Expose the `LatencyBackend` trait plus the blackbox and roofline
//          implementations, decoupled from every other BLIS crate.
// Dependencies: crate::{step, traits, blackbox, roofline, error, coefficients}
// ============================================================================

//! ## Overview
//! `blis-latency` is the pure, deterministic function at the bottom of the
//! dependency order: `stepConfig -> microseconds` and
//! `(request, now) -> queueing overhead microseconds`. It depends on nothing
//! else in the workspace so it can be exercised, fuzzed, and benchmarked in
//! isolation, mirroring how `ret-logic` stood alone in the teacher
//! workspace. Callers (`blis-cluster`) own the request/instance types; this
//! crate only sees the small [`StepConfig`] value type.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod blackbox;
pub mod coefficients;
pub mod error;
pub mod roofline;
pub mod step;
pub mod traits;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use blackbox::BlackboxBackend;
pub use coefficients::BlackboxCoefficients;
pub use coefficients::CoefficientKey;
pub use coefficients::CoefficientTable;
pub use coefficients::RooflineCoefficients;
pub use error::BackendError;
pub use roofline::RooflineBackend;
pub use step::DecodeRequest;
pub use step::PrefillRequest;
pub use step::StepConfig;
pub use traits::LatencyBackend;
