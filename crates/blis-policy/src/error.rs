// blis-policy/src/error.rs
// ============================================================================
// Module: Policy Error
// Description: Failure raised while constructing or evaluating a policy.
// Purpose: `spec.md` §4.4: factories validate weights and return errors for
//          malformed configuration rather than abort.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Failure raised by policy construction or evaluation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    /// A weighted-composite configuration had no scorer with a positive
    /// weight.
    #[error("composite scorer configuration has no scorer with weight > 0")]
    NoPositiveWeight,
    /// A weighted-composite configuration named a negative weight.
    #[error("scorer {name:?} has negative weight {weight}")]
    NegativeWeight {
        /// The offending scorer's configured name.
        name: String,
        /// The negative weight value.
        weight: f64,
    },
    /// A configuration referenced a scorer name not in the catalogue.
    #[error("unknown scorer {name:?}")]
    UnknownScorer {
        /// The unrecognized name.
        name: String,
    },
    /// Routing was attempted against an empty snapshot set.
    #[error("routing attempted with no instance snapshots")]
    NoInstances,
}
