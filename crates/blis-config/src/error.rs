// blis-config/src/error.rs
// ============================================================================
// Module: Config Error
// Description: Failure types raised while loading and resolving
//              configuration.
// Purpose: `spec.md` §6/§7: invalid user input is always `ConfigError`
//          (exit 2), never an invariant violation.
// Dependencies: blis_cluster, blis_workload, serde_yaml, thiserror
// ============================================================================

//! ## Overview
//! Mirrors the teacher's `decision_gate_config::ConfigError` shape (`Io`/
//! `Parse`/`Invalid`), extended with `#[from]` variants for the two
//! downstream crates whose own validation a configuration can trigger:
//! `blis-workload`'s client-roster checks and `blis-cluster`'s builder
//! completeness checks.

use thiserror::Error;

/// Failure raised while loading or resolving a [`crate::run_config::RunConfig`]
/// or [`crate::workload_yaml::WorkloadSpecYaml`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading a configuration file.
    #[error("config io error: {0}")]
    Io(String),
    /// YAML parsing error, including unknown-field rejections.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Structurally valid but semantically invalid configuration (an
    /// out-of-range value, an unknown policy/scorer name).
    #[error("invalid config: {0}")]
    Invalid(String),
    /// The resolved workload spec failed `blis-workload`'s own validation.
    #[error("workload spec error: {0}")]
    Workload(#[from] blis_workload::WorkloadError),
    /// Assembling the cluster from resolved components failed.
    #[error("cluster assembly error: {0}")]
    Cluster(#[from] blis_cluster::ClusterError),
    /// A named scorer or weighted-composite configuration was invalid.
    #[error("policy error: {0}")]
    Policy(#[from] blis_policy::PolicyError),
}
