// blis-config/src/lib.rs
// ============================================================================
// Module: BLIS Config Library
// Description: Strict YAML parsing and validation of the workload spec and
//              run configuration, plus the builder that resolves both into
//              a runnable simulation.
// Purpose: `spec.md` §6: own parsing/validation of the configuration
//          surface and assemble the `blis-cluster` simulator from it.
// Dependencies: blis_cluster, blis_core, blis_latency, blis_policy,
//               blis_trace, blis_workload, serde, serde_yaml, thiserror
// ============================================================================

//! ## Overview
//! `blis-config` is the one crate in this workspace that ever deserializes
//! user-supplied YAML. Every wire type here uses
//! `#[serde(deny_unknown_fields)]` and converts into an internal model via
//! an explicit `resolve` method, rather than deserializing straight into
//! `blis-workload`'s or `blis-cluster`'s own types — their field names
//! follow this codebase's internal conventions, not `spec.md` §6's wire
//! schema, and `blis-policy::RoutingKind` cannot derive `Deserialize` at
//! all once it holds boxed scorer trait objects. Invalid input is always a
//! [`ConfigError`], never a panic or an invariant violation, matching the
//! exit-code split in `spec.md` §7.

pub mod builder;
pub mod error;
pub mod run_config;
pub mod workload_yaml;

pub use builder::SharedRecorder;
pub use builder::SimulationBuilder;
pub use error::ConfigError;
pub use run_config::CacheConfigYaml;
pub use run_config::CoefficientRowYaml;
pub use run_config::RequestSourceYaml;
pub use run_config::RoutingConfigYaml;
pub use run_config::RunConfigYaml;
pub use run_config::ScorerWeightYaml;
pub use run_config::TraceLevelYaml;
pub use workload_yaml::WorkloadSpecYaml;
