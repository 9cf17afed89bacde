// blis-trace/src/lib.rs
// ============================================================================
// Module: BLIS Trace Recorder Library
// Description: Aggregates per-run telemetry from the cluster event loop into
//              the published results contract.
// Purpose: `spec.md` §4.7/§6: counterfactual regret, Jain fairness, and the
//          metrics JSON a run publishes on stdout.
// Dependencies: blis_cluster, blis_core, blis_policy, serde, serde_json,
//               thiserror
// ============================================================================

//! ## Overview
//! This crate is the one concrete [`blis_cluster::trace_sink::TraceSink`]
//! consumer in the workspace: [`recorder::Recorder`] implements it, turning
//! the event loop's routing and completion callbacks into the aggregate
//! metrics, per-SLO-class breakdowns, and trace summary `spec.md` §6 calls
//! the results contract.

pub mod error;
pub mod recorder;
pub mod regret;
pub mod results;

pub use error::TraceError;
pub use recorder::Recorder;
pub use recorder::TraceLevel;
pub use regret::DecisionRegret;
pub use regret::decision_regret;
pub use regret::jain_fairness_index;
pub use results::AggregateMetrics;
pub use results::InstanceResults;
pub use results::Results;
pub use results::SloClassResults;
pub use results::TraceSummary;
