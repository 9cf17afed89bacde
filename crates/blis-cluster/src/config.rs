// blis-cluster/src/config.rs
// ============================================================================
// Module: Cluster Configuration
// Description: Resolved, already-validated knobs the event loop needs.
// Purpose: `spec.md` §6's external configuration surface, minus the parts
//          (policy/scorer names, YAML) that belong to the not-yet-built
//          `blis-config` crate; this struct takes already-resolved values.
// Dependencies: blis_core
// ============================================================================

//! ## Overview
//! `ClusterConfig` is deliberately a plain value struct, not a builder: the
//! caller (eventually `blis-config`, loading from YAML/CLI flags) is
//! responsible for validating ranges before constructing one. The cluster
//! crate trusts its fields are already sane, matching the config-boundary
//! split in `spec.md` §7 (user-input validation happens at the boundary,
//! not deep inside the simulator core).

use blis_core::Microseconds;

/// Per-run knobs the event loop consults every `StepTick` or
/// `SnapshotRefresh`.
#[derive(Debug, Clone, Copy)]
pub struct ClusterConfig {
    /// Number of instances in the cluster.
    pub instance_count: u32,
    /// Prefix block size, in tokens, shared by every instance's KV cache.
    pub prefix_block_size: usize,
    /// Per-step token budget `B`.
    pub step_token_budget: u32,
    /// Max concurrently running requests per instance, `R`.
    pub max_running_requests: u32,
    /// How often `SnapshotRefresh` recomputes the stale KV-utilization
    /// field.
    pub snapshot_refresh_interval: Microseconds,
    /// Bound on re-admission attempts per `StepTick` before a preemption
    /// cascade aborts the run (`spec.md` §9; default is ten times the
    /// running-batch size, computed by the caller and passed in here).
    pub max_preemption_attempts: u32,
    /// Simulated horizon: the run stops scheduling new work past this
    /// timestamp.
    pub horizon: Microseconds,
}

impl ClusterConfig {
    /// Default preemption-attempt multiplier applied to a batch's running
    /// size when the caller has not overridden it (`spec.md` §9).
    pub const DEFAULT_PREEMPTION_MULTIPLIER: u32 = 10;

    /// Computes the default bound for `max_preemption_attempts` given a
    /// configured `max_running_requests`.
    #[must_use]
    pub const fn default_preemption_attempts(max_running_requests: u32) -> u32 {
        max_running_requests.saturating_mul(Self::DEFAULT_PREEMPTION_MULTIPLIER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_preemption_attempts_is_ten_times_running_cap() {
        assert_eq!(ClusterConfig::default_preemption_attempts(8), 80);
    }
}
