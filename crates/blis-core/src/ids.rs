// blis-core/src/ids.rs
// ============================================================================
// Module: BLIS Identifiers
// Description: Canonical opaque identifiers and the SLO-class enumeration.
// Purpose: Provide strongly typed, serializable IDs with stable integer or
//          string forms, matching the deterministic-integer request id
//          required by the data model.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are newtypes over small integers or strings. Request ids are
//! deterministic `u64` counters assigned by the workload stream in arrival
//! order; instance ids are dense `u32` indices (`0..num_instances`) so that
//! "first instance in snapshot order" ties directly to numeric order, per
//! the tie-breaking rule in `spec.md` §4.4/§9.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Unique, deterministically assigned request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Dense instance index, `0..num_instances`.
///
/// # Invariants
/// - Instance ids equal snapshot array position, so argmax/least-loaded
///   tie-breaking by "first in snapshot order" is equivalent to breaking
///   ties by ascending `InstanceId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub u32);

impl InstanceId {
    /// Returns the id as a `usize` array index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance-{}", self.0)
    }
}

/// Workload-spec client identifier, scoped to a single workload run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Tenant identifier, carried through admission and per-tenant metrics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Prefix-group label shared by requests that should hash to the same
/// leading blocks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefixGroupId(pub String);

/// Multi-turn session identifier linking a chain of follow-up arrivals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

/// SLO class of a request, extensible beyond the three built-in tiers.
///
/// # Invariants
/// - `Realtime < Interactive < Batch` is the priority ordering used by
///   SLO-tiered scheduling; `Custom` classes are ordered by their numeric
///   rank and sort after the three built-ins of equal rank.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SloClass {
    /// Lowest acceptable latency tier.
    Realtime,
    /// Mid-tier interactive traffic.
    Interactive,
    /// Best-effort, latency-insensitive traffic.
    Batch,
    /// Operator-defined class with an explicit priority rank (lower sorts
    /// earlier, matching the built-in tiers' relative order when ranks are
    /// chosen in `[0, 2]`).
    Custom {
        /// Operator-chosen class name, used in per-SLO-class metric keys.
        name: String,
        /// Explicit priority rank for ordering against the built-in tiers.
        rank: u8,
    },
}

impl SloClass {
    /// Returns a stable sort/report key for this class.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Realtime => "realtime".to_owned(),
            Self::Interactive => "interactive".to_owned(),
            Self::Batch => "batch".to_owned(),
            Self::Custom { name, .. } => name.clone(),
        }
    }

    /// Returns the numeric priority rank used for tiered scheduling
    /// (`0` = highest priority).
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Realtime => 0,
            Self::Interactive => 1,
            Self::Batch => 2,
            Self::Custom { rank, .. } => *rank,
        }
    }
}

impl fmt::Display for SloClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
