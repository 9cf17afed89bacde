// blis-workload/src/spec.rs
// ============================================================================
// Module: Workload Specification
// Description: The declarative DSL a workload is described by.
// Purpose: `spec.md` §4.5: clients, rate fractions, arrival/length
//          distributions, prefix groups, multi-turn sessions.
// Dependencies: crate::distributions, blis_core, serde
// ============================================================================

use blis_core::ids::PrefixGroupId;
use blis_core::ids::SloClass;
use blis_core::ids::TenantId;
use serde::Deserialize;
use serde::Serialize;

use std::collections::HashSet;

use crate::distributions::ArrivalProcess;
use crate::distributions::LengthDistribution;
use crate::error::WorkloadError;

/// How a multi-turn session's input context grows between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextGrowth {
    /// Each round's input is the entire prior context plus new user
    /// tokens.
    Accumulate,
    /// Each round's input is only the new user tokens.
    Fresh,
}

/// A multi-turn conversation block attached to a client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiTurnSpec {
    /// Maximum number of rounds in a session before it ends.
    pub max_rounds: u32,
    /// Simulated time between a round's completion and the next round's
    /// arrival, in microseconds.
    pub think_time_us: u64,
    /// How input context accumulates across rounds.
    pub growth: ContextGrowth,
}

/// An optional shared-prefix assignment for a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixGroupSpec {
    /// The group label; requests sharing a label sample identical prefix
    /// tokens.
    pub group: PrefixGroupId,
    /// Number of leading tokens drawn from the shared prefix stream.
    pub prefix_length: u32,
}

/// One client in a workload spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSpec {
    /// Stable client identifier, used to derive this client's RNG
    /// partition.
    pub id: u64,
    /// Owning tenant.
    pub tenant: TenantId,
    /// Service-level-objective class for every request this client emits.
    pub slo_class: SloClass,
    /// This client's share of the workload's aggregate arrival rate; the
    /// sum across all clients need not equal 1.0 (each client's absolute
    /// rate is `aggregate_rate * rate_fraction`).
    pub rate_fraction: f64,
    /// The inter-arrival process driving this client's requests.
    pub arrival_process: ArrivalProcess,
    /// Input (prompt) token length distribution.
    pub input_length: LengthDistribution,
    /// Planned output token length distribution.
    pub output_length: LengthDistribution,
    /// Optional shared-prefix assignment.
    pub prefix_group: Option<PrefixGroupSpec>,
    /// Optional multi-turn session behavior.
    pub multi_turn: Option<MultiTurnSpec>,
}

/// A complete workload specification: aggregate rate plus a roster of
/// independent clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Aggregate arrival rate across all clients, in requests/second.
    pub aggregate_rate: f64,
    /// The workload's own seed, overridden by a CLI-supplied seed when one
    /// is given (`spec.md` §4.5 determinism contract).
    pub seed: u64,
    /// The client roster.
    pub clients: Vec<ClientSpec>,
}

impl WorkloadSpec {
    /// Validates structural invariants a [`crate::generator::WorkloadGenerator`]
    /// relies on: at least one client, every rate fraction strictly
    /// positive, and unique client ids.
    ///
    /// # Errors
    /// Returns the first [`WorkloadError`] found.
    pub fn validate(&self) -> Result<(), WorkloadError> {
        if self.clients.is_empty() {
            return Err(WorkloadError::NoClients);
        }
        let mut seen = HashSet::new();
        for client in &self.clients {
            if client.rate_fraction <= 0.0 {
                return Err(WorkloadError::NonPositiveRateFraction {
                    client_id: client.id,
                    rate_fraction: client.rate_fraction,
                });
            }
            if !seen.insert(client.id) {
                return Err(WorkloadError::DuplicateClientId { client_id: client.id });
            }
        }
        Ok(())
    }
}
