// blis-workload/src/generator.rs
// ============================================================================
// Module: Workload Generator
// Description: Turns a `WorkloadSpec` into an ordered stream of arrivals
//              plus a multi-turn continuation hook for the cluster.
// Purpose: `spec.md` §4.5 generation contract and determinism contract.
// Dependencies: crate::{spec, content, distributions}, blis_core
// ============================================================================

//! ## Overview
//! [`WorkloadGenerator::generate_arrivals`] produces every first-round
//! arrival up front, since first-round timestamps depend only on the
//! client's own arrival process — never on simulation state. Multi-turn
//! follow-ups cannot be precomputed this way because `completion_time` is
//! only known once the simulator actually runs a session's round, so
//! [`WorkloadGenerator::spawn_followup`] is called by the cluster at
//! Completion time instead and returns the next round's arrival, if the
//! session has rounds remaining.

use std::collections::HashMap;

use blis_core::ClientId;
use blis_core::Microseconds;
use blis_core::Request;
use blis_core::RequestId;
use blis_core::RequestState;
use blis_core::SessionId;
use blis_core::request::TurnContext;
use blis_core::rng::RngPartition;
use blis_core::rng::RngStreams;

use crate::content::ContentGenerator;
use crate::content::fnv1a;
use crate::spec::ClientSpec;
use crate::spec::ContextGrowth;
use crate::spec::WorkloadSpec;

/// One generated arrival: the request itself plus its arrival timestamp.
#[derive(Debug, Clone)]
pub struct GeneratedArrival {
    /// The request to inject as a `ClusterArrival` event.
    pub request: Request,
    /// Simulated arrival timestamp.
    pub arrival_time: Microseconds,
}

/// Per-session bookkeeping kept between a round's completion and the next
/// round's arrival.
#[derive(Debug, Clone)]
struct SessionState {
    client_index: usize,
    round: u32,
    accumulated_context: Vec<u64>,
}

/// Turns a [`WorkloadSpec`] into a deterministic arrival stream.
///
/// # Invariants
/// - Re-running `generate_arrivals` against the same spec and seed
///   produces byte-identical requests (INV-6).
#[derive(Debug, Clone)]
pub struct WorkloadGenerator {
    spec: WorkloadSpec,
    master_seed: u64,
    content: ContentGenerator,
    sessions: HashMap<SessionId, SessionState>,
    next_request_id: u64,
    next_session_id: u64,
}

impl WorkloadGenerator {
    /// Builds a generator over `spec`, using `seed` as the master RNG seed.
    /// Callers resolve the CLI-override-vs-spec-seed precedence from
    /// `spec.md` §4.5 before choosing `seed`.
    #[must_use]
    pub fn new(spec: WorkloadSpec, seed: u64) -> Self {
        Self {
            spec,
            master_seed: seed,
            content: ContentGenerator::new(RngStreams::new(seed)),
            sessions: HashMap::new(),
            next_request_id: 0,
            next_session_id: 0,
        }
    }

    fn allocate_request_id(&mut self) -> RequestId {
        let id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        id
    }

    fn allocate_session_id(&mut self) -> SessionId {
        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;
        id
    }

    /// Converts a non-negative floating-point microsecond timestamp into a
    /// [`Microseconds`], clamping at zero.
    #[allow(
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation,
        reason = "arrival timestamps are non-negative by construction of the arrival process"
    )]
    fn to_timestamp(timestamp_us: f64) -> Microseconds {
        Microseconds::new(timestamp_us.max(0.0) as u64)
    }

    /// Generates every first-round arrival for every client, ordered by
    /// ascending arrival timestamp.
    pub fn generate_arrivals(&mut self, horizon: Microseconds) -> Vec<GeneratedArrival> {
        let mut arrivals = Vec::new();
        let streams = RngStreams::new(self.master_seed);
        let mut rng = streams.stream(RngPartition::Arrivals);
        let clients = self.spec.clients.clone();
        let aggregate_rate = self.spec.aggregate_rate;
        for (client_index, client) in clients.iter().enumerate() {
            let mut timestamp_us =
                client.arrival_process.next_arrival_us(0.0, aggregate_rate * client.rate_fraction, &mut rng);
            while Self::to_timestamp(timestamp_us).as_u64() <= horizon.as_u64() {
                let arrival_time = Self::to_timestamp(timestamp_us);
                let session_id = client.multi_turn.map(|_| self.allocate_session_id());
                let arrival = self.build_arrival(client_index, client, arrival_time, session_id, 0, Vec::new());
                arrivals.push(arrival);
                timestamp_us =
                    client.arrival_process.next_arrival_us(timestamp_us, aggregate_rate * client.rate_fraction, &mut rng);
            }
        }
        arrivals.sort_by_key(|arrival| arrival.arrival_time);
        arrivals
    }

    fn build_arrival(
        &mut self,
        client_index: usize,
        client: &ClientSpec,
        arrival_time: Microseconds,
        session_id: Option<SessionId>,
        round: u32,
        prior_context: Vec<u64>,
    ) -> GeneratedArrival {
        let input_len = client.input_length.sample(self.content.client_rng(client.id));
        let output_len = client.output_length.sample(self.content.client_rng(client.id));

        let mut tokens = prior_context;
        if let Some(group) = &client.prefix_group {
            if tokens.is_empty() {
                tokens.extend(self.content.sample_prefix(fnv1a(&group.group.0), group.prefix_length));
            }
        }
        let body_len = input_len.saturating_sub(u32::try_from(tokens.len()).unwrap_or(u32::MAX));
        tokens.extend(self.content.sample_body(client.id, body_len));

        if let Some(session_id) = session_id {
            self.sessions.insert(session_id, SessionState { client_index, round, accumulated_context: tokens.clone() });
        }

        let request_id = self.allocate_request_id();
        let request = Request {
            id: request_id,
            tenant_id: client.tenant.clone(),
            client_id: ClientId(client.id.to_string()),
            slo_class: client.slo_class.clone(),
            input_tokens: tokens,
            planned_output_tokens: output_len,
            arrival_time,
            state: RequestState::Queued,
            progress: 0,
            priority: 0.0,
            prefix_group: client.prefix_group.as_ref().map(|spec| spec.group.clone()),
            turn: session_id.map(|id| TurnContext { session_id: id, round }),
            preemption_count: 0,
            first_token_time: None,
            completion_time: None,
        };
        GeneratedArrival { request, arrival_time }
    }

    /// Called by the cluster when a multi-turn request completes. Returns
    /// the next round's arrival, or `None` if the session has no
    /// multi-turn spec, has exhausted its rounds, or is unknown.
    pub fn spawn_followup(&mut self, session_id: SessionId, completion_time: Microseconds) -> Option<GeneratedArrival> {
        let state = self.sessions.get(&session_id)?.clone();
        let client = self.spec.clients.get(state.client_index)?.clone();
        let multi_turn = client.multi_turn?;
        if state.round + 1 >= multi_turn.max_rounds {
            self.sessions.remove(&session_id);
            return None;
        }
        let arrival_time = completion_time.saturating_add(multi_turn.think_time_us);
        let prior_context = match multi_turn.growth {
            ContextGrowth::Accumulate => state.accumulated_context,
            ContextGrowth::Fresh => Vec::new(),
        };
        Some(self.build_arrival(state.client_index, &client, arrival_time, Some(session_id), state.round + 1, prior_context))
    }
}
