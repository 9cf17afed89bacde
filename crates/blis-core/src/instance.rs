// blis-core/src/instance.rs
// ============================================================================
// Module: Instance State
// Description: Per-instance wait-queue, running batch, and metric
//              accumulators.
// Purpose: Hold the mutable state a single inference instance carries
//          across the run; KV cache handle and RNG stream live alongside it
//          in `blis-cluster`, which owns the instance simulator.
// Dependencies: crate::ids, crate::request
// ============================================================================

//! ## Overview
//! `InstanceState` tracks only the request-placement half of an instance's
//! state (wait-queue, running batch, pending counter, metric accumulators).
//! The KV cache handle is deliberately not part of this type: `blis-core`
//! has no dependency on `blis-kv`, so the instance simulator in
//! `blis-cluster` pairs an `InstanceState` with a cache handle itself.

use crate::ids::InstanceId;
use crate::ids::RequestId;
use crate::request::Request;

// ============================================================================
// SECTION: Metrics Accumulator
// ============================================================================

/// Raw per-instance metric samples, aggregated into the results contract at
/// publish time (`blis-trace`).
///
/// # Invariants
/// - `ttft_samples_ms.len() == completed_count` at every point after a
///   completion is recorded.
#[derive(Debug, Clone, Default)]
pub struct InstanceMetrics {
    /// Time-to-first-token samples, in milliseconds.
    pub ttft_samples_ms: Vec<f64>,
    /// End-to-end latency samples, in milliseconds.
    pub e2e_samples_ms: Vec<f64>,
    /// Inter-token latency samples, in milliseconds.
    pub itl_samples_ms: Vec<f64>,
    /// Count of completed requests.
    pub completed_count: u64,
    /// Count of rejected requests (admission-time, attributed to the
    /// instance the request would have routed to when known, or accumulated
    /// at the cluster level otherwise).
    pub rejected_count: u64,
    /// Count of preemption events.
    pub preemption_count: u64,
    /// Count of steps where the instance had headroom and a non-empty
    /// wait-queue but admitted nothing (a work-conserving-scheduler
    /// violation if ever non-zero; tracked for INV-8 tests).
    pub idle_with_backlog_count: u64,
    /// Prefill tokens served from a matched KV block rather than computed
    /// fresh, summed across every step's batch.
    pub cache_hit_tokens: u64,
    /// Prefill tokens that missed the KV cache and were priced as fresh
    /// compute, summed across every step's batch.
    pub cache_miss_tokens: u64,
}

// ============================================================================
// SECTION: Instance State
// ============================================================================

/// Mutable placement state for one cluster instance.
///
/// # Invariants
/// - Every request referenced by `wait_queue` or `running_batch` is in
///   exactly one of the two (never both).
/// - `pending_requests` counts requests routed to this instance but not yet
///   absorbed by a `Queued` event.
#[derive(Debug, Clone)]
pub struct InstanceState {
    /// This instance's id.
    pub id: InstanceId,
    /// Requests waiting to be admitted to the running batch, in scheduler
    /// order (re-sorted by `SchedulerPolicy::order_queue` at each
    /// `StepTick`).
    pub wait_queue: Vec<Request>,
    /// Requests currently in the running batch (prefill or decode).
    pub running_batch: Vec<Request>,
    /// Requests routed here but not yet absorbed into `wait_queue`.
    pub pending_requests: u32,
    /// Metric accumulators.
    pub metrics: InstanceMetrics,
}

impl InstanceState {
    /// Creates an empty instance state for the given id.
    #[must_use]
    pub fn new(id: InstanceId) -> Self {
        Self {
            id,
            wait_queue: Vec::new(),
            running_batch: Vec::new(),
            pending_requests: 0,
            metrics: InstanceMetrics::default(),
        }
    }

    /// Returns the current wait-queue depth.
    #[must_use]
    pub fn queue_depth(&self) -> u32 {
        u32::try_from(self.wait_queue.len()).unwrap_or(u32::MAX)
    }

    /// Returns the current running-batch size.
    #[must_use]
    pub fn batch_size(&self) -> u32 {
        u32::try_from(self.running_batch.len()).unwrap_or(u32::MAX)
    }

    /// Returns the effective load used by routing scorers:
    /// `queueDepth + batchSize + pendingRequests`.
    #[must_use]
    pub fn effective_load(&self) -> u32 {
        self.queue_depth() + self.batch_size() + self.pending_requests
    }

    /// Removes and returns the running-batch request with the given id, if
    /// present.
    pub fn remove_running(&mut self, id: RequestId) -> Option<Request> {
        let index = self.running_batch.iter().position(|r| r.id == id)?;
        Some(self.running_batch.remove(index))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests assert directly on fixture data")]
mod tests {
    use super::*;
    use crate::ids::ClientId;
    use crate::ids::SloClass;
    use crate::ids::TenantId;
    use crate::request::RequestState;
    use crate::time::Microseconds;

    fn sample_request(id: u64) -> Request {
        Request {
            id: RequestId(id),
            tenant_id: TenantId("t0".to_owned()),
            client_id: ClientId("c0".to_owned()),
            slo_class: SloClass::Interactive,
            input_tokens: vec![1, 2, 3],
            planned_output_tokens: 10,
            arrival_time: Microseconds::ZERO,
            state: RequestState::Queued,
            progress: 0,
            priority: 0.0,
            prefix_group: None,
            turn: None,
            preemption_count: 0,
            first_token_time: None,
            completion_time: None,
        }
    }

    #[test]
    fn effective_load_sums_three_components() {
        let mut instance = InstanceState::new(InstanceId(0));
        instance.wait_queue.push(sample_request(1));
        instance.running_batch.push(sample_request(2));
        instance.pending_requests = 3;
        assert_eq!(instance.effective_load(), 1 + 1 + 3);
    }

    #[test]
    fn remove_running_extracts_matching_request() {
        let mut instance = InstanceState::new(InstanceId(0));
        instance.running_batch.push(sample_request(1));
        instance.running_batch.push(sample_request(2));
        let removed = instance.remove_running(RequestId(1));
        assert_eq!(removed.map(|r| r.id), Some(RequestId(1)));
        assert_eq!(instance.running_batch.len(), 1);
    }
}
