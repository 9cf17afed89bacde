// blis-cluster/src/cluster.rs
// ============================================================================
// Module: Cluster Event Loop
// Description: The global discrete-event simulator tying the workload
//              stream, admission/routing policies, and per-instance
//              simulators together.
// Purpose: `spec.md` §4.1/§4.3: pop events in `(timestamp, tier, seq)`
//          order, dispatch each to its handler, and let every handler
//          cascade the next tier's event at the same instant.
// Dependencies: blis_core, blis_latency, blis_policy, blis_workload,
//               crate::{config, error, instance, trace_sink}, tracing
// ============================================================================

//! ## Overview
//! `ClusterSimulator` is the one place the whole dependency graph meets:
//! the global [`EventQueue`], the workload stream, the cluster-wide
//! admission and routing policies, and one [`InstanceSimulator`] per
//! instance. Every handler advances the clock to its event's timestamp and
//! schedules the next tier's event at that same instant — arrival,
//! admission, routing, and queueing of one request all happen at a single
//! simulated instant, just at strictly increasing priority tiers, so a
//! burst of same-timestamp arrivals still resolves deterministically
//! (`spec.md` §9). Only `StepTick` and `SnapshotRefresh` push the clock
//! forward, since those are the only events whose next occurrence depends
//! on a computed duration rather than another event in the same cascade.

use std::collections::HashMap;
use std::rc::Rc;

use blis_core::Event;
use blis_core::EventKind;
use blis_core::EventQueue;
use blis_core::InstanceId;
use blis_core::InstanceMetrics;
use blis_core::InvariantViolation;
use blis_core::Microseconds;
use blis_core::Request;
use blis_core::RequestId;
use blis_core::RequestState;
use blis_core::RouterSnapshot;
use blis_latency::LatencyBackend;
use blis_policy::AdmissionDecision;
use blis_policy::AdmissionPolicy;
use blis_policy::RoutingPolicy;
use blis_workload::WorkloadGenerator;
use tracing::debug;
use tracing::warn;

use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::instance::InstanceSimulator;
use crate::trace_sink::CompletionTraceRecord;
use crate::trace_sink::RoutingTraceRecord;
use crate::trace_sink::TraceSink;

/// Aggregate outcome of a completed run.
#[derive(Debug, Clone)]
pub struct ClusterResults {
    /// Final accumulated metrics, one per instance, in instance-id order.
    pub instances: Vec<InstanceMetrics>,
    /// Total requests the workload stream injected (first-round arrivals
    /// plus multi-turn follow-ups).
    pub total_injected: u64,
    /// Total requests rejected at admission, cluster-wide.
    pub total_rejected: u64,
    /// Simulated clock value when the event queue drained.
    pub wall_clock: Microseconds,
}

/// The global discrete-event simulator.
pub struct ClusterSimulator {
    clock: Microseconds,
    queue: EventQueue,
    instances: Vec<InstanceSimulator>,
    admission: Box<dyn AdmissionPolicy>,
    routing: Box<dyn RoutingPolicy>,
    workload: WorkloadGenerator,
    backend: Rc<dyn LatencyBackend>,
    config: ClusterConfig,
    sink: Box<dyn TraceSink>,
    /// Requests between their `ClusterArrival` and being absorbed into an
    /// instance's wait-queue, and again between a `StepTick` completing
    /// them and their `Completion` event firing at the same instant.
    buffer: HashMap<RequestId, Request>,
    /// Whether a `StepTick` is already in flight for each instance, so a
    /// second arrival doesn't schedule a redundant one.
    step_pending: Vec<bool>,
    /// Last `SnapshotRefresh`-computed KV utilization per instance.
    cached_kv_utilization: Vec<f64>,
    last_snapshot_refresh: Microseconds,
    total_injected: u64,
    total_rejected: u64,
}

impl ClusterSimulator {
    /// Builds a cluster simulator from its already-resolved parts. Prefer
    /// [`crate::builder::ClusterBuilder`] over calling this directly.
    #[must_use]
    pub fn new(
        instances: Vec<InstanceSimulator>,
        admission: Box<dyn AdmissionPolicy>,
        routing: Box<dyn RoutingPolicy>,
        workload: WorkloadGenerator,
        backend: Rc<dyn LatencyBackend>,
        config: ClusterConfig,
        sink: Box<dyn TraceSink>,
    ) -> Self {
        let instance_count = instances.len();
        Self {
            clock: Microseconds::ZERO,
            queue: EventQueue::new(),
            instances,
            admission,
            routing,
            workload,
            backend,
            config,
            sink,
            buffer: HashMap::new(),
            step_pending: vec![false; instance_count],
            cached_kv_utilization: vec![0.0; instance_count],
            last_snapshot_refresh: Microseconds::ZERO,
            total_injected: 0,
            total_rejected: 0,
        }
    }

    fn schedule(&mut self, timestamp: Microseconds, kind: EventKind) -> Result<(), ClusterError> {
        if timestamp < self.clock {
            return Err(ClusterError::Invariant(InvariantViolation::EventInPast { attempted: timestamp, clock: self.clock }));
        }
        self.queue.schedule(timestamp, kind);
        Ok(())
    }

    fn snapshot_all(&self) -> Vec<RouterSnapshot> {
        self.instances
            .iter()
            .enumerate()
            .map(|(index, instance)| instance.synchronous_snapshot(self.cached_kv_utilization[index], self.last_snapshot_refresh.as_u64()))
            .collect()
    }

    /// Runs the event loop to completion: seeds first-round arrivals,
    /// drains the event queue, and checks cluster-wide conservation.
    ///
    /// # Errors
    /// Returns a [`ClusterError`] if any handler violates an invariant, a
    /// policy evaluation fails, or the latency backend cannot price a
    /// step.
    pub fn run(&mut self) -> Result<ClusterResults, ClusterError> {
        let horizon = self.config.horizon;
        for arrival in self.workload.generate_arrivals(horizon) {
            self.total_injected += 1;
            let request_id = arrival.request.id;
            self.buffer.insert(request_id, arrival.request);
            self.schedule(arrival.arrival_time, EventKind::ClusterArrival { request_id })?;
        }
        self.schedule(Microseconds::ZERO, EventKind::SnapshotRefresh)?;

        while let Some(Event { timestamp, kind, .. }) = self.queue.pop() {
            self.clock = timestamp;
            match kind {
                EventKind::ClusterArrival { request_id } => self.handle_arrival(timestamp, request_id)?,
                EventKind::AdmissionDecision { request_id } => self.handle_admission(timestamp, request_id)?,
                EventKind::RoutingDecision { request_id } => self.handle_routing(timestamp, request_id)?,
                EventKind::Queued { request_id, instance_id } => self.handle_queued(timestamp, request_id, instance_id)?,
                EventKind::StepTick { instance_id } => self.handle_step(timestamp, instance_id)?,
                EventKind::Completion { request_id, instance_id } => self.handle_completion(timestamp, request_id, instance_id)?,
                EventKind::SnapshotRefresh => self.handle_snapshot_refresh(timestamp)?,
            }
        }

        self.check_conservation()?;
        Ok(ClusterResults {
            instances: self.instances.iter().map(|instance| instance.metrics().clone()).collect(),
            total_injected: self.total_injected,
            total_rejected: self.total_rejected,
            wall_clock: self.clock,
        })
    }

    fn handle_arrival(&mut self, now: Microseconds, request_id: RequestId) -> Result<(), ClusterError> {
        self.schedule(now, EventKind::AdmissionDecision { request_id })
    }

    fn handle_admission(&mut self, now: Microseconds, request_id: RequestId) -> Result<(), ClusterError> {
        let snapshots = self.snapshot_all();
        let request = self.buffer.get(&request_id).ok_or(ClusterError::BufferInconsistency(request_id))?;
        let decision = self.admission.admit(request, &snapshots, now);
        match decision {
            AdmissionDecision::Accept => self.schedule(now, EventKind::RoutingDecision { request_id }),
            AdmissionDecision::Reject => {
                let mut request = self.buffer.remove(&request_id).ok_or(ClusterError::BufferInconsistency(request_id))?;
                if !request.state.can_transition_to(RequestState::Rejected) {
                    return Err(ClusterError::Invariant(InvariantViolation::IllegalTransition {
                        request_id,
                        from: request.state,
                        to: RequestState::Rejected,
                    }));
                }
                request.state = RequestState::Rejected;
                self.total_rejected += 1;
                debug!(%request_id, "request rejected at admission");
                Ok(())
            }
        }
    }

    fn handle_routing(&mut self, now: Microseconds, request_id: RequestId) -> Result<(), ClusterError> {
        let snapshots = self.snapshot_all();
        let request = self.buffer.get(&request_id).ok_or(ClusterError::BufferInconsistency(request_id))?;
        let (chosen, scores) = self.routing.route(request, &snapshots)?;
        let effective_loads = snapshots.iter().map(|snapshot| (snapshot.instance_id, snapshot.effective_load())).collect();
        self.sink.record_routing(RoutingTraceRecord {
            timestamp: now,
            request_id,
            chosen,
            scores,
            score_based: self.routing.is_score_based(),
            effective_loads,
        });
        self.instances[chosen.index()].state.pending_requests += 1;
        self.schedule(now, EventKind::Queued { request_id, instance_id: chosen })
    }

    fn handle_queued(&mut self, now: Microseconds, request_id: RequestId, instance_id: InstanceId) -> Result<(), ClusterError> {
        let request = self.buffer.remove(&request_id).ok_or(ClusterError::BufferInconsistency(request_id))?;
        self.instances[instance_id.index()].enqueue(request);
        if !self.step_pending[instance_id.index()] {
            self.step_pending[instance_id.index()] = true;
            self.schedule(now, EventKind::StepTick { instance_id })?;
        }
        Ok(())
    }

    fn handle_step(&mut self, now: Microseconds, instance_id: InstanceId) -> Result<(), ClusterError> {
        self.step_pending[instance_id.index()] = false;
        let outcome = self.instances[instance_id.index()].step(
            now,
            self.config.step_token_budget,
            self.config.max_running_requests,
            self.config.max_preemption_attempts,
            self.backend.as_ref(),
        )?;

        for request in outcome.completed {
            let request_id = request.id;
            self.buffer.insert(request_id, request);
            self.schedule(now, EventKind::Completion { request_id, instance_id })?;
        }

        let instance = &self.instances[instance_id.index()];
        let has_backlog = !instance.state.wait_queue.is_empty() || !instance.state.running_batch.is_empty();
        if has_backlog {
            let delay = outcome.step_duration.as_u64().max(1);
            self.step_pending[instance_id.index()] = true;
            self.schedule(now + delay, EventKind::StepTick { instance_id })?;
        }
        Ok(())
    }

    fn handle_completion(&mut self, now: Microseconds, request_id: RequestId, instance_id: InstanceId) -> Result<(), ClusterError> {
        let request = self.buffer.remove(&request_id).ok_or(ClusterError::BufferInconsistency(request_id))?;
        let ttft_ms = request.first_token_time.map(|t| (t - request.arrival_time) as f64 / 1_000.0);
        let e2e_ms = (now - request.arrival_time) as f64 / 1_000.0;
        self.sink.record_completion(CompletionTraceRecord {
            timestamp: now,
            request_id,
            instance_id,
            slo_class: request.slo_class.clone(),
            ttft_ms,
            e2e_ms,
        });
        if let Some(turn) = &request.turn {
            if let Some(arrival) = self.workload.spawn_followup(turn.session_id, now) {
                if arrival.arrival_time <= self.config.horizon {
                    self.total_injected += 1;
                    let followup_id = arrival.request.id;
                    self.buffer.insert(followup_id, arrival.request);
                    self.schedule(arrival.arrival_time, EventKind::ClusterArrival { request_id: followup_id })?;
                }
            }
        }
        Ok(())
    }

    fn handle_snapshot_refresh(&mut self, now: Microseconds) -> Result<(), ClusterError> {
        for (index, instance) in self.instances.iter().enumerate() {
            self.cached_kv_utilization[index] = instance.kv_utilization();
        }
        self.last_snapshot_refresh = now;
        if now.as_u64() < self.config.horizon.as_u64() {
            let interval = self.config.snapshot_refresh_interval.as_u64().max(1);
            self.schedule(now + interval, EventKind::SnapshotRefresh)?;
        }
        Ok(())
    }

    fn check_conservation(&self) -> Result<(), ClusterError> {
        let mut completed = 0u64;
        let mut queued = 0u64;
        let mut running = 0u64;
        for instance in &self.instances {
            instance.check_conservation()?;
            completed += instance.metrics().completed_count;
            queued += u64::try_from(instance.state.wait_queue.len()).unwrap_or(u64::MAX);
            running += u64::try_from(instance.state.running_batch.len()).unwrap_or(u64::MAX);
        }
        queued += u64::try_from(self.buffer.len()).unwrap_or(u64::MAX);
        let rejected = self.total_rejected;
        let injected = self.total_injected;
        if injected != completed + queued + running + rejected {
            warn!(injected, completed, queued, running, rejected, "conservation check failed at end of run");
            return Err(ClusterError::Invariant(InvariantViolation::ConservationViolated { injected, completed, queued, running, rejected }));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests assert directly on fixture data")]
mod tests {
    use blis_kv::SingleTierCache;
    use blis_latency::BlackboxBackend;
    use blis_latency::BlackboxCoefficients;
    use blis_latency::CoefficientKey;
    use blis_latency::CoefficientTable;
    use blis_policy::AlwaysAdmit;
    use blis_policy::Constant;
    use blis_policy::Fcfs;
    use blis_policy::RoundRobin;
    use blis_workload::ArrivalProcess;
    use blis_workload::ClientSpec;
    use blis_workload::LengthDistribution;
    use blis_workload::WorkloadSpec;

    use super::*;
    use crate::trace_sink::NullSink;

    fn fixture_backend() -> Rc<dyn LatencyBackend> {
        let key = CoefficientKey { model: "demo".to_owned(), hardware: "a100".to_owned(), tp: 1 };
        let mut table = CoefficientTable::new();
        table.insert(
            key.clone(),
            BlackboxCoefficients { beta0: 10.0, beta1: 1.0, beta2: 1.0, alpha0: 0.0, alpha1: 0.0, alpha2_const: 0.0 },
        );
        Rc::new(BlackboxBackend::new(key, table))
    }

    fn fixture_workload() -> WorkloadGenerator {
        let client = ClientSpec {
            id: 0,
            tenant: blis_core::TenantId("t".to_owned()),
            slo_class: blis_core::SloClass::Interactive,
            rate_fraction: 1.0,
            arrival_process: ArrivalProcess::Poisson,
            input_length: LengthDistribution::Constant { value: 4 },
            output_length: LengthDistribution::Constant { value: 2 },
            prefix_group: None,
            multi_turn: None,
        };
        let spec = WorkloadSpec { clients: vec![client], aggregate_rate: 10_000.0, seed: 1 };
        WorkloadGenerator::new(spec, 1)
    }

    fn fixture_cluster(instance_count: usize) -> ClusterSimulator {
        let instances = (0..instance_count)
            .map(|index| {
                let cache = Box::new(SingleTierCache::new(InstanceId(u32::try_from(index).unwrap()), 64));
                InstanceSimulator::new(InstanceId(u32::try_from(index).unwrap()), cache, Box::new(Fcfs), Box::new(Constant(0.0)), 4)
            })
            .collect();
        let config = ClusterConfig {
            instance_count: u32::try_from(instance_count).unwrap(),
            prefix_block_size: 4,
            step_token_budget: 64,
            max_running_requests: 8,
            snapshot_refresh_interval: Microseconds::new(1_000),
            max_preemption_attempts: 40,
            horizon: Microseconds::new(100),
        };
        ClusterSimulator::new(
            instances,
            Box::new(AlwaysAdmit),
            Box::new(RoundRobin::default()),
            fixture_workload(),
            fixture_backend(),
            config,
            Box::new(NullSink),
        )
    }

    #[test]
    fn a_short_run_drains_the_queue_and_conserves() {
        let mut cluster = fixture_cluster(2);
        let results = cluster.run().expect("run succeeds and conserves");
        assert_eq!(results.total_injected, results.total_rejected + results.instances.iter().map(|m| m.completed_count).sum::<u64>());
    }

    #[test]
    fn scheduling_an_event_before_the_clock_is_rejected() {
        let mut cluster = fixture_cluster(1);
        cluster.clock = Microseconds::new(100);
        let result = cluster.schedule(Microseconds::new(50), EventKind::SnapshotRefresh);
        assert!(matches!(result, Err(ClusterError::Invariant(InvariantViolation::EventInPast { .. }))));
    }
}
