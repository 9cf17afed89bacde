// blis-cluster/src/builder.rs
// ============================================================================
// Module: Cluster Builder
// Description: Consuming builder assembling a `ClusterSimulator` from
//              already-resolved policy kinds, per-instance cache specs, and
//              run configuration.
// Purpose: `spec.md` §6's external construction surface, one step up from
//          the raw `ClusterSimulator::new` constructor; mirrors the
//          teacher's `CompositeBrokerBuilder` (`decision-gate-broker::broker`).
// Dependencies: blis_core, blis_kv, blis_latency, blis_policy, blis_workload,
//               crate::{cache, cluster, config, error, instance, trace_sink}
// ============================================================================

//! ## Overview
//! Like the teacher's `CompositeBrokerBuilder`, this builder takes
//! already-constructed pieces (policy trait objects are built from
//! `blis-policy`'s registry enums, not by name here — stringly-typed
//! resolution belongs to `blis-config`) and fails closed with a named error
//! when a required field is missing, rather than defaulting silently.
//! [`CacheSpec`] exists because a cache, unlike a policy, is built per
//! instance from the same few shapes (single-tier or tiered) and needs no
//! trait-object indirection until [`CacheSpec::build`] runs.

use std::rc::Rc;

use blis_core::InstanceId;
use blis_core::Microseconds;
use blis_kv::SingleTierCache;
use blis_kv::TieredCache;
use blis_latency::LatencyBackend;
use blis_policy::AdmissionKind;
use blis_policy::PriorityKind;
use blis_policy::RoutingKind;
use blis_policy::SchedulerKind;
use blis_workload::WorkloadGenerator;

use crate::cache::CacheHandle;
use crate::cluster::ClusterSimulator;
use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::instance::InstanceSimulator;
use crate::trace_sink::NullSink;
use crate::trace_sink::TraceSink;

/// Which KV cache shape to build for one instance.
#[derive(Debug, Clone, Copy)]
pub enum CacheSpec {
    /// A GPU-only cache with no offload tier.
    SingleTier {
        /// Number of blocks the GPU tier can hold.
        capacity: usize,
    },
    /// A two-tier GPU+CPU cache (`spec.md` §4.3).
    Tiered {
        /// Number of blocks the GPU tier can hold.
        gpu_capacity: usize,
        /// GPU utilization fraction `theta` above which a release triggers
        /// offload.
        offload_threshold: f64,
        /// CPU-to-GPU transfer bandwidth, bytes per microsecond.
        bandwidth_bytes_per_us: f64,
        /// Fixed latency added to every reload regardless of size.
        base_latency: Microseconds,
        /// Bytes per block, for transfer-time computation.
        block_bytes: u64,
    },
}

impl CacheSpec {
    fn build(self, instance_id: InstanceId) -> Box<dyn CacheHandle> {
        match self {
            Self::SingleTier { capacity } => Box::new(SingleTierCache::new(instance_id, capacity)),
            Self::Tiered { gpu_capacity, offload_threshold, bandwidth_bytes_per_us, base_latency, block_bytes } => {
                Box::new(TieredCache::new(instance_id, gpu_capacity, offload_threshold, bandwidth_bytes_per_us, base_latency, block_bytes))
            }
        }
    }
}

/// Everything needed to build one [`InstanceSimulator`], short of its id
/// (assigned by [`ClusterBuilder`] from insertion order).
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    /// The instance's KV cache shape.
    pub cache: CacheSpec,
    /// The instance's local scheduler.
    pub scheduler: SchedulerKind,
    /// The instance's local priority function.
    pub priority: PriorityKind,
}

/// Consuming builder for a [`ClusterSimulator`].
///
/// # Invariants
/// - `build` succeeds only once every required field is present and at
///   least one instance is configured.
#[derive(Default)]
pub struct ClusterBuilder {
    instances: Vec<InstanceSpec>,
    admission: Option<AdmissionKind>,
    routing: Option<RoutingKind>,
    workload: Option<WorkloadGenerator>,
    backend: Option<Rc<dyn LatencyBackend>>,
    config: Option<ClusterConfig>,
    sink: Option<Box<dyn TraceSink>>,
}

impl ClusterBuilder {
    /// Starts an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one instance's specification. Instance ids are assigned by
    /// insertion order: the first call here becomes instance 0.
    #[must_use]
    pub fn instance(mut self, spec: InstanceSpec) -> Self {
        self.instances.push(spec);
        self
    }

    /// Sets the cluster-wide admission policy kind.
    #[must_use]
    pub fn admission(mut self, kind: AdmissionKind) -> Self {
        self.admission = Some(kind);
        self
    }

    /// Sets the cluster-wide routing policy kind.
    #[must_use]
    pub fn routing(mut self, kind: RoutingKind) -> Self {
        self.routing = Some(kind);
        self
    }

    /// Sets the workload generator driving arrivals.
    #[must_use]
    pub fn workload(mut self, workload: WorkloadGenerator) -> Self {
        self.workload = Some(workload);
        self
    }

    /// Sets the latency backend shared by every instance.
    #[must_use]
    pub fn backend(mut self, backend: Rc<dyn LatencyBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the resolved run configuration.
    #[must_use]
    pub fn config(mut self, config: ClusterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the trace sink. Defaults to [`NullSink`] if never called.
    #[must_use]
    pub fn sink(mut self, sink: Box<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Builds the configured [`ClusterSimulator`].
    ///
    /// # Errors
    /// Returns [`ClusterError::NoInstances`] if no instance was configured,
    /// or [`ClusterError::BuilderIncomplete`] if a required field is
    /// missing, or propagates [`ClusterError::Policy`] if the routing kind
    /// fails to build (e.g. a weighted composite with no positive weight).
    pub fn build(self) -> Result<ClusterSimulator, ClusterError> {
        if self.instances.is_empty() {
            return Err(ClusterError::NoInstances);
        }
        let admission = self.admission.ok_or(ClusterError::BuilderIncomplete("admission"))?;
        let routing = self.routing.ok_or(ClusterError::BuilderIncomplete("routing"))?;
        let workload = self.workload.ok_or(ClusterError::BuilderIncomplete("workload"))?;
        let backend = self.backend.ok_or(ClusterError::BuilderIncomplete("backend"))?;
        let config = self.config.ok_or(ClusterError::BuilderIncomplete("config"))?;
        let sink = self.sink.unwrap_or_else(|| Box::new(NullSink));

        let instances = self
            .instances
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                let id = InstanceId(u32::try_from(index).unwrap_or(u32::MAX));
                InstanceSimulator::new(id, spec.cache.build(id), spec.scheduler.build(), spec.priority.build(), config.prefix_block_size)
            })
            .collect();

        Ok(ClusterSimulator::new(instances, admission.build(), routing.build()?, workload, backend, config, sink))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests assert directly on fixture data")]
mod tests {
    use blis_core::SloClass;
    use blis_core::TenantId;
    use blis_latency::BlackboxBackend;
    use blis_latency::BlackboxCoefficients;
    use blis_latency::CoefficientKey;
    use blis_latency::CoefficientTable;
    use blis_policy::PriorityKind;
    use blis_workload::ArrivalProcess;
    use blis_workload::ClientSpec;
    use blis_workload::LengthDistribution;
    use blis_workload::WorkloadSpec;

    use super::*;

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
            tenant: TenantId("t".to_owned()),
            slo_class: SloClass::Interactive,
            rate_fraction: 1.0,
            arrival_process: ArrivalProcess::Poisson,
            input_length: LengthDistribution::Constant { value: 4 },
            output_length: LengthDistribution::Constant { value: 2 },
            prefix_group: None,
            multi_turn: None,
        };
        let spec = WorkloadSpec { clients: vec![client], aggregate_rate: 10.0, seed: 1 };
        WorkloadGenerator::new(spec, 1)
    }

    #[test]
    fn building_without_instances_is_rejected() {
        let result = ClusterBuilder::new()
            .admission(AdmissionKind::AlwaysAdmit)
            .routing(RoutingKind::RoundRobin)
            .workload(fixture_workload())
            .backend(fixture_backend())
            .config(ClusterConfig {
                instance_count: 0,
                prefix_block_size: 4,
                step_token_budget: 64,
                max_running_requests: 8,
                snapshot_refresh_interval: Microseconds::new(1_000),
                max_preemption_attempts: 80,
                horizon: Microseconds::new(100),
            })
            .build();
        assert!(matches!(result, Err(ClusterError::NoInstances)));
    }

    #[test]
    fn a_fully_configured_builder_assembles_a_cluster() {
        let result = ClusterBuilder::new()
            .instance(InstanceSpec { cache: CacheSpec::SingleTier { capacity: 64 }, scheduler: SchedulerKind::Fcfs, priority: PriorityKind::Constant(0.0) })
            .admission(AdmissionKind::AlwaysAdmit)
            .routing(RoutingKind::RoundRobin)
            .workload(fixture_workload())
            .backend(fixture_backend())
            .config(ClusterConfig {
                instance_count: 1,
                prefix_block_size: 4,
                step_token_budget: 64,
                max_running_requests: 8,
                snapshot_refresh_interval: Microseconds::new(1_000),
                max_preemption_attempts: 80,
                horizon: Microseconds::new(100),
            })
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn missing_admission_is_reported_by_name() {
        let result = ClusterBuilder::new()
            .instance(InstanceSpec { cache: CacheSpec::SingleTier { capacity: 64 }, scheduler: SchedulerKind::Fcfs, priority: PriorityKind::Constant(0.0) })
            .routing(RoutingKind::RoundRobin)
            .workload(fixture_workload())
            .backend(fixture_backend())
            .config(ClusterConfig {
                instance_count: 1,
                prefix_block_size: 4,
                step_token_budget: 64,
                max_running_requests: 8,
                snapshot_refresh_interval: Microseconds::new(1_000),
                max_preemption_attempts: 80,
                horizon: Microseconds::new(100),
            })
            .build();
        assert!(matches!(result, Err(ClusterError::BuilderIncomplete("admission"))));
    }
}
