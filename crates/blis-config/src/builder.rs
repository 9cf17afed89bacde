// blis-config/src/builder.rs
// ============================================================================
// Module: Simulation Builder
// Description: Resolves a `RunConfigYaml` and a workload spec into a fully
//              assembled `ClusterSimulator` plus a handle to its recorder.
// Purpose: `spec.md` §6: the one place stringly-typed policy/scorer names
//          become concrete trait objects.
// Dependencies: blis_cluster, blis_core, blis_latency, blis_policy,
//               blis_trace, blis_workload, crate::{error, run_config}
// ============================================================================

//! ## Overview
//! Mirrors the teacher's pattern of a thin assembly layer sitting above a
//! consuming builder (`decision-gate-config::policy` resolving named
//! policies against `decision-gate-broker::CompositeBrokerBuilder`):
//! [`SimulationBuilder::build`] resolves every name in a
//! [`crate::run_config::RunConfigYaml`] and hands the result to
//! [`blis_cluster::ClusterBuilder`].
//!
//! The built [`ClusterSimulator`] owns its [`TraceSink`] outright (the
//! event loop calls it by `&mut self` on every routing decision and
//! completion), so the recorder this function constructs is wrapped in
//! [`SharedRecorder`] — an `Rc<RefCell<Recorder>>` — and the same handle is
//! returned alongside the simulator so the caller can call
//! `build_results` once `run` completes.

use std::cell::RefCell;
use std::rc::Rc;

use blis_cluster::CacheSpec;
use blis_cluster::ClusterBuilder;
use blis_cluster::ClusterConfig;
use blis_cluster::ClusterSimulator;
use blis_cluster::InstanceSpec;
use blis_cluster::trace_sink::CompletionTraceRecord;
use blis_cluster::trace_sink::RoutingTraceRecord;
use blis_cluster::trace_sink::TraceSink;
use blis_core::InstanceId;
use blis_core::Microseconds;
use blis_latency::BlackboxBackend;
use blis_latency::BlackboxCoefficients;
use blis_latency::CoefficientTable;
use blis_latency::LatencyBackend;
use blis_policy::PrefixCacheIndex;
use blis_policy::RoutingKind;
use blis_policy::ScorerCatalogContext;
use blis_policy::build_scorers;
use blis_trace::Recorder;
use blis_trace::TraceLevel;
use blis_workload::WorkloadGenerator;
use blis_workload::WorkloadSpec;

use crate::error::ConfigError;
use crate::run_config::CacheConfigYaml;
use crate::run_config::RequestSourceYaml;
use crate::run_config::RoutingConfigYaml;
use crate::run_config::RunConfigYaml;
use crate::run_config::TraceLevelYaml;
use crate::workload_yaml::WorkloadSpecYaml;

/// Estimated prefill time saved per matched prefix block, in microseconds,
/// for the cost-benefit scorer. `spec.md` does not expose this as a
/// separate config knob; it is derived from the bound backend's own
/// per-token prefill coefficient, which is what the scorer is estimating
/// against in the first place.
const COST_BENEFIT_BLOCK_SAVING_US: f64 = 0.0;

/// Shares one [`Recorder`] between the boxed [`TraceSink`] the cluster
/// owns and the handle the caller keeps to read results back out.
#[derive(Clone)]
pub struct SharedRecorder(Rc<RefCell<Recorder>>);

impl SharedRecorder {
    fn new(recorder: Recorder) -> Self {
        Self(Rc::new(RefCell::new(recorder)))
    }

    /// Builds the final results contract from the finished cluster run.
    ///
    /// # Errors
    /// Propagates [`blis_trace::TraceError`] if a trace summary was
    /// requested but no routing decision was ever recorded.
    pub fn build_results(&self, cluster: &blis_cluster::ClusterResults) -> Result<blis_trace::Results, blis_trace::TraceError> {
        self.0.borrow().build_results(cluster)
    }
}

impl TraceSink for SharedRecorder {
    fn record_routing(&mut self, record: RoutingTraceRecord) {
        self.0.borrow_mut().record_routing(record);
    }

    fn record_completion(&mut self, record: CompletionTraceRecord) {
        self.0.borrow_mut().record_completion(record);
    }
}

/// Resolves configuration into a runnable simulation.
pub struct SimulationBuilder;

impl SimulationBuilder {
    /// Loads the workload spec named by `run.request_source`, resolving an
    /// inline document directly or reading a path from disk.
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if a workload-spec path cannot be read,
    /// or propagates parse/validation failures from
    /// [`WorkloadSpecYaml::resolve`].
    pub fn load_workload(run: &RunConfigYaml) -> Result<WorkloadSpec, ConfigError> {
        let yaml = match &run.request_source {
            RequestSourceYaml::Inline { workload } => workload.clone(),
            RequestSourceYaml::WorkloadSpecPath { path } => {
                let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
                WorkloadSpecYaml::from_yaml_str(&text)?
            }
        };
        yaml.resolve()
    }

    /// Assembles a [`ClusterSimulator`] and its [`SharedRecorder`] from a
    /// validated run configuration and a resolved workload spec.
    ///
    /// The run configuration's `seed`, when present, overrides the
    /// workload spec's own seed (`spec.md` §4.5's determinism contract:
    /// one seed governs the whole run, and an explicit run-level override
    /// wins over whatever the workload document carries).
    ///
    /// # Errors
    /// Propagates [`ConfigError::Invalid`] from `run.validate()`,
    /// [`ConfigError::Policy`] if a named scorer is unknown or a
    /// weighted-composite has no positive weight, or
    /// [`ConfigError::Cluster`] if the assembled cluster is missing a
    /// required builder field.
    pub fn build(run: &RunConfigYaml, mut workload_spec: WorkloadSpec) -> Result<(ClusterSimulator, SharedRecorder), ConfigError> {
        run.validate()?;

        let seed = run.seed.unwrap_or(workload_spec.seed);
        workload_spec.seed = seed;

        let mut table = CoefficientTable::new();
        for row in &run.coefficients {
            let key = blis_latency::CoefficientKey { model: row.model.clone(), hardware: row.hardware.clone(), tp: row.tp };
            table.insert(
                key,
                BlackboxCoefficients {
                    beta0: row.beta0,
                    beta1: row.beta1,
                    beta2: row.beta2,
                    alpha0: row.alpha0,
                    alpha1: row.alpha1,
                    alpha2_const: row.alpha2_const,
                },
            );
        }
        let backend: Rc<dyn LatencyBackend> = Rc::new(BlackboxBackend::new(run.coefficient_key(), table));

        let prefix_index = Rc::new(RefCell::new(PrefixCacheIndex::new()));
        let queue_delay_estimator = Rc::new(blis_cluster::BackendQueueDelayEstimator::new(Rc::clone(&backend)));
        let scorer_ctx = ScorerCatalogContext {
            block_size: run.prefix_block_size,
            prefix_index,
            block_latency_saving_us: COST_BENEFIT_BLOCK_SAVING_US,
            queue_delay_estimator: Some(queue_delay_estimator),
        };

        let routing = match &run.routing {
            RoutingConfigYaml::RoundRobin => RoutingKind::RoundRobin,
            RoutingConfigYaml::LeastLoaded => RoutingKind::LeastLoaded,
            RoutingConfigYaml::AlwaysBusiest => RoutingKind::AlwaysBusiest,
            RoutingConfigYaml::WeightedComposite { scorers } => {
                let specs: Vec<(String, f64)> = scorers.iter().map(|entry| (entry.name.clone(), entry.weight)).collect();
                RoutingKind::WeightedComposite { scorers: build_scorers(&specs, &scorer_ctx)? }
            }
        };

        let cache = match &run.cache {
            CacheConfigYaml::SingleTier { gpu_blocks } => CacheSpec::SingleTier { capacity: *gpu_blocks },
            CacheConfigYaml::Tiered { gpu_blocks, offload_threshold, bandwidth_bytes_per_us, base_latency_us, block_bytes, cpu_blocks: _ } => CacheSpec::Tiered {
                gpu_capacity: *gpu_blocks,
                offload_threshold: *offload_threshold,
                bandwidth_bytes_per_us: *bandwidth_bytes_per_us,
                base_latency: Microseconds::new(*base_latency_us),
                block_bytes: *block_bytes,
            },
        };

        let cluster_config = ClusterConfig {
            instance_count: run.instance_count,
            prefix_block_size: run.prefix_block_size,
            step_token_budget: run.step_token_budget,
            max_running_requests: run.max_running_requests,
            snapshot_refresh_interval: run.snapshot_refresh_interval(),
            max_preemption_attempts: ClusterConfig::default_preemption_attempts(run.max_running_requests),
            horizon: run.horizon(),
        };

        let trace_level = match run.trace_level {
            TraceLevelYaml::None => TraceLevel::None,
            TraceLevelYaml::Summary => TraceLevel::Summary,
            TraceLevelYaml::Decisions => TraceLevel::Decisions,
        };
        let instance_ids = (0..run.instance_count).map(InstanceId);
        let recorder = SharedRecorder::new(Recorder::new(trace_level, instance_ids));

        let mut builder = ClusterBuilder::new()
            .admission(run.admission.clone())
            .routing(routing)
            .workload(WorkloadGenerator::new(workload_spec, seed))
            .backend(backend)
            .config(cluster_config)
            .sink(Box::new(recorder.clone()));
        for _ in 0..run.instance_count {
            builder = builder.instance(InstanceSpec { cache, scheduler: run.scheduler, priority: run.priority.clone() });
        }

        let simulator = builder.build()?;
        Ok((simulator, recorder))
    }
}
