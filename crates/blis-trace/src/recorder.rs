// blis-trace/src/recorder.rs
// ============================================================================
// Module: Trace Recorder
// Description: A `TraceSink` that accumulates per-SLO-class completion
//              samples and routing decisions, then publishes the full
//              results contract.
// Purpose: `spec.md` §4.7/§6: wire the cluster event loop's observer calls
//          into the published `Results` JSON.
// Dependencies: blis_core, blis_cluster, crate::{regret, results}
// ============================================================================

//! ## Overview
//! [`Recorder`] is the one concrete [`TraceSink`] implementation this
//! workspace ships (`blis-cluster::trace_sink::NullSink` is the zero-cost
//! alternative for trace-disabled runs). At trace level `none` it still
//! tracks per-SLO-class latency samples (those are part of the base
//! `Results` contract, not the optional trace summary) but skips routing
//! decisions entirely; at `summary` or `decisions` it also accumulates the
//! target distribution and per-decision regret needed for
//! [`results::TraceSummary`]. The two levels are not yet distinguished
//! further since this crate does not persist a full decision log — only
//! `blis-cli` would need that, and no such consumer exists yet.

use std::collections::BTreeMap;

use blis_cluster::ClusterResults;
use blis_cluster::trace_sink::CompletionTraceRecord;
use blis_cluster::trace_sink::RoutingTraceRecord;
use blis_cluster::trace_sink::TraceSink;
use blis_core::InstanceId;
use blis_core::SloClass;

use crate::error::TraceError;
use crate::regret::decision_regret;
use crate::regret::jain_fairness_index;
use crate::results::AggregateMetrics;
use crate::results::InstanceResults;
use crate::results::Results;
use crate::results::SloClassResults;
use crate::results::TraceSummary;

/// Trace verbosity, matching `spec.md` §6's `trace level ∈ {none, summary,
/// decisions}` configuration knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceLevel {
    /// No trace summary is published.
    None,
    /// Aggregate trace summary only (target distribution, fairness,
    /// regret).
    Summary,
    /// Same as `Summary` in this crate; reserved for a future per-decision
    /// log consumer.
    Decisions,
}

#[derive(Debug, Clone, Default)]
struct SloSamples {
    ttft_ms: Vec<f64>,
    e2e_ms: Vec<f64>,
    completed: u64,
}

/// Accumulates completion and routing telemetry across a run and builds
/// the published [`Results`].
pub struct Recorder {
    level: TraceLevel,
    target_distribution: BTreeMap<InstanceId, u64>,
    regrets: Vec<f64>,
    slo_samples: BTreeMap<String, SloSamples>,
}

impl Recorder {
    /// Starts a recorder for a cluster with `instance_ids` (so the target
    /// distribution and Jain fairness index are computed over the true
    /// instance count, including instances that never receive traffic).
    #[must_use]
    pub fn new(level: TraceLevel, instance_ids: impl IntoIterator<Item = InstanceId>) -> Self {
        Self {
            level,
            target_distribution: instance_ids.into_iter().map(|id| (id, 0)).collect(),
            regrets: Vec::new(),
            slo_samples: BTreeMap::new(),
        }
    }

    /// Builds the results contract for a completed run.
    ///
    /// # Errors
    /// Returns [`TraceError::RegretUnavailable`] if the trace level is
    /// below `summary` (no routing decisions were ever recorded, so a
    /// trace summary would be fabricated rather than computed).
    pub fn build_results(&self, cluster: &ClusterResults) -> Result<Results, TraceError> {
        let wall_clock_secs = cluster.wall_clock.as_millis_f64() / 1_000.0;

        let mut all_ttft = Vec::new();
        let mut all_e2e = Vec::new();
        let mut all_itl = Vec::new();
        let mut instances = Vec::with_capacity(cluster.instances.len());
        let mut total_completed = 0u64;
        let mut total_rejected = 0u64;
        let mut total_preemptions = 0u64;
        let mut total_cache_hit_tokens = 0u64;
        let mut total_cache_miss_tokens = 0u64;

        for (index, metrics) in cluster.instances.iter().enumerate() {
            all_ttft.extend_from_slice(&metrics.ttft_samples_ms);
            all_e2e.extend_from_slice(&metrics.e2e_samples_ms);
            all_itl.extend_from_slice(&metrics.itl_samples_ms);
            total_completed += metrics.completed_count;
            total_rejected += metrics.rejected_count;
            total_preemptions += metrics.preemption_count;
            total_cache_hit_tokens += metrics.cache_hit_tokens;
            total_cache_miss_tokens += metrics.cache_miss_tokens;

            let instance_metrics = AggregateMetrics::from_samples(
                &metrics.ttft_samples_ms,
                &metrics.e2e_samples_ms,
                &metrics.itl_samples_ms,
                metrics.completed_count,
                metrics.rejected_count,
                metrics.preemption_count,
                wall_clock_secs,
            );
            #[allow(clippy::cast_possible_truncation, reason = "instance index is bounded by the configured instance count")]
            let instance_id = index as u32;
            instances.push(InstanceResults { instance_id, metrics: instance_metrics });
        }
        total_rejected += cluster.total_rejected;

        let cluster_metrics = AggregateMetrics::from_samples(&all_ttft, &all_e2e, &all_itl, total_completed, total_rejected, total_preemptions, wall_clock_secs);

        let per_slo_class = self
            .slo_samples
            .iter()
            .map(|(slo_class, samples)| SloClassResults {
                slo_class: slo_class.clone(),
                metrics: AggregateMetrics::from_samples(&samples.ttft_ms, &samples.e2e_ms, &[], samples.completed, 0, 0, wall_clock_secs),
            })
            .collect();

        let trace = match self.level {
            TraceLevel::None => None,
            TraceLevel::Summary | TraceLevel::Decisions => {
                if self.regrets.is_empty() && self.target_distribution.values().all(|&count| count == 0) {
                    return Err(TraceError::RegretUnavailable);
                }
                let mean_regret = if self.regrets.is_empty() { 0.0 } else { self.regrets.iter().sum::<f64>() / self.regrets.len() as f64 };
                let max_regret = self.regrets.iter().copied().fold(0.0_f64, f64::max);
                let total_prefill_tokens = total_cache_hit_tokens + total_cache_miss_tokens;
                let cache_hit_rate = if total_prefill_tokens == 0 { 0.0 } else { total_cache_hit_tokens as f64 / total_prefill_tokens as f64 };
                Some(TraceSummary {
                    target_distribution: self.target_distribution.iter().map(|(id, &count)| (id.0, count)).collect(),
                    jain_fairness_index: jain_fairness_index(&self.target_distribution),
                    mean_regret,
                    max_regret,
                    cache_hit_rate,
                    hol_blocking_count: 0,
                    priority_inversion_count: 0,
                })
            }
        };

        Ok(Results { cluster: cluster_metrics, instances, per_slo_class, trace })
    }
}

impl TraceSink for Recorder {
    fn record_routing(&mut self, record: RoutingTraceRecord) {
        if self.level == TraceLevel::None {
            return;
        }
        *self.target_distribution.entry(record.chosen).or_insert(0) += 1;
        if let Some(regret) = decision_regret(&record) {
            self.regrets.push(regret.regret());
        }
    }

    fn record_completion(&mut self, record: CompletionTraceRecord) {
        let samples = self.slo_samples.entry(record.slo_class.key()).or_default();
        if let Some(ttft_ms) = record.ttft_ms {
            samples.ttft_ms.push(ttft_ms);
        }
        samples.e2e_ms.push(record.e2e_ms);
        samples.completed += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests assert directly on fixture data")]
mod tests {
    use blis_core::InstanceMetrics;
    use blis_core::Microseconds;
    use blis_core::RequestId;

    use super::*;

    #[test]
    fn none_level_still_tracks_per_slo_samples_but_skips_routing() {
        let mut recorder = Recorder::new(TraceLevel::None, [InstanceId(0)]);
        recorder.record_routing(RoutingTraceRecord {
            timestamp: Microseconds::ZERO,
            request_id: RequestId(0),
            chosen: InstanceId(0),
            scores: BTreeMap::new(),
            score_based: false,
            effective_loads: BTreeMap::new(),
        });
        recorder.record_completion(CompletionTraceRecord {
            timestamp: Microseconds::ZERO,
            request_id: RequestId(0),
            instance_id: InstanceId(0),
            slo_class: SloClass::Interactive,
            ttft_ms: Some(5.0),
            e2e_ms: 10.0,
        });
        let cluster = ClusterResults { instances: vec![InstanceMetrics::default()], total_injected: 1, total_rejected: 0, wall_clock: Microseconds::new(1_000_000) };
        let results = recorder.build_results(&cluster).expect("build succeeds");
        assert!(results.trace.is_none());
        assert_eq!(results.per_slo_class.len(), 1);
        assert_eq!(results.per_slo_class[0].metrics.completed_requests, 1);
    }

    #[test]
    fn summary_level_without_any_routing_decisions_is_rejected() {
        let recorder = Recorder::new(TraceLevel::Summary, [InstanceId(0)]);
        let cluster = ClusterResults { instances: vec![InstanceMetrics::default()], total_injected: 0, total_rejected: 0, wall_clock: Microseconds::ZERO };
        assert!(matches!(recorder.build_results(&cluster), Err(TraceError::RegretUnavailable)));
    }

    #[test]
    fn summary_level_reports_jain_fairness_and_regret() {
        let mut recorder = Recorder::new(TraceLevel::Summary, [InstanceId(0), InstanceId(1)]);
        let mut effective_loads = BTreeMap::new();
        effective_loads.insert(InstanceId(0), 2);
        effective_loads.insert(InstanceId(1), 0);
        recorder.record_routing(RoutingTraceRecord {
            timestamp: Microseconds::ZERO,
            request_id: RequestId(0),
            chosen: InstanceId(0),
            scores: BTreeMap::new(),
            score_based: false,
            effective_loads,
        });
        let cluster = ClusterResults { instances: vec![InstanceMetrics::default(), InstanceMetrics::default()], total_injected: 1, total_rejected: 0, wall_clock: Microseconds::new(1_000_000) };
        let results = recorder.build_results(&cluster).expect("build succeeds");
        let trace = results.trace.expect("trace summary present");
        assert!((trace.max_regret - 2.0).abs() < 1e-9);
        assert!((trace.jain_fairness_index - 0.5).abs() < 1e-9);
    }

    #[test]
    fn summary_level_reports_cache_hit_rate_from_instance_metrics() {
        let mut recorder = Recorder::new(TraceLevel::Summary, [InstanceId(0)]);
        recorder.record_routing(RoutingTraceRecord {
            timestamp: Microseconds::ZERO,
            request_id: RequestId(0),
            chosen: InstanceId(0),
            scores: BTreeMap::new(),
            score_based: false,
            effective_loads: BTreeMap::new(),
        });
        let metrics = InstanceMetrics { cache_hit_tokens: 75, cache_miss_tokens: 25, ..InstanceMetrics::default() };
        let cluster = ClusterResults { instances: vec![metrics], total_injected: 1, total_rejected: 0, wall_clock: Microseconds::new(1_000_000) };
        let results = recorder.build_results(&cluster).expect("build succeeds");
        let trace = results.trace.expect("trace summary present");
        assert!((trace.cache_hit_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn cache_hit_rate_is_zero_with_no_prefill_tokens_observed() {
        let mut recorder = Recorder::new(TraceLevel::Summary, [InstanceId(0)]);
        recorder.record_routing(RoutingTraceRecord {
            timestamp: Microseconds::ZERO,
            request_id: RequestId(0),
            chosen: InstanceId(0),
            scores: BTreeMap::new(),
            score_based: false,
            effective_loads: BTreeMap::new(),
        });
        let cluster = ClusterResults { instances: vec![InstanceMetrics::default()], total_injected: 1, total_rejected: 0, wall_clock: Microseconds::new(1_000_000) };
        let results = recorder.build_results(&cluster).expect("build succeeds");
        let trace = results.trace.expect("trace summary present");
        assert!((trace.cache_hit_rate - 0.0).abs() < 1e-9);
    }
}
