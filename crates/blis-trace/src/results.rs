// blis-trace/src/results.rs
// ============================================================================
// Module: Results Contract
// Description: The serializable JSON shape published at the end of a run.
// Purpose: `spec.md` §6 "Metrics outputs" — field names and units are part
//          of the external contract and must match exactly.
// Dependencies: blis_core, serde, serde_json
// ============================================================================

//! ## Overview
//! Mirrors the teacher's `types.rs` pattern of plain, field-documented
//! `serde`-derived structs as the one canonical shape downstream tooling
//! consumes. Latencies are milliseconds; configuration echoed back (if
//! any) stays in microseconds, per `spec.md` §6.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Mean/p50/p99 (or mean/p99, for inter-token latency) over a latency
/// sample set, in milliseconds. Computed from a sorted copy of the samples
/// so percentile lookup is a plain index.
#[must_use]
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss, reason = "sample counts fit well within f64's exact integer range for realistic run sizes")]
    let rank = (p * (sorted.len() - 1) as f64).round();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "rank is non-negative and bounded by sorted.len() - 1")]
    let index = rank as usize;
    sorted[index.min(sorted.len() - 1)]
}

#[must_use]
fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss, reason = "sample counts fit well within f64's exact integer range for realistic run sizes")]
    let count = samples.len() as f64;
    samples.iter().sum::<f64>() / count
}

/// Throughput and latency aggregate shared by the cluster, per-instance,
/// and per-SLO-class sections of [`Results`] (`spec.md` §6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AggregateMetrics {
    /// Mean time-to-first-token, in milliseconds.
    pub ttft_mean_ms: f64,
    /// Median time-to-first-token, in milliseconds.
    pub ttft_p50_ms: f64,
    /// 99th-percentile time-to-first-token, in milliseconds.
    pub ttft_p99_ms: f64,
    /// Mean end-to-end latency, in milliseconds.
    pub e2e_mean_ms: f64,
    /// Median end-to-end latency, in milliseconds.
    pub e2e_p50_ms: f64,
    /// 99th-percentile end-to-end latency, in milliseconds.
    pub e2e_p99_ms: f64,
    /// Mean inter-token latency, in milliseconds.
    pub itl_mean_ms: f64,
    /// 99th-percentile inter-token latency, in milliseconds.
    pub itl_p99_ms: f64,
    /// Completed requests per wall-clock second of simulated time.
    pub responses_per_sec: f64,
    /// Count of completed requests.
    pub completed_requests: u64,
    /// Count of rejected requests.
    pub rejected_requests: u64,
    /// Count of preemption events.
    pub preemption_count: u64,
    /// Preemptions per completed request.
    pub preemption_rate: f64,
}

impl AggregateMetrics {
    /// Builds an aggregate from raw sample vectors and event counts.
    /// `wall_clock_secs` is shared across every aggregate in one run since
    /// the simulator has a single global clock.
    #[must_use]
    pub fn from_samples(
        ttft_samples_ms: &[f64],
        e2e_samples_ms: &[f64],
        itl_samples_ms: &[f64],
        completed_requests: u64,
        rejected_requests: u64,
        preemption_count: u64,
        wall_clock_secs: f64,
    ) -> Self {
        let mut ttft_sorted = ttft_samples_ms.to_vec();
        ttft_sorted.sort_by(|a, b| a.total_cmp(b));
        let mut e2e_sorted = e2e_samples_ms.to_vec();
        e2e_sorted.sort_by(|a, b| a.total_cmp(b));
        let mut itl_sorted = itl_samples_ms.to_vec();
        itl_sorted.sort_by(|a, b| a.total_cmp(b));

        #[allow(clippy::cast_precision_loss, reason = "request counts fit well within f64's exact integer range for realistic run sizes")]
        let responses_per_sec = if wall_clock_secs > 0.0 { completed_requests as f64 / wall_clock_secs } else { 0.0 };
        #[allow(clippy::cast_precision_loss, reason = "request counts fit well within f64's exact integer range for realistic run sizes")]
        let preemption_rate = if completed_requests > 0 { preemption_count as f64 / completed_requests as f64 } else { 0.0 };

        Self {
            ttft_mean_ms: mean(&ttft_sorted),
            ttft_p50_ms: percentile(&ttft_sorted, 0.50),
            ttft_p99_ms: percentile(&ttft_sorted, 0.99),
            e2e_mean_ms: mean(&e2e_sorted),
            e2e_p50_ms: percentile(&e2e_sorted, 0.50),
            e2e_p99_ms: percentile(&e2e_sorted, 0.99),
            itl_mean_ms: mean(&itl_sorted),
            itl_p99_ms: percentile(&itl_sorted, 0.99),
            responses_per_sec,
            completed_requests,
            rejected_requests,
            preemption_count,
            preemption_rate,
        }
    }
}

/// One instance's aggregate metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceResults {
    /// The instance's id.
    pub instance_id: u32,
    /// Aggregate metrics for this instance alone.
    #[serde(flatten)]
    pub metrics: AggregateMetrics,
}

/// One SLO class's aggregate metrics. Inter-token latency is not split by
/// SLO class (see `DESIGN.md`: per-request ITL attribution would require
/// plumbing beyond the current completion-trace record) and is reported
/// as zero here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloClassResults {
    /// The SLO class name (`realtime`, `interactive`, `batch`, or a custom
    /// class name).
    pub slo_class: String,
    /// Aggregate metrics for requests of this SLO class alone.
    #[serde(flatten)]
    pub metrics: AggregateMetrics,
}

/// Trace summary published when the run's trace level is at least
/// `decisions` (`spec.md` §4.7/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Count of requests routed to each instance, keyed by instance id.
    pub target_distribution: BTreeMap<u32, u64>,
    /// Jain fairness index of `target_distribution`.
    pub jain_fairness_index: f64,
    /// Mean counterfactual regret across every recorded routing decision.
    pub mean_regret: f64,
    /// Max counterfactual regret across every recorded routing decision.
    pub max_regret: f64,
    /// Prefix cache hit rate. Not yet wired to per-request cache-match
    /// telemetry; reported as `0.0` pending that instrumentation.
    pub cache_hit_rate: f64,
    /// Head-of-line blocking events. Not yet wired to scheduler-level
    /// telemetry; reported as `0` pending that instrumentation.
    pub hol_blocking_count: u64,
    /// Priority-inversion events. Not yet wired to scheduler-level
    /// telemetry; reported as `0` pending that instrumentation.
    pub priority_inversion_count: u64,
}

/// The full results contract published on stdout at the end of a run
/// (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Results {
    /// Cluster-wide aggregate metrics.
    pub cluster: AggregateMetrics,
    /// Per-instance aggregate metrics, in instance-id order.
    pub instances: Vec<InstanceResults>,
    /// Per-SLO-class aggregate metrics.
    pub per_slo_class: Vec<SloClassResults>,
    /// Trace summary, present only when trace level >= `decisions`.
    pub trace: Option<TraceSummary>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests assert directly on fixture data")]
mod tests {
    use super::*;

    #[test]
    fn aggregate_of_empty_samples_is_all_zero() {
        let aggregate = AggregateMetrics::from_samples(&[], &[], &[], 0, 0, 0, 1.0);
        assert_eq!(aggregate.ttft_mean_ms, 0.0);
        assert_eq!(aggregate.responses_per_sec, 0.0);
        assert_eq!(aggregate.preemption_rate, 0.0);
    }

    #[test]
    fn aggregate_computes_mean_and_tail_percentiles() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        let aggregate = AggregateMetrics::from_samples(&samples, &samples, &samples, 100, 0, 10, 10.0);
        assert!((aggregate.ttft_mean_ms - 50.5).abs() < 1e-9);
        assert!((aggregate.ttft_p50_ms - 50.0).abs() < 1.0);
        assert!((aggregate.ttft_p99_ms - 99.0).abs() < 1.0);
        assert!((aggregate.responses_per_sec - 10.0).abs() < 1e-9);
        assert!((aggregate.preemption_rate - 0.1).abs() < 1e-9);
    }
}
