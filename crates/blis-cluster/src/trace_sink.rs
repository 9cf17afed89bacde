// blis-cluster/src/trace_sink.rs
// ============================================================================
// Module: Trace Sink
// Description: Narrow observer interface the event loop calls into on every
//              routing decision and completion.
// Purpose: Keep `blis-cluster` decoupled from `blis-trace`, mirroring the
//          teacher's `Sink` trait (`decision-gate-broker::sink::Sink`): the
//          event loop dispatches through a trait object and never knows
//          which concrete recorder (or none) is attached.
// Dependencies: blis_core, std::collections::BTreeMap
// ============================================================================

//! ## Overview
//! `spec.md` §4.7: a trace recorder at level >= decisions records, for every
//! routing decision, the chosen instance and the full per-instance score
//! map (for counterfactual regret). [`TraceSink`] is that one callback,
//! named and swappable the way the teacher's `Sink` implementations are;
//! [`NullSink`] is the zero-overhead default for runs with trace disabled.

use std::collections::BTreeMap;

use blis_core::InstanceId;
use blis_core::Microseconds;
use blis_core::RequestId;
use blis_core::SloClass;

/// One routing decision's full scoring context, as needed for counterfactual
/// regret computation (`spec.md` §4.7).
#[derive(Debug, Clone)]
pub struct RoutingTraceRecord {
    /// Simulated timestamp of the decision.
    pub timestamp: Microseconds,
    /// The request being routed.
    pub request_id: RequestId,
    /// The instance actually chosen.
    pub chosen: InstanceId,
    /// Score assigned to every candidate instance, keyed by instance id so
    /// downstream regret computation can recover a stable ordering. For a
    /// score-less policy this is a 1.0/0.0 chosen-instance indicator, not a
    /// real ranking — see `score_based`.
    pub scores: BTreeMap<InstanceId, f64>,
    /// Whether `scores` is a genuine ranking. `false` for round-robin,
    /// least-loaded, and always-busiest; `true` only for the weighted
    /// composite router.
    pub score_based: bool,
    /// Every candidate instance's `effective_load` at decision time, used
    /// as the `-effective_load` fallback score for score-less policies
    /// (`spec.md` §4.7).
    pub effective_loads: BTreeMap<InstanceId, u32>,
}

/// One request's completion, as needed for latency and throughput metrics.
///
/// Carries its own SLO class and latency figures (rather than requiring a
/// second lookup into `InstanceMetrics`) so `blis-trace` can aggregate
/// per-SLO-class breakdowns independently of per-instance ones.
#[derive(Debug, Clone)]
pub struct CompletionTraceRecord {
    /// Simulated completion timestamp.
    pub timestamp: Microseconds,
    /// The request that completed.
    pub request_id: RequestId,
    /// The instance it completed on.
    pub instance_id: InstanceId,
    /// The completed request's SLO class.
    pub slo_class: SloClass,
    /// Time to first token, in milliseconds, if the request ever ran.
    pub ttft_ms: Option<f64>,
    /// End-to-end latency, in milliseconds (arrival to completion).
    pub e2e_ms: f64,
}

/// Observer the cluster event loop notifies on routing decisions and
/// completions. Implemented by `blis-trace`'s recorder; [`NullSink`] is the
/// no-op default.
pub trait TraceSink {
    /// Called once per `RoutingDecision`, after the instance is chosen.
    fn record_routing(&mut self, record: RoutingTraceRecord);
    /// Called once per request `Completion`.
    fn record_completion(&mut self, record: CompletionTraceRecord);
}

/// A [`TraceSink`] that discards everything, for runs with trace disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record_routing(&mut self, _record: RoutingTraceRecord) {}

    fn record_completion(&mut self, _record: CompletionTraceRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_accepts_records_without_panicking() {
        let mut sink = NullSink;
        sink.record_routing(RoutingTraceRecord {
            timestamp: Microseconds::ZERO,
            request_id: RequestId(0),
            chosen: InstanceId(0),
            scores: BTreeMap::new(),
            score_based: false,
            effective_loads: BTreeMap::new(),
        });
        sink.record_completion(CompletionTraceRecord {
            timestamp: Microseconds::ZERO,
            request_id: RequestId(0),
            instance_id: InstanceId(0),
            slo_class: blis_core::SloClass::Interactive,
            ttft_ms: Some(1.0),
            e2e_ms: 2.0,
        });
    }
}
