// blis-cluster/src/qdelay.rs
// ============================================================================
// Module: Backend-Backed Queue Delay Estimator
// Description: Bridges a `LatencyBackend` into the policy framework's
//              `QueueDelayEstimator` capability.
// Purpose: `spec.md` §9's cost-benefit open question is resolved at the
//          `blis-policy` layer by a capability trait; this is the one
//          concrete implementation, since only this crate holds both a
//          chosen backend and a live snapshot.
// Dependencies: blis_latency, blis_policy
// ============================================================================

//! ## Overview
//! `CostBenefitScorer` needs an estimated queueing delay per instance but
//! must not depend on `blis-latency` directly (`blis-policy` stays
//! decoupled from the backend crate). [`BackendQueueDelayEstimator`] is the
//! adapter: it asks the backend for one request's queueing overhead, then
//! scales it by the snapshot's effective load as a proxy for "how long
//! would a new arrival wait behind everything already queued here".

use std::rc::Rc;

use blis_core::RouterSnapshot;
use blis_latency::LatencyBackend;
use blis_latency::traits::QueueingContext;
use blis_policy::QueueDelayEstimator;

/// Adapts a [`LatencyBackend`] into a [`QueueDelayEstimator`].
pub struct BackendQueueDelayEstimator {
    backend: Rc<dyn LatencyBackend>,
}

impl BackendQueueDelayEstimator {
    /// Wraps a shared backend handle.
    #[must_use]
    pub fn new(backend: Rc<dyn LatencyBackend>) -> Self {
        Self { backend }
    }
}

impl QueueDelayEstimator for BackendQueueDelayEstimator {
    #[allow(clippy::cast_precision_loss, reason = "queueing overhead in microseconds fits well within f64's exact integer range")]
    fn estimate_queue_delay_us(&self, snapshot: &RouterSnapshot) -> f64 {
        let per_request_us = self
            .backend
            .queueing_overhead(QueueingContext { input_len: 0 }, 0)
            .unwrap_or(0);
        per_request_us as f64 * f64::from(snapshot.effective_load())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests assert directly on fixture data")]
mod tests {
    use blis_core::InstanceId;
    use blis_latency::BackendError;
    use blis_latency::step::StepConfig;
    use blis_latency::traits::Microseconds as BackendMicroseconds;

    use super::*;

    struct FixedBackend(BackendMicroseconds);

    impl LatencyBackend for FixedBackend {
        fn step_time(&self, _step_config: &StepConfig) -> Result<BackendMicroseconds, BackendError> {
            Ok(0)
        }

        fn queueing_overhead(&self, _context: QueueingContext, _now: BackendMicroseconds) -> Result<BackendMicroseconds, BackendError> {
            Ok(self.0)
        }
    }

    #[test]
    fn estimate_scales_per_request_overhead_by_effective_load() {
        let estimator = BackendQueueDelayEstimator::new(Rc::new(FixedBackend(10)));
        let snapshot = RouterSnapshot {
            instance_id: InstanceId(0),
            queue_depth: 3,
            batch_size: 2,
            pending_requests: 0,
            kv_utilization: 0.0,
            stale_as_of: 0,
        };
        assert!((estimator.estimate_queue_delay_us(&snapshot) - 50.0).abs() < f64::EPSILON);
    }
}
