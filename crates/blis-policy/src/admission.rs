// blis-policy/src/admission.rs
// ============================================================================
// Module: Admission Policy
// Description: The admit/reject decision made before routing.
// Purpose: `spec.md` §4.4 AdmissionPolicy contract and its three example
//          implementations.
// Dependencies: blis_core
// ============================================================================

//! ## Overview
//! An `AdmissionPolicy` sees the cluster-wide snapshot set, never a single
//! instance, since admission decisions (token-bucket draining, SLO-class
//! gating) are properties of the whole fleet's current load rather than
//! any one instance's.

use std::collections::HashMap;

use blis_core::Microseconds;
use blis_core::Request;
use blis_core::RouterSnapshot;
use blis_core::ids::SloClass;

/// Outcome of an admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The request proceeds to routing.
    Accept,
    /// The request is rejected before routing.
    Reject,
}

/// Decides whether a newly arrived request proceeds to routing.
pub trait AdmissionPolicy {
    /// Evaluates one admission decision.
    fn admit(&mut self, request: &Request, snapshots: &[RouterSnapshot], now: Microseconds) -> AdmissionDecision;
}

/// Admits every request unconditionally.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAdmit;

impl AdmissionPolicy for AlwaysAdmit {
    fn admit(&mut self, _request: &Request, _snapshots: &[RouterSnapshot], _now: Microseconds) -> AdmissionDecision {
        AdmissionDecision::Accept
    }
}

/// Token-bucket admission: capacity `C` tokens, refilled at `r` tokens per
/// second; one token is consumed per admitted request.
#[derive(Debug, Clone, Copy)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate_per_us: f64,
    tokens: f64,
    last_refill: Microseconds,
}

impl TokenBucket {
    /// Builds a full bucket of `capacity` tokens refilling at
    /// `refill_rate_per_sec` tokens/second.
    #[must_use]
    pub fn new(capacity: f64, refill_rate_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_rate_per_us: refill_rate_per_sec / 1_000_000.0,
            tokens: capacity,
            last_refill: Microseconds::ZERO,
        }
    }

    fn refill(&mut self, now: Microseconds) {
        let elapsed = now - self.last_refill;
        #[allow(clippy::cast_precision_loss, reason = "elapsed microseconds fit well within f64's exact integer range")]
        let elapsed_us = elapsed as f64;
        self.tokens = (self.tokens + elapsed_us * self.refill_rate_per_us).min(self.capacity);
        self.last_refill = now;
    }
}

impl AdmissionPolicy for TokenBucket {
    fn admit(&mut self, _request: &Request, _snapshots: &[RouterSnapshot], now: Microseconds) -> AdmissionDecision {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            AdmissionDecision::Accept
        } else {
            AdmissionDecision::Reject
        }
    }
}

/// SLO-gated admission: rejects a request whose SLO class has a
/// configured per-class queue-depth threshold once the cluster's total
/// queue depth exceeds it.
#[derive(Debug, Clone)]
pub struct SloGated {
    thresholds: HashMap<String, u32>,
}

impl SloGated {
    /// Builds an SLO-gated policy from a map of SLO-class key to maximum
    /// total queue depth before that class is rejected.
    #[must_use]
    pub fn new(thresholds: HashMap<String, u32>) -> Self {
        Self { thresholds }
    }

    fn total_queue_depth(snapshots: &[RouterSnapshot]) -> u32 {
        snapshots.iter().map(|snapshot| snapshot.queue_depth).sum()
    }
}

impl AdmissionPolicy for SloGated {
    fn admit(&mut self, request: &Request, snapshots: &[RouterSnapshot], _now: Microseconds) -> AdmissionDecision {
        let class_key = slo_class_key(&request.slo_class);
        let Some(&threshold) = self.thresholds.get(&class_key) else {
            return AdmissionDecision::Accept;
        };
        if Self::total_queue_depth(snapshots) > threshold {
            AdmissionDecision::Reject
        } else {
            AdmissionDecision::Accept
        }
    }
}

fn slo_class_key(class: &SloClass) -> String {
    class.key()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests assert directly on fixture data"
)]
mod tests {
    use blis_core::ids::ClientId;
    use blis_core::ids::RequestId;
    use blis_core::ids::TenantId;
    use blis_core::request::RequestState;

    use super::*;

    fn fixture_request(slo_class: SloClass) -> Request {
        Request {
            id: RequestId(0),
            tenant_id: TenantId("t".to_owned()),
            client_id: ClientId("c".to_owned()),
            slo_class,
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
    fn always_admit_never_rejects() {
        let mut policy = AlwaysAdmit;
        let request = fixture_request(SloClass::Batch);
        assert_eq!(policy.admit(&request, &[], Microseconds::ZERO), AdmissionDecision::Accept);
    }

    #[test]
    fn token_bucket_rejects_once_exhausted() {
        let mut policy = TokenBucket::new(2.0, 0.0);
        let request = fixture_request(SloClass::Interactive);
        assert_eq!(policy.admit(&request, &[], Microseconds::ZERO), AdmissionDecision::Accept);
        assert_eq!(policy.admit(&request, &[], Microseconds::ZERO), AdmissionDecision::Accept);
        assert_eq!(policy.admit(&request, &[], Microseconds::ZERO), AdmissionDecision::Reject);
    }

    #[test]
    fn token_bucket_refills_over_time() {
        let mut policy = TokenBucket::new(1.0, 1_000_000.0);
        let request = fixture_request(SloClass::Interactive);
        assert_eq!(policy.admit(&request, &[], Microseconds::ZERO), AdmissionDecision::Accept);
        assert_eq!(policy.admit(&request, &[], Microseconds::ZERO), AdmissionDecision::Reject);
        assert_eq!(policy.admit(&request, &[], Microseconds::new(2)), AdmissionDecision::Accept);
    }

    #[test]
    fn slo_gated_rejects_above_threshold() {
        let mut thresholds = HashMap::new();
        thresholds.insert("batch".to_owned(), 5);
        let mut policy = SloGated::new(thresholds);
        let request = fixture_request(SloClass::Batch);
        let snapshot =
            RouterSnapshot { instance_id: blis_core::InstanceId(0), queue_depth: 10, batch_size: 0, pending_requests: 0, kv_utilization: 0.0, stale_as_of: 0 };
        assert_eq!(policy.admit(&request, &[snapshot], Microseconds::ZERO), AdmissionDecision::Reject);
    }
}
