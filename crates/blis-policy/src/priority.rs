// blis-policy/src/priority.rs
// ============================================================================
// Module: Priority Policy
// Description: Assigns the priority score a scheduler consumes.
// Purpose: `spec.md` §4.4 PriorityPolicy contract and its three example
//          implementations.
// Dependencies: blis_core
// ============================================================================

use std::collections::HashMap;

use blis_core::Microseconds;
use blis_core::Request;

/// Assigns a priority score, consumed by a [`crate::scheduler::SchedulerPolicy`].
pub trait PriorityPolicy {
    /// Computes the priority score for `request` at `now`. Higher is
    /// interpreted as higher priority by every scheduler in this crate.
    fn compute(&self, request: &Request, now: Microseconds) -> f64;
}

/// Every request gets the same fixed priority.
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub f64);

impl PriorityPolicy for Constant {
    fn compute(&self, _request: &Request, _now: Microseconds) -> f64 {
        self.0
    }
}

/// Pure age-based priority: `priority = age_weight * (now - arrival)`.
///
/// Some source configurations name this policy "slo-based" without it
/// actually reading the request's SLO class; under identical per-class
/// service times it is mathematically equivalent to FCFS. Kept distinct
/// from [`SloBased`], which does read the class, per an explicit decision
/// to retain both rather than silently resolve the ambiguity.
#[derive(Debug, Clone, Copy)]
pub struct AgeOnly {
    /// Age coefficient.
    pub age_weight: f64,
}

impl PriorityPolicy for AgeOnly {
    fn compute(&self, request: &Request, now: Microseconds) -> f64 {
        #[allow(clippy::cast_precision_loss, reason = "age in microseconds fits well within f64's exact integer range")]
        let age_us = (now - request.arrival_time) as f64;
        self.age_weight * age_us
    }
}

/// `priority = base[slo_class] + age_weight * (now - arrival)`: the
/// true SLO-class-tiered variant, distinguished by name from [`AgeOnly`].
#[derive(Debug, Clone)]
pub struct SloBased {
    base: HashMap<String, f64>,
    age_weight: f64,
}

impl SloBased {
    /// Builds an SLO-based priority policy from a per-class base score and
    /// an age coefficient.
    #[must_use]
    pub fn new(base: HashMap<String, f64>, age_weight: f64) -> Self {
        Self { base, age_weight }
    }
}

impl PriorityPolicy for SloBased {
    fn compute(&self, request: &Request, now: Microseconds) -> f64 {
        let base = self.base.get(&request.slo_class.key()).copied().unwrap_or(0.0);
        #[allow(clippy::cast_precision_loss, reason = "age in microseconds fits well within f64's exact integer range")]
        let age_us = (now - request.arrival_time) as f64;
        base + self.age_weight * age_us
    }
}

/// `priority = -age_weight * (now - arrival)`: a pathological template
/// that inverts age-based priority, for anomaly-detector testing.
#[derive(Debug, Clone, Copy)]
pub struct InvertedSlo {
    /// Age coefficient, applied with a negative sign.
    pub age_weight: f64,
}

impl PriorityPolicy for InvertedSlo {
    fn compute(&self, request: &Request, now: Microseconds) -> f64 {
        #[allow(clippy::cast_precision_loss, reason = "age in microseconds fits well within f64's exact integer range")]
        let age_us = (now - request.arrival_time) as f64;
        -self.age_weight * age_us
    }
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
    use blis_core::ids::SloClass;
    use blis_core::ids::TenantId;
    use blis_core::request::RequestState;

    use super::*;

    fn fixture_request(arrival_time: Microseconds) -> Request {
        Request {
            id: RequestId(0),
            tenant_id: TenantId("t".to_owned()),
            client_id: ClientId("c".to_owned()),
            slo_class: SloClass::Realtime,
            input_tokens: vec![1],
            planned_output_tokens: 1,
            arrival_time,
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
    fn constant_is_constant() {
        let policy = Constant(3.0);
        let request = fixture_request(Microseconds::ZERO);
        assert_eq!(policy.compute(&request, Microseconds::new(1000)), 3.0);
    }

    #[test]
    fn age_only_ignores_slo_class() {
        let policy = AgeOnly { age_weight: 0.01 };
        let realtime = fixture_request(Microseconds::ZERO);
        let mut batch = fixture_request(Microseconds::ZERO);
        batch.slo_class = blis_core::ids::SloClass::Batch;
        assert_eq!(policy.compute(&realtime, Microseconds::new(500)), policy.compute(&batch, Microseconds::new(500)));
    }

    #[test]
    fn slo_based_grows_with_age() {
        let mut base = HashMap::new();
        base.insert("realtime".to_owned(), 10.0);
        let policy = SloBased::new(base, 0.01);
        let request = fixture_request(Microseconds::ZERO);
        let early = policy.compute(&request, Microseconds::new(100));
        let late = policy.compute(&request, Microseconds::new(10_000));
        assert!(late > early);
    }

    #[test]
    fn inverted_slo_decreases_with_age() {
        let policy = InvertedSlo { age_weight: 0.01 };
        let request = fixture_request(Microseconds::ZERO);
        let early = policy.compute(&request, Microseconds::new(100));
        let late = policy.compute(&request, Microseconds::new(10_000));
        assert!(late < early);
    }
}
