// blis-policy/src/composite.rs
// ============================================================================
// Module: Weighted Composite Router
// Description: Aggregates a weighted set of scorers into one routing
//              decision.
// Purpose: `spec.md` §4.4 weighted-composite contract.
// Dependencies: blis_core, crate::{error, routing, scorer}
// ============================================================================

use std::collections::BTreeMap;

use blis_core::Request;
use blis_core::RouterSnapshot;
use blis_core::ids::InstanceId;

use crate::error::PolicyError;
use crate::routing::RoutingPolicy;
use crate::scorer::Scorer;

/// Weighted sum of normalized scorer outputs. Weights are normalized to
/// sum to 1 at construction; routing picks argmax with strict `>` so the
/// first instance in snapshot order wins ties.
pub struct WeightedCompositeRouter {
    scorers: Vec<(Box<dyn Scorer>, f64)>,
}

impl WeightedCompositeRouter {
    /// Builds a composite router from `(scorer, weight)` pairs.
    ///
    /// # Errors
    /// Returns [`PolicyError::NoPositiveWeight`] if every weight is zero,
    /// or [`PolicyError::NegativeWeight`] if any weight is negative.
    pub fn new(scorers: Vec<(Box<dyn Scorer>, f64)>) -> Result<Self, PolicyError> {
        for (scorer, weight) in &scorers {
            if *weight < 0.0 {
                return Err(PolicyError::NegativeWeight { name: scorer.name().to_owned(), weight: *weight });
            }
        }
        let total: f64 = scorers.iter().map(|(_, weight)| weight).sum();
        if total <= 0.0 {
            return Err(PolicyError::NoPositiveWeight);
        }
        let normalized = scorers.into_iter().map(|(scorer, weight)| (scorer, weight / total)).collect();
        Ok(Self { scorers: normalized })
    }
}

impl RoutingPolicy for WeightedCompositeRouter {
    fn route(&mut self, request: &Request, snapshots: &[RouterSnapshot]) -> Result<(InstanceId, BTreeMap<InstanceId, f64>), PolicyError> {
        if snapshots.is_empty() {
            return Err(PolicyError::NoInstances);
        }

        let mut composite: BTreeMap<InstanceId, f64> = BTreeMap::new();
        for snapshot in snapshots {
            let mut total = 0.0;
            for (scorer, weight) in &self.scorers {
                total += weight * scorer.score(request, snapshot.instance_id, snapshots);
            }
            composite.insert(snapshot.instance_id, total);
        }

        let mut chosen: Option<(InstanceId, f64)> = None;
        for snapshot in snapshots {
            let score = composite[&snapshot.instance_id];
            match chosen {
                Some((_, best)) if score > best => chosen = Some((snapshot.instance_id, score)),
                Some(_) => {}
                None => chosen = Some((snapshot.instance_id, score)),
            }
        }
        let (chosen_instance, _) = chosen.ok_or(PolicyError::NoInstances)?;

        for (scorer, _) in &mut self.scorers {
            scorer.observe(request, chosen_instance);
        }

        Ok((chosen_instance, composite))
    }

    fn is_score_based(&self) -> bool {
        true
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
    use blis_core::time::Microseconds;

    use super::*;
    use crate::scorer::QueueDepthScorer;

    fn fixture_request() -> Request {
        Request {
            id: RequestId(0),
            tenant_id: TenantId("t".to_owned()),
            client_id: ClientId("c".to_owned()),
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

    fn snapshot(id: u32, queue_depth: u32) -> RouterSnapshot {
        RouterSnapshot { instance_id: InstanceId(id), queue_depth, batch_size: 0, pending_requests: 0, kv_utilization: 0.0, stale_as_of: 0 }
    }

    #[test]
    fn rejects_all_zero_weights() {
        let result = WeightedCompositeRouter::new(vec![(Box::new(QueueDepthScorer), 0.0)]);
        assert_eq!(result.err(), Some(PolicyError::NoPositiveWeight));
    }

    #[test]
    fn rejects_negative_weight() {
        let result = WeightedCompositeRouter::new(vec![(Box::new(QueueDepthScorer), -1.0)]);
        assert_eq!(result.err(), Some(PolicyError::NegativeWeight { name: "queue-depth".to_owned(), weight: -1.0 }));
    }

    #[test]
    fn single_scorer_reduces_to_argmax() {
        let mut router = WeightedCompositeRouter::new(vec![(Box::new(QueueDepthScorer), 1.0)]).unwrap();
        let request = fixture_request();
        let snapshots = vec![snapshot(0, 10), snapshot(1, 0)];
        let (chosen, scores) = router.route(&request, &snapshots).unwrap();
        assert_eq!(chosen, InstanceId(1));
        assert_eq!(scores[&InstanceId(1)], 1.0);
    }

    #[test]
    fn ties_break_to_first_snapshot_position() {
        let mut router = WeightedCompositeRouter::new(vec![(Box::new(QueueDepthScorer), 1.0)]).unwrap();
        let request = fixture_request();
        let snapshots = vec![snapshot(0, 5), snapshot(1, 5)];
        let (chosen, _) = router.route(&request, &snapshots).unwrap();
        assert_eq!(chosen, InstanceId(0));
    }
}
