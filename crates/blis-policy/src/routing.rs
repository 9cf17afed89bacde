// blis-policy/src/routing.rs
// ============================================================================
// Module: Routing Policy
// Description: Chooses which instance a newly admitted request is sent to.
// Purpose: `spec.md` §4.4 RoutingPolicy contract and its non-composite
//          example implementations; the weighted-composite router lives in
//          `crate::composite` since its scorer aggregation is substantial
//          enough to warrant its own module.
// Dependencies: blis_core, crate::composite
// ============================================================================

use std::collections::BTreeMap;

use blis_core::Request;
use blis_core::RouterSnapshot;
use blis_core::ids::InstanceId;

use crate::error::PolicyError;

/// Chooses the instance a newly admitted request routes to. Returns the
/// chosen instance plus the per-instance score map used for the trace
/// recorder's counterfactual regret computation.
pub trait RoutingPolicy {
    /// Routes `request` against the current `snapshots`.
    ///
    /// # Errors
    /// Returns [`PolicyError::NoInstances`] when `snapshots` is empty.
    fn route(&mut self, request: &Request, snapshots: &[RouterSnapshot]) -> Result<(InstanceId, BTreeMap<InstanceId, f64>), PolicyError>;

    /// Whether the returned score map is a genuine ranking (`true`, for the
    /// weighted-composite router) or a 1.0/0.0 chosen-instance indicator
    /// (`false`, the default). `blis-trace`'s counterfactual regret
    /// computation uses this to decide whether to trust the returned scores
    /// or fall back to `-effective_load` (`spec.md` §4.7).
    fn is_score_based(&self) -> bool {
        false
    }
}

fn uniform_scores(snapshots: &[RouterSnapshot], chosen: InstanceId) -> BTreeMap<InstanceId, f64> {
    snapshots
        .iter()
        .map(|snapshot| (snapshot.instance_id, if snapshot.instance_id == chosen { 1.0 } else { 0.0 }))
        .collect()
}

/// Monotonic counter modulo the number of instances in the current
/// snapshot set.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin {
    next: usize,
}

impl RoutingPolicy for RoundRobin {
    fn route(&mut self, _request: &Request, snapshots: &[RouterSnapshot]) -> Result<(InstanceId, BTreeMap<InstanceId, f64>), PolicyError> {
        if snapshots.is_empty() {
            return Err(PolicyError::NoInstances);
        }
        let index = self.next % snapshots.len();
        self.next = self.next.wrapping_add(1);
        let chosen = snapshots[index].instance_id;
        Ok((chosen, uniform_scores(snapshots, chosen)))
    }
}

/// Argmin of `effective_load`. Ties resolve to the first instance in
/// snapshot order (strict `<` comparison).
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastLoaded;

impl RoutingPolicy for LeastLoaded {
    fn route(&mut self, _request: &Request, snapshots: &[RouterSnapshot]) -> Result<(InstanceId, BTreeMap<InstanceId, f64>), PolicyError> {
        let mut best: Option<(InstanceId, u32)> = None;
        for snapshot in snapshots {
            let load = snapshot.effective_load();
            match best {
                Some((_, best_load)) if load < best_load => best = Some((snapshot.instance_id, load)),
                Some(_) => {}
                None => best = Some((snapshot.instance_id, load)),
            }
        }
        let (chosen, _) = best.ok_or(PolicyError::NoInstances)?;
        Ok((chosen, uniform_scores(snapshots, chosen)))
    }
}

/// Argmax of `effective_load`: a pathological template for anomaly-detector
/// testing, routing every request to the single busiest instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysBusiest;

impl RoutingPolicy for AlwaysBusiest {
    fn route(&mut self, _request: &Request, snapshots: &[RouterSnapshot]) -> Result<(InstanceId, BTreeMap<InstanceId, f64>), PolicyError> {
        let mut best: Option<(InstanceId, u32)> = None;
        for snapshot in snapshots {
            let load = snapshot.effective_load();
            match best {
                Some((_, best_load)) if load > best_load => best = Some((snapshot.instance_id, load)),
                Some(_) => {}
                None => best = Some((snapshot.instance_id, load)),
            }
        }
        let (chosen, _) = best.ok_or(PolicyError::NoInstances)?;
        Ok((chosen, uniform_scores(snapshots, chosen)))
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
    fn round_robin_cycles() {
        let mut policy = RoundRobin::default();
        let snapshots = vec![snapshot(0, 0), snapshot(1, 0), snapshot(2, 0)];
        let request = fixture_request();
        let (first, _) = policy.route(&request, &snapshots).unwrap();
        let (second, _) = policy.route(&request, &snapshots).unwrap();
        let (third, _) = policy.route(&request, &snapshots).unwrap();
        let (fourth, _) = policy.route(&request, &snapshots).unwrap();
        assert_eq!(first, InstanceId(0));
        assert_eq!(second, InstanceId(1));
        assert_eq!(third, InstanceId(2));
        assert_eq!(fourth, InstanceId(0));
    }

    #[test]
    fn least_loaded_picks_argmin_and_breaks_ties_first() {
        let mut policy = LeastLoaded;
        let snapshots = vec![snapshot(0, 5), snapshot(1, 2), snapshot(2, 2)];
        let request = fixture_request();
        let (chosen, _) = policy.route(&request, &snapshots).unwrap();
        assert_eq!(chosen, InstanceId(1));
    }

    #[test]
    fn always_busiest_picks_argmax() {
        let mut policy = AlwaysBusiest;
        let snapshots = vec![snapshot(0, 5), snapshot(1, 9), snapshot(2, 2)];
        let request = fixture_request();
        let (chosen, _) = policy.route(&request, &snapshots).unwrap();
        assert_eq!(chosen, InstanceId(1));
    }

    #[test]
    fn empty_snapshots_errors() {
        let mut policy = LeastLoaded;
        let request = fixture_request();
        assert_eq!(policy.route(&request, &[]), Err(PolicyError::NoInstances));
    }
}
