// blis-policy/tests/integration.rs
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests assert directly on fixture data"
)]

use std::cell::RefCell;
use std::rc::Rc;

use blis_core::Microseconds;
use blis_core::Request;
use blis_core::RouterSnapshot;
use blis_core::ids::ClientId;
use blis_core::ids::InstanceId;
use blis_core::ids::RequestId;
use blis_core::ids::SloClass;
use blis_core::ids::TenantId;
use blis_core::request::RequestState;
use blis_policy::AdmissionDecision;
use blis_policy::AdmissionKind;
use blis_policy::PolicyError;
use blis_policy::PrefixCacheIndex;
use blis_policy::RoutingKind;
use blis_policy::ScorerCatalogContext;
use blis_policy::build_scorers;

fn fixture_request(id: u64, tokens: Vec<u64>) -> Request {
    Request {
        id: RequestId(id),
        tenant_id: TenantId("t".to_owned()),
        client_id: ClientId("c".to_owned()),
        slo_class: SloClass::Interactive,
        input_tokens: tokens,
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
fn cold_start_cascade_concentrates_on_one_instance() {
    let index = Rc::new(RefCell::new(PrefixCacheIndex::new()));
    let ctx = ScorerCatalogContext { block_size: 4, prefix_index: index, block_latency_saving_us: 0.0, queue_delay_estimator: None };
    let scorers = build_scorers(&[("prefix-affinity".to_owned(), 1.0)], &ctx).unwrap();
    let mut router = RoutingKind::WeightedComposite { scorers }.build().unwrap();

    let snapshots: Vec<RouterSnapshot> = (0..4).map(|id| snapshot(id, 0)).collect();
    let shared_prefix = vec![1, 2, 3, 4, 5, 6, 7, 8];

    let mut chosen_instances = Vec::new();
    for i in 0..200u64 {
        let request = fixture_request(i, shared_prefix.clone());
        let (chosen, _) = router.route(&request, &snapshots).unwrap();
        chosen_instances.push(chosen);
    }

    assert!(chosen_instances.iter().all(|instance| *instance == InstanceId(0)));
}

#[test]
fn admission_then_routing_pipeline_accepts_and_routes() {
    let mut admission = AdmissionKind::TokenBucket { capacity: 5.0, refill_rate_per_sec: 0.0 }.build();
    let mut routing = RoutingKind::LeastLoaded.build().unwrap();

    let snapshots = vec![snapshot(0, 3), snapshot(1, 1)];
    let request = fixture_request(0, vec![1, 2, 3]);

    let decision = admission.admit(&request, &snapshots, Microseconds::ZERO);
    assert_eq!(decision, AdmissionDecision::Accept);

    let (chosen, scores) = routing.route(&request, &snapshots).unwrap();
    assert_eq!(chosen, InstanceId(1));
    assert_eq!(scores.len(), 2);
}

#[test]
fn weighted_composite_rejects_invalid_configuration_without_panicking() {
    let index = Rc::new(RefCell::new(PrefixCacheIndex::new()));
    let ctx = ScorerCatalogContext { block_size: 4, prefix_index: index, block_latency_saving_us: 0.0, queue_delay_estimator: None };
    let result = build_scorers(&[("totally-made-up".to_owned(), 1.0)], &ctx);
    assert_eq!(result.err(), Some(PolicyError::UnknownScorer { name: "totally-made-up".to_owned() }));
}
