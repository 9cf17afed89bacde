// blis-core/tests/event_queue_ordering.rs
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests assert directly on fixture data"
)]

use blis_core::Event;
use blis_core::EventKind;
use blis_core::EventQueue;
use blis_core::InstanceId;
use blis_core::Microseconds;
use blis_core::RequestId;
use proptest::prelude::*;

fn sort_key(event: &Event) -> (u64, u8, u64) {
    let tier_rank = match event.kind {
        EventKind::ClusterArrival { .. } => 0,
        EventKind::AdmissionDecision { .. } => 1,
        EventKind::RoutingDecision { .. } => 2,
        EventKind::Queued { .. } => 3,
        EventKind::StepTick { .. } => 4,
        EventKind::Completion { .. } => 5,
        EventKind::SnapshotRefresh => 6,
    };
    (event.timestamp.as_u64(), tier_rank, event.seq.0)
}

proptest! {
    #[test]
    fn pop_order_is_never_lexicographically_decreasing(
        timestamps in prop::collection::vec(0u64..50, 1..200),
    ) {
        let mut queue = EventQueue::new();
        for (index, ts) in timestamps.iter().enumerate() {
            let kind = if index % 2 == 0 {
                EventKind::ClusterArrival { request_id: RequestId(index as u64) }
            } else {
                EventKind::StepTick { instance_id: InstanceId((index % 4) as u32) }
            };
            queue.schedule(Microseconds::new(*ts), kind);
        }

        let mut previous_key: Option<(u64, u8, u64)> = None;
        while let Some(event) = queue.pop() {
            let key = sort_key(&event);
            if let Some(prev) = previous_key {
                prop_assert!(prev <= key);
            }
            previous_key = Some(key);
        }
    }
}

#[test]
fn queue_drains_exactly_as_many_events_as_scheduled() {
    let mut queue = EventQueue::new();
    for i in 0..10 {
        queue.schedule(Microseconds::new(i), EventKind::SnapshotRefresh);
    }
    assert_eq!(queue.len(), 10);
    let mut drained = 0;
    while queue.pop().is_some() {
        drained += 1;
    }
    assert_eq!(drained, 10);
    assert!(queue.is_empty());
}
