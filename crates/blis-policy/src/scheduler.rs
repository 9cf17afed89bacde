// blis-policy/src/scheduler.rs
// ============================================================================
// Module: Scheduler Policy
// Description: Orders an instance's wait-queue before admission into a batch.
// Purpose: `spec.md` §4.4 SchedulerPolicy contract and its four example
//          implementations.
// Dependencies: blis_core
// ============================================================================

use blis_core::Microseconds;
use blis_core::Request;

/// Reorders an instance's wait-queue in place, just before batch formation
/// decides which requests to admit.
pub trait SchedulerPolicy {
    /// Reorders `queue` in place. `now` is available for age-sensitive
    /// orderings.
    fn order_queue(&self, queue: &mut Vec<Request>, now: Microseconds);
}

/// First-come, first-served: leaves arrival order untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fcfs;

impl SchedulerPolicy for Fcfs {
    fn order_queue(&self, _queue: &mut Vec<Request>, _now: Microseconds) {}
}

/// Shortest-job-first: ascending input-token length.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sjf;

impl SchedulerPolicy for Sjf {
    fn order_queue(&self, queue: &mut Vec<Request>, _now: Microseconds) {
        queue.sort_by_key(Request::input_len);
    }
}

/// Descending priority, ties broken by ascending arrival time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityFcfs;

impl SchedulerPolicy for PriorityFcfs {
    fn order_queue(&self, queue: &mut Vec<Request>, _now: Microseconds) {
        queue.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.arrival_time.cmp(&b.arrival_time))
        });
    }
}

/// Ascending priority: a pathological template for anomaly-detector testing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReversePriority;

impl SchedulerPolicy for ReversePriority {
    fn order_queue(&self, queue: &mut Vec<Request>, _now: Microseconds) {
        queue.sort_by(|a, b| {
            a.priority
                .partial_cmp(&b.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.arrival_time.cmp(&b.arrival_time))
        });
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

    fn fixture_request(id: u64, input_len: usize, priority: f64, arrival_time: u64) -> Request {
        Request {
            id: RequestId(id),
            tenant_id: TenantId("t".to_owned()),
            client_id: ClientId("c".to_owned()),
            slo_class: SloClass::Interactive,
            input_tokens: vec![0; input_len],
            planned_output_tokens: 10,
            arrival_time: Microseconds::new(arrival_time),
            state: RequestState::Queued,
            progress: 0,
            priority,
            prefix_group: None,
            turn: None,
            preemption_count: 0,
            first_token_time: None,
            completion_time: None,
        }
    }

    #[test]
    fn fcfs_is_a_no_op() {
        let mut queue = vec![fixture_request(0, 10, 0.0, 5), fixture_request(1, 5, 0.0, 1)];
        Fcfs.order_queue(&mut queue, Microseconds::ZERO);
        assert_eq!(queue[0].id, RequestId(0));
        assert_eq!(queue[1].id, RequestId(1));
    }

    #[test]
    fn sjf_orders_by_ascending_input_length() {
        let mut queue = vec![fixture_request(0, 100, 0.0, 0), fixture_request(1, 5, 0.0, 0), fixture_request(2, 50, 0.0, 0)];
        Sjf.order_queue(&mut queue, Microseconds::ZERO);
        assert_eq!(queue.iter().map(|r| r.id).collect::<Vec<_>>(), vec![RequestId(1), RequestId(2), RequestId(0)]);
    }

    #[test]
    fn priority_fcfs_breaks_ties_by_arrival() {
        let mut queue = vec![fixture_request(0, 1, 5.0, 10), fixture_request(1, 1, 5.0, 1), fixture_request(2, 1, 9.0, 0)];
        PriorityFcfs.order_queue(&mut queue, Microseconds::ZERO);
        assert_eq!(queue.iter().map(|r| r.id).collect::<Vec<_>>(), vec![RequestId(2), RequestId(1), RequestId(0)]);
    }

    #[test]
    fn reverse_priority_is_ascending() {
        let mut queue = vec![fixture_request(0, 1, 5.0, 0), fixture_request(1, 1, 1.0, 0)];
        ReversePriority.order_queue(&mut queue, Microseconds::ZERO);
        assert_eq!(queue[0].id, RequestId(1));
        assert_eq!(queue[1].id, RequestId(0));
    }
}
