// blis-core/src/event.rs
// ============================================================================
// Module: Global Event Queue
// Description: The `(timestamp, priority_tier, seq)`-ordered min-heap that
//              drives the discrete-event loop.
// Purpose: Guarantee a strict total order over events so that same-timestamp
//          bursts are resolved deterministically, never by heap stability.
// Dependencies: crate::ids, crate::time
// ============================================================================

//! ## Overview
//! Events are ordered by `(timestamp_us, priority_tier, seq_id)`
//! lexicographically. `priority_tier` is a fixed enum enforcing the
//! cross-tier ordering required at equal timestamps (arrival < admission <
//! routing < queued < step-complete < completion < snapshot-refresh);
//! `seq_id` is a monotonically increasing tie-breaker assigned at push time,
//! so two events pushed at the same `(timestamp, tier)` pop in push order.
//! `std::collections::BinaryHeap` is a max-heap; `EventQueue` inverts the
//! comparison so the *smallest* key pops first, and never relies on heap
//! stability (`spec.md` §9).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::ids::InstanceId;
use crate::ids::RequestId;
use crate::time::Microseconds;

// ============================================================================
// SECTION: Priority Tiers
// ============================================================================

/// Fixed priority-tier enum enforcing same-timestamp ordering.
///
/// # Invariants
/// - Declaration order is the enforced ordering (derived `Ord` uses variant
///   discriminant order); never reorder these variants without re-auditing
///   every co-timestamp test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityTier {
    /// Workload stream emits a request.
    ClusterArrival,
    /// Admission policy accepts or rejects.
    AdmissionDecision,
    /// Routing policy picks an instance.
    RoutingDecision,
    /// Instance absorbs the request into its wait-queue.
    Queued,
    /// An instance executes one batch step.
    StepTick,
    /// The last decode step for a request.
    Completion,
    /// Periodic stale-field refresh.
    SnapshotRefresh,
}

// ============================================================================
// SECTION: Event Payload
// ============================================================================

/// The payload carried by one scheduled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A new request has arrived at the cluster.
    ClusterArrival {
        /// The arriving request's id.
        request_id: RequestId,
    },
    /// The admission policy must decide on a buffered request.
    AdmissionDecision {
        /// The request under admission review.
        request_id: RequestId,
    },
    /// The routing policy must pick an instance for an admitted request.
    RoutingDecision {
        /// The request to route.
        request_id: RequestId,
    },
    /// A routed request is absorbed into an instance's wait-queue.
    Queued {
        /// The request being absorbed.
        request_id: RequestId,
        /// The instance absorbing it.
        instance_id: InstanceId,
    },
    /// An instance should form a batch and execute one step.
    StepTick {
        /// The instance to step.
        instance_id: InstanceId,
    },
    /// A request has completed on an instance.
    Completion {
        /// The completed request's id.
        request_id: RequestId,
        /// The instance it completed on.
        instance_id: InstanceId,
    },
    /// Periodic refresh of snapshot stale fields.
    SnapshotRefresh,
}

impl EventKind {
    /// Returns the fixed priority tier for this event kind.
    #[must_use]
    pub const fn tier(&self) -> PriorityTier {
        match self {
            Self::ClusterArrival { .. } => PriorityTier::ClusterArrival,
            Self::AdmissionDecision { .. } => PriorityTier::AdmissionDecision,
            Self::RoutingDecision { .. } => PriorityTier::RoutingDecision,
            Self::Queued { .. } => PriorityTier::Queued,
            Self::StepTick { .. } => PriorityTier::StepTick,
            Self::Completion { .. } => PriorityTier::Completion,
            Self::SnapshotRefresh => PriorityTier::SnapshotRefresh,
        }
    }
}

// ============================================================================
// SECTION: Sequence Id
// ============================================================================

/// Monotonically increasing tie-breaker assigned at push time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqId(pub u64);

// ============================================================================
// SECTION: Event and Ordering
// ============================================================================

/// One scheduled event: a timestamp, a fixed priority tier, a push-order
/// tie-breaker, and a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Simulated timestamp the event fires at.
    pub timestamp: Microseconds,
    /// Push-order tie-breaker.
    pub seq: SeqId,
    /// Event payload.
    pub kind: EventKind,
}

impl Event {
    fn sort_key(&self) -> (Microseconds, PriorityTier, SeqId) {
        (self.timestamp, self.kind.tier(), self.seq)
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the smallest key first.
        other.sort_key().cmp(&self.sort_key())
    }
}

// ============================================================================
// SECTION: Event Queue
// ============================================================================

/// Global min-heap of pending events, keyed by
/// `(timestamp, priority_tier, seq)`.
///
/// # Invariants
/// - For any two popped events `e1` then `e2`,
///   `(t1, tier1, seq1) <= (t2, tier2, seq2)` lexicographically.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
    next_seq: u64,
}

impl EventQueue {
    /// Creates an empty event queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedules an event at the given timestamp, assigning the next
    /// sequence number.
    pub fn schedule(&mut self, timestamp: Microseconds, kind: EventKind) {
        let seq = SeqId(self.next_seq);
        self.next_seq += 1;
        self.heap.push(Event {
            timestamp,
            seq,
            kind,
        });
    }

    /// Pops the event with the smallest `(timestamp, tier, seq)` key.
    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop()
    }

    /// Returns whether the queue has no pending events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests assert directly on fixture data")]
mod tests {
    use super::*;

    #[test]
    fn pops_in_timestamp_then_tier_then_seq_order() {
        let mut queue = EventQueue::new();
        queue.schedule(
            Microseconds::new(100),
            EventKind::StepTick {
                instance_id: InstanceId(0),
            },
        );
        queue.schedule(
            Microseconds::new(100),
            EventKind::ClusterArrival {
                request_id: RequestId(1),
            },
        );
        queue.schedule(
            Microseconds::new(50),
            EventKind::SnapshotRefresh,
        );

        let first = queue.pop().expect("queue has events");
        assert_eq!(first.timestamp, Microseconds::new(50));

        let second = queue.pop().expect("queue has events");
        assert_eq!(second.timestamp, Microseconds::new(100));
        assert_eq!(second.kind.tier(), PriorityTier::ClusterArrival);

        let third = queue.pop().expect("queue has events");
        assert_eq!(third.kind.tier(), PriorityTier::StepTick);
    }

    #[test]
    fn same_timestamp_same_tier_breaks_by_push_order() {
        let mut queue = EventQueue::new();
        queue.schedule(
            Microseconds::new(10),
            EventKind::ClusterArrival {
                request_id: RequestId(1),
            },
        );
        queue.schedule(
            Microseconds::new(10),
            EventKind::ClusterArrival {
                request_id: RequestId(2),
            },
        );

        let first = queue.pop().expect("queue has events");
        let second = queue.pop().expect("queue has events");
        assert_eq!(
            first.kind,
            EventKind::ClusterArrival {
                request_id: RequestId(1)
            }
        );
        assert_eq!(
            second.kind,
            EventKind::ClusterArrival {
                request_id: RequestId(2)
            }
        );
    }

    #[test]
    fn empty_queue_reports_len_zero() {
        let queue = EventQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }
}
