// blis-policy/src/scorer.rs
// ============================================================================
// Module: Scorer Catalogue & Prefix Cache Index
// Description: Per-instance [0,1] scorers consumed by the weighted-composite
//              router, plus the shared prefix-hit arena they read and write.
// Purpose: `spec.md` §4.4 scorer catalogue and §9's "cyclic relationship"
//          design note: the routing observer writes the prefix cache index
//          that the next routing decision's scorer reads.
// Dependencies: blis_core
// ============================================================================

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::rc::Rc;

use blis_core::BlockHash;
use blis_core::InstanceId;
use blis_core::PrefixHasher;
use blis_core::Request;
use blis_core::RouterSnapshot;

// ============================================================================
// SECTION: Prefix Cache Index
// ============================================================================

/// Arena of which instances have previously been routed a request whose
/// prefix covered a given block hash. Indexed by hash rather than by
/// instance so observers and scorers both go through one shared structure
/// (`spec.md` §9's "cyclic relationship" resolution) instead of holding
/// direct references to each other.
#[derive(Debug, Clone, Default)]
pub struct PrefixCacheIndex {
    entries: HashMap<BlockHash, BTreeSet<InstanceId>>,
}

impl PrefixCacheIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `instance` has now seen every block in `hashes`.
    pub fn record(&mut self, hashes: &[BlockHash], instance: InstanceId) {
        for hash in hashes {
            self.entries.entry(*hash).or_default().insert(instance);
        }
    }

    /// Returns the number of leading blocks of `hashes` that `instance` has
    /// previously seen. Stops at the first miss (positional match), since a
    /// later hash can only coincidentally collide once an earlier block in
    /// the chain has diverged.
    #[must_use]
    pub fn match_length(&self, hashes: &[BlockHash], instance: InstanceId) -> usize {
        let mut matched = 0;
        for hash in hashes {
            match self.entries.get(hash) {
                Some(seen) if seen.contains(&instance) => matched += 1,
                _ => break,
            }
        }
        matched
    }
}

/// Shared handle to a [`PrefixCacheIndex`], cheaply cloned. The simulator
/// is single-threaded cooperative discrete-event (`spec.md` §5), so
/// interior mutability via `Rc<RefCell<_>>` needs no synchronization.
pub type SharedPrefixIndex = Rc<RefCell<PrefixCacheIndex>>;

// ============================================================================
// SECTION: Scorer Trait
// ============================================================================

/// Produces a per-instance score in `[0, 1]`, consumed by
/// [`crate::composite::WeightedCompositeRouter`].
pub trait Scorer {
    /// Stable name used in composite-router configuration and trace output.
    fn name(&self) -> &str;

    /// Scores `instance` for `request` given the current snapshot set.
    fn score(&self, request: &Request, instance: InstanceId, snapshots: &[RouterSnapshot]) -> f64;

    /// Called once, after the composite router has chosen an instance via
    /// argmax. Most scorers have nothing to record; the prefix-affinity
    /// scorer overrides this to write into its cache index.
    fn observe(&mut self, _request: &Request, _chosen: InstanceId) {}
}

fn min_max_normalized_inverted(value: u32, values: impl Iterator<Item = u32>) -> f64 {
    let (mut min, mut max) = (value, value);
    for candidate in values {
        min = min.min(candidate);
        max = max.max(candidate);
    }
    if max == min {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss, reason = "effective-load and kv-block counts stay well within f64's exact integer range")]
    let (value_f, min_f, max_f) = (f64::from(value), f64::from(min), f64::from(max));
    1.0 - (value_f - min_f) / (max_f - min_f)
}

fn min_max_normalized_inverted_f64(value: f64, values: impl Iterator<Item = f64>) -> f64 {
    let (mut min, mut max) = (value, value);
    for candidate in values {
        min = min.min(candidate);
        max = max.max(candidate);
    }
    if (max - min).abs() < f64::EPSILON {
        return 1.0;
    }
    1.0 - (value - min) / (max - min)
}

fn snapshot_for(instance: InstanceId, snapshots: &[RouterSnapshot]) -> Option<&RouterSnapshot> {
    snapshots.iter().find(|snapshot| snapshot.instance_id == instance)
}

// ============================================================================
// SECTION: Prefix Affinity
// ============================================================================

/// `matchLength(hashes, instance) / totalBlocks`. Written only by its own
/// observer callback, so the index it reads always reflects decisions made
/// strictly before the current one (Tier 1 freshness).
#[derive(Debug, Clone)]
pub struct PrefixAffinityScorer {
    hasher: PrefixHasher,
    index: SharedPrefixIndex,
}

impl PrefixAffinityScorer {
    /// Builds a prefix-affinity scorer over a shared cache index, hashing
    /// input token sequences in `block_size`-token chunks.
    #[must_use]
    pub fn new(block_size: usize, index: SharedPrefixIndex) -> Self {
        Self { hasher: PrefixHasher::new(block_size), index }
    }
}

impl Scorer for PrefixAffinityScorer {
    fn name(&self) -> &str {
        "prefix-affinity"
    }

    fn score(&self, request: &Request, instance: InstanceId, _snapshots: &[RouterSnapshot]) -> f64 {
        let hashes = self.hasher.hash_blocks(&request.input_tokens);
        if hashes.is_empty() {
            return 0.0;
        }
        let matched = self.index.borrow().match_length(&hashes, instance);
        #[allow(clippy::cast_precision_loss, reason = "block counts stay well within f64's exact integer range")]
        let ratio = matched as f64 / hashes.len() as f64;
        ratio
    }

    fn observe(&mut self, request: &Request, chosen: InstanceId) {
        let hashes = self.hasher.hash_blocks(&request.input_tokens);
        self.index.borrow_mut().record(&hashes, chosen);
    }
}

// ============================================================================
// SECTION: Load-Based Scorers
// ============================================================================

/// Min-max-normalized `effective_load`, inverted so the least-loaded
/// instance scores 1.0. All inputs are synchronous snapshot fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueDepthScorer;

impl Scorer for QueueDepthScorer {
    fn name(&self) -> &str {
        "queue-depth"
    }

    fn score(&self, _request: &Request, instance: InstanceId, snapshots: &[RouterSnapshot]) -> f64 {
        let Some(target) = snapshot_for(instance, snapshots) else {
            return 0.0;
        };
        min_max_normalized_inverted(target.effective_load(), snapshots.iter().map(RouterSnapshot::effective_load))
    }
}

/// Min-max-normalized KV utilization, inverted. Reads only the **stale**
/// snapshot field; never refreshed synchronously (`spec.md` §9).
#[derive(Debug, Clone, Copy, Default)]
pub struct KvUtilizationScorer;

impl Scorer for KvUtilizationScorer {
    fn name(&self) -> &str {
        "kv-utilization"
    }

    fn score(&self, _request: &Request, instance: InstanceId, snapshots: &[RouterSnapshot]) -> f64 {
        let Some(target) = snapshot_for(instance, snapshots) else {
            return 0.0;
        };
        min_max_normalized_inverted_f64(target.kv_utilization, snapshots.iter().map(|snapshot| snapshot.kv_utilization))
    }
}

/// Min-max-normalized running-batch size, inverted. Distinct from
/// `queue-depth`, which folds in wait-queue and pending-request counts;
/// this scorer balances only the currently-running batch across instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadBalanceScorer;

impl Scorer for LoadBalanceScorer {
    fn name(&self) -> &str {
        "load-balance"
    }

    fn score(&self, _request: &Request, instance: InstanceId, snapshots: &[RouterSnapshot]) -> f64 {
        let Some(target) = snapshot_for(instance, snapshots) else {
            return 0.0;
        };
        min_max_normalized_inverted(target.batch_size, snapshots.iter().map(|snapshot| snapshot.batch_size))
    }
}

// ============================================================================
// SECTION: Cost-Benefit
// ============================================================================

/// Estimates the queueing delay a request would incur on a given instance.
/// A capability boundary rather than a direct `blis-latency` dependency, so
/// this crate stays decoupled from any particular backend implementation
/// (`spec.md` §9 open question: "require the backend to expose an
/// estimateQueueDelay capability").
pub trait QueueDelayEstimator {
    /// Returns the estimated queueing delay, in microseconds, for the given
    /// snapshot.
    fn estimate_queue_delay_us(&self, snapshot: &RouterSnapshot) -> f64;
}

/// `cacheSaving / (cacheSaving + estimatedQueueDelay)`. Cache saving is
/// estimated from the same prefix-match ratio as [`PrefixAffinityScorer`],
/// scaled by a configured per-block latency saving.
pub struct CostBenefitScorer {
    hasher: PrefixHasher,
    index: SharedPrefixIndex,
    block_latency_saving_us: f64,
    estimator: Rc<dyn QueueDelayEstimator>,
}

impl CostBenefitScorer {
    /// Builds a cost-benefit scorer. `block_latency_saving_us` is the
    /// estimated prefill time saved per matched block; `estimator` supplies
    /// the backend-dependent queue-delay estimate, shared so multiple
    /// scorer instances can reuse one estimator.
    #[must_use]
    pub fn new(block_size: usize, index: SharedPrefixIndex, block_latency_saving_us: f64, estimator: Rc<dyn QueueDelayEstimator>) -> Self {
        Self { hasher: PrefixHasher::new(block_size), index, block_latency_saving_us, estimator }
    }
}

impl Scorer for CostBenefitScorer {
    fn name(&self) -> &str {
        "cost-benefit"
    }

    fn score(&self, request: &Request, instance: InstanceId, snapshots: &[RouterSnapshot]) -> f64 {
        let Some(target) = snapshot_for(instance, snapshots) else {
            return 0.0;
        };
        let hashes = self.hasher.hash_blocks(&request.input_tokens);
        let matched = self.index.borrow().match_length(&hashes, instance);
        #[allow(clippy::cast_precision_loss, reason = "block counts stay well within f64's exact integer range")]
        let cache_saving = matched as f64 * self.block_latency_saving_us;
        let queue_delay = self.estimator.estimate_queue_delay_us(target);
        if cache_saving + queue_delay <= 0.0 {
            return 0.0;
        }
        cache_saving / (cache_saving + queue_delay)
    }

    fn observe(&mut self, request: &Request, chosen: InstanceId) {
        let hashes = self.hasher.hash_blocks(&request.input_tokens);
        self.index.borrow_mut().record(&hashes, chosen);
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

    fn fixture_request(tokens: Vec<u64>) -> Request {
        Request {
            id: RequestId(0),
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

    fn snapshot(id: u32, queue_depth: u32, batch_size: u32, kv_utilization: f64) -> RouterSnapshot {
        RouterSnapshot { instance_id: InstanceId(id), queue_depth, batch_size, pending_requests: 0, kv_utilization, stale_as_of: 0 }
    }

    #[test]
    fn prefix_affinity_is_zero_before_any_observation() {
        let index = Rc::new(RefCell::new(PrefixCacheIndex::new()));
        let scorer = PrefixAffinityScorer::new(4, index);
        let request = fixture_request(vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let snapshots = vec![snapshot(0, 0, 0, 0.0)];
        assert_eq!(scorer.score(&request, InstanceId(0), &snapshots), 0.0);
    }

    #[test]
    fn prefix_affinity_rewards_the_instance_it_observed() {
        let index = Rc::new(RefCell::new(PrefixCacheIndex::new()));
        let mut scorer = PrefixAffinityScorer::new(4, index);
        let request = fixture_request(vec![1, 2, 3, 4, 5, 6, 7, 8]);
        scorer.observe(&request, InstanceId(0));
        let snapshots = vec![snapshot(0, 0, 0, 0.0), snapshot(1, 0, 0, 0.0)];
        assert_eq!(scorer.score(&request, InstanceId(0), &snapshots), 1.0);
        assert_eq!(scorer.score(&request, InstanceId(1), &snapshots), 0.0);
    }

    #[test]
    fn queue_depth_scorer_inverts_and_rewards_least_loaded() {
        let scorer = QueueDepthScorer;
        let request = fixture_request(vec![1]);
        let snapshots = vec![snapshot(0, 10, 0, 0.0), snapshot(1, 0, 0, 0.0)];
        assert_eq!(scorer.score(&request, InstanceId(1), &snapshots), 1.0);
        assert_eq!(scorer.score(&request, InstanceId(0), &snapshots), 0.0);
    }

    #[test]
    fn queue_depth_scorer_ties_score_one_when_uniform() {
        let scorer = QueueDepthScorer;
        let request = fixture_request(vec![1]);
        let snapshots = vec![snapshot(0, 5, 0, 0.0), snapshot(1, 5, 0, 0.0)];
        assert_eq!(scorer.score(&request, InstanceId(0), &snapshots), 1.0);
    }

    #[test]
    fn kv_utilization_scorer_reads_stale_field() {
        let scorer = KvUtilizationScorer;
        let request = fixture_request(vec![1]);
        let snapshots = vec![snapshot(0, 0, 0, 0.9), snapshot(1, 0, 0, 0.1)];
        assert_eq!(scorer.score(&request, InstanceId(1), &snapshots), 1.0);
        assert_eq!(scorer.score(&request, InstanceId(0), &snapshots), 0.0);
    }

    struct FixedEstimator(f64);

    impl QueueDelayEstimator for FixedEstimator {
        fn estimate_queue_delay_us(&self, _snapshot: &RouterSnapshot) -> f64 {
            self.0
        }
    }

    #[test]
    fn cost_benefit_favors_matched_prefix_over_empty_delay() {
        let index = Rc::new(RefCell::new(PrefixCacheIndex::new()));
        let estimator: Rc<dyn QueueDelayEstimator> = Rc::new(FixedEstimator(50.0));
        let mut scorer = CostBenefitScorer::new(4, Rc::clone(&index), 100.0, estimator);
        let request = fixture_request(vec![1, 2, 3, 4]);
        scorer.observe(&request, InstanceId(0));
        let snapshots = vec![snapshot(0, 0, 0, 0.0)];
        let score = scorer.score(&request, InstanceId(0), &snapshots);
        assert!((score - (100.0 / 150.0)).abs() < 1e-9);
    }
}
