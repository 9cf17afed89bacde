// blis-cluster/src/cache.rs
// ============================================================================
// Module: KV Cache Handle
// Description: Unifies `SingleTierCache` and `TieredCache` behind one
//              per-instance capability trait.
// Purpose: `blis_core::instance::InstanceState` deliberately excludes a
//          cache handle; this crate pairs each instance with one of these.
// Dependencies: blis_core, blis_kv
// ============================================================================

//! ## Overview
//! Batch formation (`spec.md` §4.2) never needs to know whether an
//! instance's cache is single-tier or tiered — it only needs "match
//! length", "allocate one block", "release", and "conservation check".
//! [`CacheHandle`] is that narrow capability, implemented for both
//! concrete cache types so the per-instance simulator can hold a
//! `Box<dyn CacheHandle>` regardless of configuration.

use blis_core::BlockHash;
use blis_core::Microseconds;
use blis_kv::AllocateOutcome;
use blis_kv::KvError;
use blis_kv::SingleTierCache;
use blis_kv::TieredCache;

/// Outcome of a one-block allocation against a [`CacheHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The block is resident and usable immediately.
    Ready(usize),
    /// The block is being reloaded from a slower tier; usable once the
    /// clock reaches `completion_time`.
    Pending {
        /// When the reload transfer finishes.
        completion_time: Microseconds,
    },
}

/// Per-instance KV cache capability. Implemented for both
/// [`SingleTierCache`] and [`TieredCache`] so batch formation stays
/// tier-agnostic.
pub trait CacheHandle {
    /// Positional match length: count of leading `hashes` already
    /// resident somewhere in this cache.
    fn match_length(&self, hashes: &[BlockHash]) -> usize;
    /// Allocates one block for `hash`.
    ///
    /// # Errors
    /// Returns [`KvError::AllocationFailed`] if no block can be freed.
    fn allocate_one(&mut self, hash: BlockHash, now: Microseconds) -> Result<CacheOutcome, KvError>;
    /// Releases the given slot ids back to the cache.
    fn release(&mut self, slots: &[usize]);
    /// Advances pending reload transfers to `now`, returning hashes that
    /// became resident. Always empty for a single-tier cache.
    fn advance(&mut self, now: Microseconds) -> Vec<BlockHash>;
    /// Checks this cache's conservation invariant.
    ///
    /// # Errors
    /// Returns [`KvError::Imbalance`] if the invariant does not hold.
    fn check_conservation(&self) -> Result<(), KvError>;
    /// Fraction of capacity in use, for the stale `kv_utilization`
    /// snapshot field.
    fn utilization(&self) -> f64;
}

impl CacheHandle for SingleTierCache {
    fn match_length(&self, hashes: &[BlockHash]) -> usize {
        Self::match_length(self, hashes)
    }

    fn allocate_one(&mut self, hash: BlockHash, _now: Microseconds) -> Result<CacheOutcome, KvError> {
        let slots = self.allocate(&[hash])?;
        Ok(CacheOutcome::Ready(slots[0]))
    }

    fn release(&mut self, slots: &[usize]) {
        Self::release(self, slots);
    }

    fn advance(&mut self, _now: Microseconds) -> Vec<BlockHash> {
        Vec::new()
    }

    fn check_conservation(&self) -> Result<(), KvError> {
        Self::check_conservation(self)
    }

    #[allow(clippy::cast_precision_loss, reason = "capacity fits well within f64's exact integer range")]
    fn utilization(&self) -> f64 {
        if self.capacity() == 0 {
            0.0
        } else {
            self.blocks_in_use() as f64 / self.capacity() as f64
        }
    }
}

impl CacheHandle for TieredCache {
    fn match_length(&self, hashes: &[BlockHash]) -> usize {
        Self::match_length(self, hashes)
    }

    fn allocate_one(&mut self, hash: BlockHash, now: Microseconds) -> Result<CacheOutcome, KvError> {
        match Self::allocate_one(self, hash, now)? {
            AllocateOutcome::Ready(slot) => Ok(CacheOutcome::Ready(slot)),
            AllocateOutcome::Pending { completion_time } => Ok(CacheOutcome::Pending { completion_time }),
        }
    }

    fn release(&mut self, slots: &[usize]) {
        Self::release(self, slots);
    }

    fn advance(&mut self, now: Microseconds) -> Vec<BlockHash> {
        Self::advance(self, now)
    }

    fn check_conservation(&self) -> Result<(), KvError> {
        Self::check_conservation(self)
    }

    fn utilization(&self) -> f64 {
        self.gpu_utilization()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests assert directly on fixture data")]
mod tests {
    use blis_core::InstanceId;

    use super::*;

    fn hash(value: u128) -> BlockHash {
        BlockHash(value)
    }

    #[test]
    fn single_tier_allocate_one_is_always_ready() {
        let mut cache = SingleTierCache::new(InstanceId(0), 2);
        let outcome = CacheHandle::allocate_one(&mut cache, hash(1), Microseconds::ZERO).expect("capacity available");
        assert!(matches!(outcome, CacheOutcome::Ready(_)));
        assert!(CacheHandle::advance(&mut cache, Microseconds::ZERO).is_empty());
    }

    #[test]
    fn tiered_allocate_one_can_be_pending() {
        let mut cache = TieredCache::new(InstanceId(0), 1, 0.0, 10.0, Microseconds::new(5), 1024);
        let ready = CacheHandle::allocate_one(&mut cache, hash(1), Microseconds::ZERO).expect("capacity available");
        let CacheOutcome::Ready(slot) = ready else { panic!("expected ready outcome") };
        CacheHandle::release(&mut cache, &[slot]);
        let reload = CacheHandle::allocate_one(&mut cache, hash(1), Microseconds::new(100)).expect("reload scheduled");
        assert!(matches!(reload, CacheOutcome::Pending { .. }));
    }
}
