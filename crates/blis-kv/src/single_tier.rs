// blis-kv/src/single_tier.rs
// ============================================================================
// Module: Single-Tier KV Cache
// Description: A fixed-capacity block store keyed by content hash with an
//              LRU free list.
// Purpose: Implement the single-tier contract from `spec.md` §4.3:
//          allocate/release/matchLength/cachedBlocks plus ref-counted
//          eviction.
// Dependencies: blis_core, crate::error, std::collections
// ============================================================================

//! ## Overview
//! Blocks live in a fixed-size slot array. A hash-to-slot index gives O(1)
//! hit lookup; a free list gives O(1) miss allocation while capacity
//! remains; once exhausted, the least-recently-released zero-ref block is
//! evicted. `allocate` is all-or-nothing: if a later hash in the batch
//! cannot be satisfied, every increment already made during that call is
//! rolled back before returning [`KvError::AllocationFailed`], so a failed
//! allocation never leaves partial state for the caller to clean up.

use std::collections::HashMap;
use std::collections::VecDeque;

use blis_core::BlockHash;
use blis_core::InstanceId;

use crate::error::KvError;

/// One physical block slot.
#[derive(Debug, Clone)]
struct Slot {
    /// Content hash currently occupying this slot, if any.
    hash: Option<BlockHash>,
    /// Live reference count. Zero means the slot is an eviction/reuse
    /// candidate but still retains its hash until evicted.
    ref_count: u32,
}

/// A single-tier, fixed-capacity, content-addressed KV block cache.
///
/// # Invariants
/// - `blocks_in_use() + blocks_free() == capacity` at every call boundary
///   (INV-1).
/// - A hash never maps to more than one slot at a time.
#[derive(Debug, Clone)]
pub struct SingleTierCache {
    instance_id: InstanceId,
    slots: Vec<Slot>,
    hash_to_slot: HashMap<BlockHash, usize>,
    free_list: Vec<usize>,
    /// Zero-ref, hash-tagged slots in release order; front is the next
    /// eviction candidate.
    lru: VecDeque<usize>,
}

impl SingleTierCache {
    /// Builds an empty cache with `capacity` untagged free slots.
    #[must_use]
    pub fn new(instance_id: InstanceId, capacity: usize) -> Self {
        let slots = vec![Slot { hash: None, ref_count: 0 }; capacity];
        let free_list = (0..capacity).collect();
        Self { instance_id, slots, hash_to_slot: HashMap::new(), free_list, lru: VecDeque::new() }
    }

    /// Total slot capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently holding a live (ref_count > 0) block.
    #[must_use]
    pub fn blocks_in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.ref_count > 0).count()
    }

    /// Number of slots with no hash assigned at all (true free list, not
    /// counting zero-ref evictable slots).
    #[must_use]
    pub fn blocks_free(&self) -> usize {
        self.free_list.len()
    }

    /// Number of hash-tagged, zero-ref slots awaiting eviction or reuse.
    #[must_use]
    pub fn blocks_evictable(&self) -> usize {
        self.lru.len()
    }

    /// Length of the positional prefix of `hashes` already resident,
    /// stopping at the first miss. Used both as the public `matchLength`
    /// and `cachedBlocks` contract — the two spec names for the same
    /// computation.
    #[must_use]
    pub fn match_length(&self, hashes: &[BlockHash]) -> usize {
        hashes.iter().take_while(|hash| self.hash_to_slot.contains_key(hash)).count()
    }

    /// Alias for [`Self::match_length`], named for the prefix-affinity
    /// scorer's call site.
    #[must_use]
    pub fn cached_blocks(&self, hashes: &[BlockHash]) -> usize {
        self.match_length(hashes)
    }

    /// Acquires one slot per hash in `hashes`, incrementing ref counts on
    /// hits and pulling fresh blocks (free list, then LRU eviction) for
    /// misses. Returns the acquired slot ids in the same order as
    /// `hashes`, or rolls back and returns [`KvError::AllocationFailed`]
    /// if any hash cannot be satisfied.
    ///
    /// # Errors
    /// Returns [`KvError::AllocationFailed`] if the free list and LRU
    /// evictable set are both exhausted before every hash is satisfied.
    pub fn allocate(&mut self, hashes: &[BlockHash]) -> Result<Vec<usize>, KvError> {
        let mut acquired = Vec::with_capacity(hashes.len());
        for hash in hashes {
            match self.acquire_one(*hash) {
                Some(slot_id) => acquired.push(slot_id),
                None => {
                    self.release(&acquired);
                    return Err(KvError::AllocationFailed { instance_id: self.instance_id });
                }
            }
        }
        Ok(acquired)
    }

    /// Acquires a single hash, trying a hit, then the free list, then LRU
    /// eviction, in that order.
    fn acquire_one(&mut self, hash: BlockHash) -> Option<usize> {
        if let Some(&slot_id) = self.hash_to_slot.get(&hash) {
            self.slots[slot_id].ref_count += 1;
            self.lru.retain(|&candidate| candidate != slot_id);
            return Some(slot_id);
        }
        if let Some(slot_id) = self.free_list.pop() {
            self.slots[slot_id] = Slot { hash: Some(hash), ref_count: 1 };
            self.hash_to_slot.insert(hash, slot_id);
            return Some(slot_id);
        }
        if let Some(slot_id) = self.lru.pop_front() {
            if let Some(old_hash) = self.slots[slot_id].hash {
                self.hash_to_slot.remove(&old_hash);
            }
            self.slots[slot_id] = Slot { hash: Some(hash), ref_count: 1 };
            self.hash_to_slot.insert(hash, slot_id);
            return Some(slot_id);
        }
        None
    }

    /// Releases previously acquired slots, decrementing their ref counts.
    /// Slots that reach zero become LRU eviction candidates; they retain
    /// their hash (and therefore stay a cache hit for a future allocate)
    /// until actually evicted.
    pub fn release(&mut self, slot_ids: &[usize]) {
        for &slot_id in slot_ids {
            let Some(slot) = self.slots.get_mut(slot_id) else { continue };
            if slot.ref_count == 0 {
                continue;
            }
            slot.ref_count -= 1;
            if slot.ref_count == 0 {
                self.lru.push_back(slot_id);
            }
        }
    }

    /// Reserves one physical slot without assigning it a hash yet, for the
    /// tiered cache's in-flight reload bookkeeping. Tries the free list
    /// first, then evicts the oldest zero-ref hash-tagged slot, returning
    /// its previous hash (the caller is responsible for offloading that
    /// hash to the CPU tier before it is lost). Returns `None` if neither
    /// source has a slot to give.
    pub fn reserve_slot(&mut self) -> Option<(usize, Option<BlockHash>)> {
        if let Some(slot_id) = self.free_list.pop() {
            return Some((slot_id, None));
        }
        let slot_id = self.lru.pop_front()?;
        let evicted_hash = self.slots[slot_id].hash.take();
        if let Some(hash) = evicted_hash {
            self.hash_to_slot.remove(&hash);
        }
        Some((slot_id, evicted_hash))
    }

    /// Finalizes a slot reserved by [`Self::reserve_slot`] once its
    /// in-flight reload transfer completes, assigning it `hash` with
    /// `ref_count = 1`.
    pub fn finalize_reserved(&mut self, slot_id: usize, hash: BlockHash) {
        self.slots[slot_id] = Slot { hash: Some(hash), ref_count: 1 };
        self.hash_to_slot.insert(hash, slot_id);
    }

    /// Returns a reserved slot to the free list without assigning it a
    /// hash, for the tiered cache to use if a reload is abandoned.
    pub fn release_reserved(&mut self, slot_id: usize) {
        self.free_list.push(slot_id);
    }

    /// Checks that `blocks_in_use + blocks_free + blocks_evictable ==
    /// capacity`, the INV-1 conservation equality restricted to this
    /// cache.
    ///
    /// # Errors
    /// Returns [`KvError::Imbalance`] if the equality does not hold.
    pub fn check_conservation(&self) -> Result<(), KvError> {
        let total = self.blocks_in_use() + self.blocks_free() + self.blocks_evictable();
        if total == self.capacity() {
            Ok(())
        } else {
            Err(KvError::Imbalance {
                instance_id: self.instance_id,
                detail: format!(
                    "in_use={} free={} evictable={} capacity={}",
                    self.blocks_in_use(),
                    self.blocks_free(),
                    self.blocks_evictable(),
                    self.capacity()
                ),
            })
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests assert directly on fixture data"
)]
mod tests {
    use blis_core::BlockHash;

    use super::*;

    fn hash(value: u128) -> BlockHash {
        BlockHash(value)
    }

    #[test]
    fn allocate_hits_increment_ref_count_without_consuming_free_list() {
        let mut cache = SingleTierCache::new(InstanceId(0), 4);
        let first = cache.allocate(&[hash(1), hash(2)]).expect("capacity available");
        assert_eq!(cache.blocks_free(), 2);
        let second = cache.allocate(&[hash(1)]).expect("hash(1) is a hit");
        assert_eq!(first[0], second[0]);
        assert_eq!(cache.blocks_free(), 2);
    }

    #[test]
    fn release_to_zero_makes_a_block_evictable_but_still_a_hit() {
        let mut cache = SingleTierCache::new(InstanceId(0), 2);
        let acquired = cache.allocate(&[hash(1)]).expect("capacity available");
        cache.release(&acquired);
        assert_eq!(cache.blocks_evictable(), 1);
        assert_eq!(cache.match_length(&[hash(1)]), 1);
    }

    #[test]
    fn allocation_failure_rolls_back_partial_increments() {
        let mut cache = SingleTierCache::new(InstanceId(0), 1);
        let _held = cache.allocate(&[hash(1)]).expect("capacity available");
        let result = cache.allocate(&[hash(2)]);
        assert!(matches!(result, Err(KvError::AllocationFailed { .. })));
        cache.check_conservation().expect("rollback must preserve conservation");
    }

    #[test]
    fn match_length_stops_at_first_miss() {
        let mut cache = SingleTierCache::new(InstanceId(0), 4);
        let _acquired = cache.allocate(&[hash(1), hash(2)]).expect("capacity available");
        assert_eq!(cache.match_length(&[hash(1), hash(2), hash(3)]), 2);
        assert_eq!(cache.match_length(&[hash(9), hash(1)]), 0);
    }

    #[test]
    fn lru_eviction_reclaims_the_oldest_released_block() {
        let mut cache = SingleTierCache::new(InstanceId(0), 1);
        let first = cache.allocate(&[hash(1)]).expect("capacity available");
        cache.release(&first);
        let second = cache.allocate(&[hash(2)]).expect("evicts hash(1)");
        assert_eq!(cache.match_length(&[hash(1)]), 0);
        assert_eq!(cache.match_length(&[hash(2)]), 1);
        assert_eq!(second.len(), 1);
    }
}
