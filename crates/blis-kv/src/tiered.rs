// blis-kv/src/tiered.rs
// ============================================================================
// Module: Tiered (GPU+CPU) KV Cache
// Description: Wraps a single-tier GPU cache with a CPU offload tier and a
//              pending-transfer queue.
// Purpose: Implement the tiered contract from `spec.md` §4.3: offload on
//          GPU pressure, reload on a CPU-resident hit, reload latency
//          `base_latency + bytes / bandwidth`.
// Dependencies: blis_core, crate::{error, single_tier}
// ============================================================================

//! ## Overview
//! On release, if GPU utilization exceeds the offload threshold `theta`,
//! the oldest zero-ref GPU block is moved to the CPU table. On allocate, a
//! hash absent from GPU but present on CPU triggers a reload: a GPU slot is
//! reserved immediately and a transfer is enqueued, completing at
//! `now + base_latency + bytes / bandwidth`; the caller receives
//! [`AllocateOutcome::Pending`] and must poll [`TieredCache::advance`] at
//! or after that timestamp to finalize it. A block is never resident in
//! both tiers at once.

use std::collections::HashMap;

use blis_core::BlockHash;
use blis_core::InstanceId;
use blis_core::Microseconds;

use crate::error::KvError;
use crate::single_tier::SingleTierCache;

/// A block in flight from CPU to GPU.
#[derive(Debug, Clone, Copy)]
struct PendingTransfer {
    hash: BlockHash,
    reserved_slot: usize,
    completion_time: Microseconds,
}

/// Outcome of a tiered `allocate` call for one hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocateOutcome {
    /// The block was already resident on GPU or freshly allocated; the
    /// request may proceed immediately with this slot id.
    Ready(usize),
    /// The block was resident on CPU and a reload has been scheduled; the
    /// request stalls until `completion_time`.
    Pending {
        /// When the reload transfer finishes.
        completion_time: Microseconds,
    },
}

/// A two-tier KV cache: a GPU-resident [`SingleTierCache`] plus a CPU
/// offload table.
///
/// # Invariants
/// - `gpu.blocks_in_use() + reserved_for_reload <= gpu.capacity()` at every
///   call boundary.
/// - A hash is never present in both the GPU index and the CPU table at
///   once.
#[derive(Debug, Clone)]
pub struct TieredCache {
    instance_id: InstanceId,
    gpu: SingleTierCache,
    cpu: HashMap<BlockHash, u64>,
    pending: Vec<PendingTransfer>,
    reserved_for_reload: usize,
    offload_threshold: f64,
    bandwidth_bytes_per_us: f64,
    base_latency: Microseconds,
    block_bytes: u64,
}

impl TieredCache {
    /// Builds a tiered cache over a fresh GPU tier of `gpu_capacity` slots.
    #[must_use]
    pub fn new(
        instance_id: InstanceId,
        gpu_capacity: usize,
        offload_threshold: f64,
        bandwidth_bytes_per_us: f64,
        base_latency: Microseconds,
        block_bytes: u64,
    ) -> Self {
        Self {
            instance_id,
            gpu: SingleTierCache::new(instance_id, gpu_capacity),
            cpu: HashMap::new(),
            pending: Vec::new(),
            reserved_for_reload: 0,
            offload_threshold,
            bandwidth_bytes_per_us,
            base_latency,
            block_bytes,
        }
    }

    /// Fraction of GPU capacity currently in use.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "capacity fits well within f64's exact integer range")]
    pub fn gpu_utilization(&self) -> f64 {
        if self.gpu.capacity() == 0 {
            0.0
        } else {
            self.gpu.blocks_in_use() as f64 / self.gpu.capacity() as f64
        }
    }

    /// Number of blocks currently resident on the CPU tier.
    #[must_use]
    pub fn cpu_resident_count(&self) -> usize {
        self.cpu.len()
    }

    /// Number of reloads currently in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Positional match length across both tiers: a hash counts as a hit if
    /// it is resident on GPU or CPU, stopping at the first hash resident on
    /// neither.
    #[must_use]
    pub fn match_length(&self, hashes: &[BlockHash]) -> usize {
        let mut matched = 0;
        for hash in hashes {
            let resident = self.gpu.match_length(std::slice::from_ref(hash)) == 1 || self.cpu.contains_key(hash);
            if !resident {
                break;
            }
            matched += 1;
        }
        matched
    }

    /// Attempts to allocate one block for `hash`. Returns
    /// [`AllocateOutcome::Ready`] immediately for a GPU hit or a fresh
    /// miss, or [`AllocateOutcome::Pending`] if the block must be reloaded
    /// from CPU.
    ///
    /// # Errors
    /// Returns [`KvError::AllocationFailed`] if no GPU slot can be freed
    /// for either a fresh allocation or a reload reservation.
    pub fn allocate_one(&mut self, hash: BlockHash, now: Microseconds) -> Result<AllocateOutcome, KvError> {
        if self.gpu.match_length(&[hash]) == 1 {
            let slots = self.gpu.allocate(&[hash])?;
            return Ok(AllocateOutcome::Ready(slots[0]));
        }
        if let Some(bytes) = self.cpu.remove(&hash) {
            return self.schedule_reload(hash, bytes, now);
        }
        let slots = self.gpu.allocate(&[hash])?;
        Ok(AllocateOutcome::Ready(slots[0]))
    }

    /// Reserves a GPU slot and enqueues a reload transfer for `hash`.
    #[allow(
        clippy::cast_precision_loss,
        reason = "block byte sizes fit well within f64's exact integer range"
    )]
    #[allow(
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation,
        reason = "transfer duration is clamped non-negative before truncation to whole microseconds"
    )]
    fn schedule_reload(&mut self, hash: BlockHash, bytes: u64, now: Microseconds) -> Result<AllocateOutcome, KvError> {
        if self.gpu.blocks_in_use() + self.reserved_for_reload >= self.gpu.capacity() {
            self.cpu.insert(hash, bytes);
            return Err(KvError::AllocationFailed { instance_id: self.instance_id });
        }
        let Some((slot_id, evicted_hash)) = self.gpu.reserve_slot() else {
            self.cpu.insert(hash, bytes);
            return Err(KvError::AllocationFailed { instance_id: self.instance_id });
        };
        if let Some(evicted) = evicted_hash {
            self.cpu.insert(evicted, self.block_bytes);
        }
        self.reserved_for_reload += 1;
        let transfer_us = (bytes as f64 / self.bandwidth_bytes_per_us.max(f64::EPSILON)).max(0.0);
        let completion_time = Microseconds(now.0 + self.base_latency.0 + transfer_us as u64);
        self.pending.push(PendingTransfer { hash, reserved_slot: slot_id, completion_time });
        Ok(AllocateOutcome::Pending { completion_time })
    }

    /// Advances the clock to `now`, finalizing every reload transfer whose
    /// `completion_time <= now`. Returns the hashes that became resident.
    pub fn advance(&mut self, now: Microseconds) -> Vec<BlockHash> {
        let mut completed = Vec::new();
        let mut still_pending = Vec::with_capacity(self.pending.len());
        for transfer in self.pending.drain(..) {
            if transfer.completion_time.0 <= now.0 {
                self.gpu.finalize_reserved(transfer.reserved_slot, transfer.hash);
                self.reserved_for_reload -= 1;
                completed.push(transfer.hash);
            } else {
                still_pending.push(transfer);
            }
        }
        self.pending = still_pending;
        completed
    }

    /// Releases GPU slots, then offloads zero-ref blocks to CPU while
    /// utilization remains above `offload_threshold`.
    pub fn release(&mut self, slot_ids: &[usize]) {
        self.gpu.release(slot_ids);
        while self.gpu_utilization() > self.offload_threshold {
            let Some((_slot_id, Some(hash))) = self.gpu.reserve_slot() else { break };
            self.cpu.insert(hash, self.block_bytes);
        }
    }

    /// Checks GPU-side conservation plus the reload-budget invariant.
    ///
    /// # Errors
    /// Returns [`KvError::Imbalance`] if either equality fails.
    pub fn check_conservation(&self) -> Result<(), KvError> {
        self.gpu.check_conservation()?;
        if self.gpu.blocks_in_use() + self.reserved_for_reload > self.gpu.capacity() {
            return Err(KvError::Imbalance {
                instance_id: self.instance_id,
                detail: format!(
                    "gpu_used={} reserved_for_reload={} exceeds capacity={}",
                    self.gpu.blocks_in_use(),
                    self.reserved_for_reload,
                    self.gpu.capacity()
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests assert directly on fixture data"
)]
mod tests {
    use super::*;

    fn hash(value: u128) -> BlockHash {
        BlockHash(value)
    }

    #[test]
    fn fresh_miss_allocates_immediately() {
        let mut cache = TieredCache::new(InstanceId(0), 2, 0.9, 10.0, 5, 1024);
        let outcome = cache.allocate_one(hash(1), Microseconds(0)).expect("capacity available");
        assert!(matches!(outcome, AllocateOutcome::Ready(_)));
    }

    #[test]
    fn release_above_threshold_offloads_to_cpu() {
        let mut cache = TieredCache::new(InstanceId(0), 1, 0.0, 10.0, 5, 1024);
        let outcome = cache.allocate_one(hash(1), Microseconds(0)).expect("capacity available");
        let AllocateOutcome::Ready(slot_id) = outcome else { panic!("expected ready outcome") };
        cache.release(&[slot_id]);
        assert_eq!(cache.cpu_resident_count(), 1);
        assert_eq!(cache.gpu.blocks_evictable() + cache.gpu.blocks_free(), 1);
    }

    #[test]
    fn cpu_resident_hash_schedules_a_pending_reload() {
        let mut cache = TieredCache::new(InstanceId(0), 1, 0.0, 10.0, 5, 1024);
        let outcome = cache.allocate_one(hash(1), Microseconds(0)).expect("capacity available");
        let AllocateOutcome::Ready(slot_id) = outcome else { panic!("expected ready outcome") };
        cache.release(&[slot_id]);
        assert_eq!(cache.cpu_resident_count(), 1);

        let reload = cache.allocate_one(hash(1), Microseconds(100)).expect("reload scheduled");
        let AllocateOutcome::Pending { completion_time } = reload else { panic!("expected pending outcome") };
        assert_eq!(completion_time, Microseconds(100 + 5 + (1024.0 / 10.0) as u64));
        assert_eq!(cache.pending_count(), 1);

        let completed = cache.advance(completion_time);
        assert_eq!(completed, vec![hash(1)]);
        assert_eq!(cache.pending_count(), 0);
        cache.check_conservation().expect("reload finalize must preserve conservation");
    }

    #[test]
    fn match_length_counts_cpu_resident_hashes_as_hits() {
        let mut cache = TieredCache::new(InstanceId(0), 1, 0.0, 10.0, 5, 1024);
        let outcome = cache.allocate_one(hash(1), Microseconds(0)).expect("capacity available");
        let AllocateOutcome::Ready(slot_id) = outcome else { panic!("expected ready outcome") };
        cache.release(&[slot_id]);
        assert_eq!(cache.match_length(&[hash(1), hash(2)]), 1);
    }
}
