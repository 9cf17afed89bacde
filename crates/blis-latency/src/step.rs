// blis-latency/src/step.rs
// ============================================================================
// Module: Step Configuration
// Description: The single input value type backends consume to price one
//              batch step.
// Purpose: Decouple backends from `blis-core`'s `Request`/`InstanceState` so
//          this crate stays standalone.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A step is one forward pass over a batch. `StepConfig` carries the shape
//! of that batch (how many tokens are being prefilled vs. decoded, how many
//! of the prefilled tokens miss the KV cache) without naming a single
//! `blis-core` type, so callers translate their own batch representation
//! into this struct at the call site.

use serde::Deserialize;
use serde::Serialize;

/// One prefill participant in a batch step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefillRequest {
    /// Total prompt tokens for this request's prefill.
    pub prompt_tokens: u32,
    /// Of `prompt_tokens`, how many were not already resident in the KV
    /// cache (a prefix cache miss).
    pub cache_miss_tokens: u32,
}

/// One decode participant in a batch step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeRequest {
    /// Length of this request's KV cache at the start of the step.
    pub kv_length: u32,
}

/// The full description of a single batch step, the only input a
/// [`crate::LatencyBackend`] sees.
///
/// # Invariants
/// - `total_batch_tokens` equals the sum of `prompt_tokens` across
///   `prefill_requests` plus `decode_requests.len()` (one new token per
///   decode participant).
/// - `cache_miss_tokens` equals the sum of `cache_miss_tokens` across
///   `prefill_requests`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Requests in the prefill phase during this step.
    pub prefill_requests: Vec<PrefillRequest>,
    /// Requests in the decode phase during this step.
    pub decode_requests: Vec<DecodeRequest>,
    /// Total tokens processed by the batch in this step (prefill + one
    /// decode token per decode participant).
    pub total_batch_tokens: u32,
    /// Total prefill tokens that missed the KV cache across the batch.
    pub cache_miss_tokens: u32,
    /// KV cache length of every decode participant, redundant with
    /// `decode_requests` but kept separate so roofline memory-bandwidth
    /// estimates can read it without re-deriving it.
    pub kv_lengths: Vec<u32>,
}

impl StepConfig {
    /// Number of requests in the decode phase.
    #[must_use]
    pub fn decode_count(&self) -> u32 {
        u32::try_from(self.decode_requests.len()).unwrap_or(u32::MAX)
    }

    /// Number of requests in the prefill phase.
    #[must_use]
    pub fn prefill_count(&self) -> u32 {
        u32::try_from(self.prefill_requests.len()).unwrap_or(u32::MAX)
    }
}
