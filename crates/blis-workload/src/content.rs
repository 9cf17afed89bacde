// blis-workload/src/content.rs
// ============================================================================
// Module: Token Content Generation
// Description: Deterministic, seeded token-value sampling for prefixes and
//              request bodies.
// Purpose: `spec.md` §4.5: prefix tokens shared by group id so same-group
//          requests hash identically; non-prefix tokens (and lengths)
//          drawn from a per-client seeded stream so independent clients
//          hash distinctly and successive requests from one client do
//          not repeat.
// Dependencies: rand, blis_core, std::collections
// ============================================================================

//! ## Overview
//! Two independent kinds of streams feed a request: a per-group stream
//! (keyed by [`blis_core::rng::RngPartition::PrefixGroup`]) supplies the
//! shared leading tokens and is re-derived fresh on every call — by design,
//! since "fresh from the same seed" is what makes every request in a group
//! draw the identical prefix. A per-client stream
//! ([`blis_core::rng::RngPartition::Client`]) is instead created once and
//! kept advancing across calls, since a client's successive requests must
//! draw *different* lengths and body tokens.

use std::collections::HashMap;

use blis_core::rng::RngPartition;
use blis_core::rng::RngStreams;
use rand::Rng;
use rand::rngs::StdRng;

/// A small vocabulary size; content values are opaque token ids, not real
/// text, so any range wide enough to make collisions between distinct
/// prefixes implausible suffices.
const VOCAB_SIZE: u64 = 50_000;

/// Deterministic token-content sampler for one workload run.
#[derive(Debug, Clone)]
pub struct ContentGenerator {
    streams: RngStreams,
    client_streams: HashMap<u64, StdRng>,
}

impl ContentGenerator {
    /// Builds a content generator over the run's RNG streams.
    #[must_use]
    pub fn new(streams: RngStreams) -> Self {
        Self { streams, client_streams: HashMap::new() }
    }

    /// Samples `length` shared prefix tokens for `group_key`, stable
    /// across every client and every request assigned to that group.
    #[must_use]
    pub fn sample_prefix(&self, group_key: u64, length: u32) -> Vec<u64> {
        let mut rng = self.streams.stream(RngPartition::PrefixGroup(group_key));
        sample_tokens(&mut rng, length)
    }

    /// Returns this client's persistent RNG, creating it from the run's
    /// seeded streams on first use.
    pub fn client_rng(&mut self, client_id: u64) -> &mut StdRng {
        let streams = self.streams;
        self.client_streams.entry(client_id).or_insert_with(|| streams.stream(RngPartition::Client(client_id)))
    }

    /// Samples `length` non-prefix tokens for `client_id` from that
    /// client's persistent stream.
    pub fn sample_body(&mut self, client_id: u64, length: u32) -> Vec<u64> {
        let rng = self.client_rng(client_id);
        sample_tokens(rng, length)
    }
}

fn sample_tokens(rng: &mut StdRng, length: u32) -> Vec<u64> {
    (0..length).map(|_| rng.gen_range(0..VOCAB_SIZE)).collect()
}

/// Hashes a string group label to a stable `u64` key for
/// [`blis_core::rng::RngPartition::PrefixGroup`]. Uses the FNV-1a
/// algorithm so the mapping does not depend on libstd's hasher, which is
/// not guaranteed stable across Rust versions.
#[must_use]
pub fn fnv1a(value: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET_BASIS;
    for byte in value.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests assert directly on fixture data"
)]
mod tests {
    use super::*;

    #[test]
    fn same_group_key_yields_identical_prefixes() {
        let generator = ContentGenerator::new(RngStreams::new(42));
        let a = generator.sample_prefix(fnv1a("group-a"), 16);
        let b = generator.sample_prefix(fnv1a("group-a"), 16);
        assert_eq!(a, b);
    }

    #[test]
    fn different_groups_yield_different_prefixes() {
        let generator = ContentGenerator::new(RngStreams::new(42));
        let a = generator.sample_prefix(fnv1a("group-a"), 16);
        let b = generator.sample_prefix(fnv1a("group-b"), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn successive_bodies_from_one_client_differ() {
        let mut generator = ContentGenerator::new(RngStreams::new(7));
        let a = generator.sample_body(1, 16);
        let b = generator.sample_body(1, 16);
        assert_ne!(a, b);
    }

    #[test]
    fn different_clients_yield_different_bodies() {
        let mut generator = ContentGenerator::new(RngStreams::new(7));
        let a = generator.sample_body(1, 16);
        let b = generator.sample_body(2, 16);
        assert_ne!(a, b);
    }

    #[test]
    fn fnv1a_is_stable() {
        assert_eq!(fnv1a("group-a"), fnv1a("group-a"));
    }
}
