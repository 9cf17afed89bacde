// blis-core/src/hashing.rs
// ============================================================================
// Module: Prefix Block Hasher
// Description: Chunks a token sequence into fixed-size blocks and hashes
//              each block's content.
// Purpose: Give the KV cache and prefix-cache index a stable, positional
//          content hash per block for cache-hit matching.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! A token sequence is split into fixed-size (`block_size` tokens) chunks
//! from the start. Each chunk hashes to a [`BlockHash`] that also folds in
//! the hash of the preceding block, so two sequences that share a leading
//! run of blocks produce identical hashes for that run and diverge exactly
//! at the first differing block — matching the positional, first-miss-stops
//! semantics required by `spec.md` §4.3.

use sha2::Digest;
use sha2::Sha256;

/// Content hash of one KV block (first 16 bytes of a SHA-256 digest,
/// folded with the previous block's hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHash(pub u128);

/// Splits token sequences into fixed-size blocks and hashes them.
#[derive(Debug, Clone, Copy)]
pub struct PrefixHasher {
    block_size: usize,
}

impl PrefixHasher {
    /// Creates a hasher for the given block size, in tokens.
    ///
    /// # Panics
    /// Never panics in release; `block_size == 0` degrades to "every call
    /// returns no blocks" rather than dividing by zero, since `hash_blocks`
    /// guards on it explicitly.
    #[must_use]
    pub const fn new(block_size: usize) -> Self {
        Self { block_size }
    }

    /// Returns the configured block size.
    #[must_use]
    pub const fn block_size(self) -> usize {
        self.block_size
    }

    /// Hashes `tokens` into a sequence of block hashes, one per complete
    /// `block_size`-token chunk from the start. A trailing partial chunk is
    /// not hashed (it has not yet crossed a block boundary).
    #[must_use]
    pub fn hash_blocks(self, tokens: &[u64]) -> Vec<BlockHash> {
        if self.block_size == 0 {
            return Vec::new();
        }
        let mut hashes = Vec::with_capacity(tokens.len() / self.block_size);
        let mut previous = 0u128;
        for chunk in tokens.chunks_exact(self.block_size) {
            let mut hasher = Sha256::new();
            hasher.update(previous.to_le_bytes());
            for token in chunk {
                hasher.update(token.to_le_bytes());
            }
            let digest = hasher.finalize();
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(&digest[..16]);
            let hash = BlockHash(u128::from_le_bytes(bytes));
            hashes.push(hash);
            previous = hash.0;
        }
        hashes
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

    #[test]
    fn identical_prefixes_hash_identically() {
        let hasher = PrefixHasher::new(4);
        let a = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let b = vec![1, 2, 3, 4, 9, 9, 9, 9];
        let hashes_a = hasher.hash_blocks(&a);
        let hashes_b = hasher.hash_blocks(&b);
        assert_eq!(hashes_a[0], hashes_b[0]);
        assert_ne!(hashes_a[1], hashes_b[1]);
    }

    #[test]
    fn trailing_partial_chunk_is_not_hashed() {
        let hasher = PrefixHasher::new(4);
        let tokens = vec![1, 2, 3, 4, 5, 6];
        assert_eq!(hasher.hash_blocks(&tokens).len(), 1);
    }

    #[test]
    fn zero_block_size_yields_no_blocks() {
        let hasher = PrefixHasher::new(0);
        assert!(hasher.hash_blocks(&[1, 2, 3]).is_empty());
    }

    #[test]
    fn divergence_after_common_prefix_changes_all_later_hashes() {
        let hasher = PrefixHasher::new(2);
        let a = vec![1, 2, 3, 4, 5, 6];
        let b = vec![1, 2, 9, 4, 5, 6];
        let hashes_a = hasher.hash_blocks(&a);
        let hashes_b = hasher.hash_blocks(&b);
        assert_eq!(hashes_a[0], hashes_b[0]);
        assert_ne!(hashes_a[1], hashes_b[1]);
        assert_ne!(hashes_a[2], hashes_b[2]);
    }
}
