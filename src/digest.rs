//! Digest providers: the pluggable hashing seam.
//!
//! The map treats hashing as an opaque deterministic function from key
//! bytes to a 128-bit digest. Each entry stores its digest at insertion
//! and the provider is never invoked again for that entry; in particular
//! grow/shrink relink from stored digests without calling back in.

use xxhash_rust::xxh3;

/// Deterministic 128-bit digest of a key's bytes.
///
/// Determinism is only required within one process: two calls with the
/// same bytes on the same provider instance must return the same digest.
pub trait DigestProvider {
    fn digest(&self, key: &[u8]) -> u128;
}

/// Default provider: XXH3-128 with the fixed default seed.
///
/// Bucket placement is reproducible across runs and processes. If the map
/// is fed attacker-controlled keys and flood resistance matters more than
/// reproducibility, use [`Xxh3Seeded`] with a secret seed instead.
#[derive(Copy, Clone, Debug, Default)]
pub struct Xxh3Digest;

impl DigestProvider for Xxh3Digest {
    #[inline]
    fn digest(&self, key: &[u8]) -> u128 {
        xxh3::xxh3_128(key)
    }
}

/// XXH3-128 with a caller-chosen seed.
#[derive(Copy, Clone, Debug, Default)]
pub struct Xxh3Seeded(pub u64);

impl DigestProvider for Xxh3Seeded {
    #[inline]
    fn digest(&self, key: &[u8]) -> u128 {
        xxh3::xxh3_128_with_seed(key, self.0)
    }
}
