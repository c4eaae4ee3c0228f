//! Default key fingerprint
//!
//! A fast non-cryptographic 64-bit fingerprint over a byte span, used to
//! derive home buckets whenever the caller supplies no hash of their own.

use xxhash_rust::xxh64::xxh64;

/// Seed for the default fingerprint.
const FINGERPRINT_SEED: u64 = 0xcafe_babe;

/// Fingerprint a byte span as a 64-bit value.
///
/// This is XXH64 with a fixed seed. It is stable for the lifetime of a
/// table but not guaranteed stable across crate versions, so fingerprints
/// must not be persisted.
#[inline]
pub fn fingerprint(bytes: &[u8]) -> u64 {
    xxh64(bytes, FINGERPRINT_SEED)
}
