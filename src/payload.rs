//! Generating the random payload that gets written during the write probe.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Returns `size` bytes of pseudorandom garbage.
///
/// The content only needs to defeat compression and deduplication on the way
/// to the device, so a fast non-cryptographic stream cipher RNG is plenty. With
/// a `seed` the output is reproducible across runs.
pub(crate) fn random(size: usize, seed: Option<u64>) -> Vec<u8> {
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut buf = vec![0; size];
    rng.fill_bytes(&mut buf);
    buf
}
