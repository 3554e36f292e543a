use rand::{CryptoRng, RngCore, SeedableRng, random};
use rand_chacha::ChaCha20Rng;

/// Derives the generator for one request from a long-lived seed and the request's tag.
///
/// Every tag yields an independent stream, and the same `(seed, tag)` always yields the same
/// stream, so a party that knows another party's seed can replay its randomness.
pub(crate) fn tagged_rng(seed: &[u8; 32], tag: &str) -> ChaCha20Rng {
    ChaCha20Rng::from_seed(*blake3::keyed_hash(seed, tag.as_bytes()).as_bytes())
}

/// The seed of party `rank` for the purpose `domain`.
///
/// Derived from the configured `seed` for reproducible runs (parties sharing one configured seed
/// still get distinct seeds), fresh entropy otherwise.
pub(crate) fn party_seed(seed: Option<[u8; 32]>, domain: &str, rank: usize) -> [u8; 32] {
    match seed {
        Some(seed) => {
            let key = blake3::derive_key(domain, &seed);
            *blake3::keyed_hash(&key, &(rank as u64).to_le_bytes()).as_bytes()
        }
        None => random(),
    }
}

/// Lets `rand` 0.9 generators drive APIs written against `rand_core` 0.6, such as
/// `curve25519-dalek`'s `Scalar::random`.
pub(crate) struct RngCompat<R>(pub(crate) R);

impl<R: RngCore> rand_core_0_6::RngCore for RngCompat<R> {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    #[inline]
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }

    #[inline]
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core_0_6::Error> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl<R: CryptoRng> rand_core_0_6::CryptoRng for RngCompat<R> {}
