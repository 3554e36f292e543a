//! Correlations from a trusted first party.
//!
//! Rank 0 plays the dealer. At setup every other party sends it a fresh seed. For a request
//! with tag `t`, party `p` expands its shares from `ChaCha20(keyed_hash(seed_p, t))`. The dealer
//! replays all these streams and fixes its own share of the product (or of the bit), so no
//! message is needed per request.

use rand::Rng;

use super::{Correlation, RandBits, Triple};
use crate::{
    channel::{Channel, ErrorKind},
    error::Error,
    link::Link,
    ring::{ArrayRef, Field},
    utils::{party_seed, tagged_rng},
};

const DEALER: usize = 0;
const SEED_TAG: &str = "beaver_tfp/seed";

/// The trusted-dealer Beaver source.
#[derive(Debug)]
pub struct BeaverTfp {
    rank: usize,
    seed: [u8; 32],
    // only known to the dealer
    peer_seeds: Vec<[u8; 32]>,
}

impl BeaverTfp {
    pub(crate) async fn new<C: Channel>(
        link: &Link<C>,
        seed: Option<[u8; 32]>,
    ) -> Result<Self, Error> {
        let rank = link.rank();
        let seed = party_seed(seed, "ringmpc 2024 beaver tfp seed", rank);
        let mut peer_seeds = vec![];
        if rank == DEALER {
            for p in 0..link.world_size() {
                if p == DEALER {
                    peer_seeds.push(seed);
                    continue;
                }
                let bytes = link.recv(p, SEED_TAG).await?;
                let peer_seed: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| link.fail(SEED_TAG, ErrorKind::InvalidLength))?;
                peer_seeds.push(peer_seed);
            }
        } else {
            link.send(DEALER, SEED_TAG, seed.to_vec()).await?;
        }
        Ok(Self {
            rank,
            seed,
            peer_seeds,
        })
    }

    fn expand_triple(seed: &[u8; 32], tag: &str, field: Field, len: usize) -> Triple {
        let mut rng = tagged_rng(seed, tag);
        let a = ArrayRef::random(field, len, &mut rng);
        let b = ArrayRef::random(field, len, &mut rng);
        let c = ArrayRef::random(field, len, &mut rng);
        Triple { a, b, c }
    }

    pub(crate) fn triple(&self, kind: Correlation, tag: &str, field: Field, len: usize) -> Triple {
        if self.rank != DEALER {
            return Self::expand_triple(&self.seed, tag, field, len);
        }
        let triples: Vec<Triple> = self
            .peer_seeds
            .iter()
            .map(|seed| Self::expand_triple(seed, tag, field, len))
            .collect();
        let (mut a, mut b, mut c) = (vec![0u128; len], vec![0u128; len], vec![0u128; len]);
        for t in &triples {
            for i in 0..len {
                match kind {
                    Correlation::And => {
                        a[i] ^= t.a.as_slice()[i];
                        b[i] ^= t.b.as_slice()[i];
                        c[i] ^= t.c.as_slice()[i];
                    }
                    Correlation::Mul => {
                        a[i] = a[i].wrapping_add(t.a.as_slice()[i]);
                        b[i] = b[i].wrapping_add(t.b.as_slice()[i]);
                        c[i] = c[i].wrapping_add(t.c.as_slice()[i]);
                    }
                }
            }
        }
        // `c` so far includes the dealer's own random share, which is replaced
        let own = &triples[DEALER];
        let own_c = (0..len).map(|i| {
            let c_i = own.c.as_slice()[i];
            match kind {
                Correlation::And => (a[i] & b[i]) ^ c[i] ^ c_i,
                Correlation::Mul => a[i]
                    .wrapping_mul(b[i])
                    .wrapping_sub(c[i].wrapping_sub(c_i)),
            }
        });
        Triple {
            a: own.a.clone(),
            b: own.b.clone(),
            c: ArrayRef::new(field, own_c),
        }
    }

    fn expand_bits(seed: &[u8; 32], tag: &str, field: Field, len: usize) -> RandBits {
        let mut rng = tagged_rng(seed, tag);
        let boolean = ArrayRef::new(field, (0..len).map(|_| rng.random::<u128>() & 1));
        let arith = ArrayRef::random(field, len, &mut rng);
        RandBits { boolean, arith }
    }

    pub(crate) fn randbits(&self, tag: &str, field: Field, len: usize) -> RandBits {
        if self.rank != DEALER {
            return Self::expand_bits(&self.seed, tag, field, len);
        }
        let peers: Vec<RandBits> = self
            .peer_seeds
            .iter()
            .enumerate()
            .filter(|(p, _)| *p != DEALER)
            .map(|(_, seed)| Self::expand_bits(seed, tag, field, len))
            .collect();
        // the bits themselves come from the dealer's own stream
        let mut rng = tagged_rng(&self.seed, tag);
        let r: Vec<u128> = (0..len).map(|_| rng.random::<u128>() & 1).collect();
        let boolean = (0..len).map(|i| {
            peers
                .iter()
                .fold(r[i], |acc, s| acc ^ s.boolean.as_slice()[i])
        });
        let arith = (0..len).map(|i| {
            peers
                .iter()
                .fold(r[i], |acc, s| acc.wrapping_sub(s.arith.as_slice()[i]))
        });
        RandBits {
            boolean: ArrayRef::new(field, boolean),
            arith: ArrayRef::new(field, arith),
        }
    }
}
