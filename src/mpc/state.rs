//! Protocol-scoped state of a semi2k session.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use tracing::debug;

use super::beaver::{Beaver, RandBits};
use crate::{
    channel::Channel,
    config::SessionConfig,
    error::Error,
    link::Link,
    ring::{ArrayRef, Field},
};

/// The state a semi2k session threads through every kernel call.
///
/// Owns the session's [`Beaver`] source exclusively, plus a pool of random bits precomputed for
/// the zero-cost `B2A` conversion.
#[derive(Debug)]
pub struct Semi2kState {
    beaver: Beaver,
    // (xor share, additive share) of precomputed random bits, per ring
    b2a_pool: Mutex<HashMap<Field, VecDeque<(u128, u128)>>>,
}

impl Semi2kState {
    /// Binds a new Beaver source to `link`. Only the Beaver setup communicates.
    pub async fn new<C: Channel + Sync>(
        link: &Link<C>,
        config: &SessionConfig,
    ) -> Result<Self, Error> {
        let beaver = Beaver::new(link, config.beaver, config.seed, config.triple_budget).await?;
        Ok(Self {
            beaver,
            b2a_pool: Mutex::new(HashMap::new()),
        })
    }

    /// The session's source of correlated randomness.
    pub fn beaver(&self) -> &Beaver {
        &self.beaver
    }

    /// Generates `count` random bits of `field` for later `B2A` calls.
    ///
    /// A `B2A` of `len` elements consumes `K * len` bits.
    pub async fn precompute_b2a<C: Channel + Sync>(
        &self,
        link: &Link<C>,
        tag: &str,
        field: Field,
        count: usize,
    ) -> Result<(), Error> {
        let bits = self.beaver.randbit(link, tag, field, count).await?;
        let mut pool = self.b2a_pool.lock().unwrap_or_else(|e| e.into_inner());
        let entry = pool.entry(field).or_default();
        entry.extend(
            bits.boolean
                .as_slice()
                .iter()
                .copied()
                .zip(bits.arith.as_slice().iter().copied()),
        );
        debug!(tag, %field, count, available = entry.len(), "precomputed b2a material");
        Ok(())
    }

    /// The number of precomputed random bits of `field` left.
    pub fn b2a_material(&self, field: Field) -> usize {
        let pool = self.b2a_pool.lock().unwrap_or_else(|e| e.into_inner());
        pool.get(&field).map_or(0, VecDeque::len)
    }

    /// Removes `count` precomputed random bits of `field` from the pool, or fails without
    /// removing any.
    pub(crate) fn take_b2a_material(
        &self,
        kernel: &str,
        field: Field,
        count: usize,
    ) -> Result<RandBits, Error> {
        let mut pool = self.b2a_pool.lock().unwrap_or_else(|e| e.into_inner());
        let available = pool.get(&field).map_or(0, VecDeque::len);
        if available < count {
            return Err(Error::MissingConversionMaterial {
                kernel: kernel.to_string(),
                field,
                required: count,
                available,
            });
        }
        let taken: Vec<(u128, u128)> = pool
            .get_mut(&field)
            .map(|bits| bits.drain(..count).collect())
            .unwrap_or_default();
        Ok(RandBits {
            boolean: ArrayRef::new(field, taken.iter().map(|(b, _)| *b)),
            arith: ArrayRef::new(field, taken.iter().map(|(_, a)| *a)),
        })
    }
}
