//! Correlations from oblivious transfers, without a dealer.
//!
//! For a triple, every party samples its own `a_i` and `b_i`. The cross terms `a_i * b_j` of
//! every ordered pair of parties are shared with one OT-based product each, so that the sum of
//! all `c_i` is `(sum a_i) * (sum b_i)`. Random bits are the XOR of one private bit per party,
//! combined into an additive sharing one party at a time with `v + u - 2uv`.

use futures::future::try_join_all;
use rand::Rng;

use super::{Correlation, RandBits, Triple};
use crate::{
    channel::Channel,
    error::Error,
    link::Link,
    ot::{ProductKind, product_receiver, product_sender},
    ring::{ArrayRef, Field},
    utils::{party_seed, tagged_rng},
};

/// The OT-based Beaver source.
#[derive(Debug)]
pub struct BeaverOt {
    seed: [u8; 32],
}

impl BeaverOt {
    pub(crate) fn new<C: Channel>(link: &Link<C>, seed: Option<[u8; 32]>) -> Self {
        Self {
            seed: party_seed(seed, "ringmpc 2024 beaver ot seed", link.rank()),
        }
    }

    /// Shares of `x_me ∘ y_peer` and `x_peer ∘ y_me` with every peer, summed up.
    ///
    /// For a pair `lo < hi` the product with `lo` as sender runs first; the pairs run
    /// concurrently under distinct tags.
    async fn cross_terms<C: Channel + Sync>(
        &self,
        link: &Link<C>,
        tag: &str,
        kind: ProductKind,
        x: &ArrayRef,
        y: &ArrayRef,
        y_bits: usize,
    ) -> Result<Vec<ArrayRef>, Error> {
        let me = link.rank();
        try_join_all(link.peers().map(|peer| async move {
            let (lo, hi) = (me.min(peer), me.max(peer));
            let send_tag = format!("{tag}/{me}-{peer}");
            let recv_tag = format!("{tag}/{peer}-{me}");
            let mut rng = tagged_rng(&self.seed, &format!("{tag}/pair{lo}-{hi}"));
            if me == lo {
                let s = product_sender(link, peer, &send_tag, kind, x, y_bits, &mut rng).await?;
                let r = product_receiver(link, peer, &recv_tag, kind, y, y_bits, &mut rng).await?;
                Ok::<_, Error>([s, r])
            } else {
                let r = product_receiver(link, peer, &recv_tag, kind, y, y_bits, &mut rng).await?;
                let s = product_sender(link, peer, &send_tag, kind, x, y_bits, &mut rng).await?;
                Ok([s, r])
            }
        }))
        .await
        .map(|shares| shares.into_iter().flatten().collect())
    }

    pub(crate) async fn triple<C: Channel + Sync>(
        &self,
        link: &Link<C>,
        kind: Correlation,
        tag: &str,
        field: Field,
        len: usize,
    ) -> Result<Triple, Error> {
        let mut rng = tagged_rng(&self.seed, tag);
        let a = ArrayRef::random(field, len, &mut rng);
        let b = ArrayRef::random(field, len, &mut rng);
        let (product, own) = match kind {
            Correlation::Mul => (ProductKind::Arith, a.mul(&b)?),
            Correlation::And => (ProductKind::Bool, a.and(&b)?),
        };
        let terms = self
            .cross_terms(link, tag, product, &a, &b, field.bits())
            .await?;
        let c = terms.iter().try_fold(own, |acc, t| match kind {
            Correlation::Mul => acc.add(t),
            Correlation::And => acc.xor(t),
        })?;
        Ok(Triple { a, b, c })
    }

    pub(crate) async fn randbits<C: Channel + Sync>(
        &self,
        link: &Link<C>,
        tag: &str,
        field: Field,
        len: usize,
    ) -> Result<RandBits, Error> {
        let me = link.rank();
        let mut rng = tagged_rng(&self.seed, tag);
        let u = ArrayRef::new(field, (0..len).map(|_| rng.random::<u128>() & 1));
        let zeros = ArrayRef::zeros(field, len);

        // additive shares of u_0 ^ ... ^ u_i, extended one party at a time
        let mut v = if me == 0 { u.clone() } else { zeros.clone() };
        for i in 1..link.world_size() {
            let step = format!("{tag}/xor{i}");
            let prod = if me == i {
                // v * u_i = v_i * u_i + sum over peers of v_j * u_i
                let mut prod = v.mul(&u)?;
                let terms = try_join_all(link.peers().map(|peer| {
                    let step = &step;
                    let u = &u;
                    async move {
                        let mut rng = tagged_rng(&self.seed, &format!("{step}/{peer}"));
                        let t = format!("{step}/{peer}-{me}");
                        product_receiver(link, peer, &t, ProductKind::Arith, u, 1, &mut rng).await
                    }
                }))
                .await?;
                for t in &terms {
                    prod = prod.add(t)?;
                }
                prod
            } else {
                let mut rng = tagged_rng(&self.seed, &step);
                let t = format!("{step}/{me}-{i}");
                product_sender(link, i, &t, ProductKind::Arith, &v, 1, &mut rng).await?
            };
            let own_u = if me == i { &u } else { &zeros };
            v = v.add(own_u)?.sub(&prod.scale(2))?;
        }
        Ok(RandBits { boolean: u, arith: v })
    }
}
