//! Sources of correlated randomness for multiplications and conversions.
//!
//! A [`Beaver`] source is one of a closed set of variants (see [`BeaverSource`]) behind a single
//! interface. Every request is identified by the unique tag of the kernel call that needs it. The
//! source keeps a ledger of issued tags: a correlation is never handed out twice, and an optional
//! budget limits the total number of correlations. Both checks happen before any message is sent.

use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard},
};

use tracing::debug;

use crate::{
    channel::Channel,
    config::BeaverKind,
    error::Error,
    link::Link,
    ring::{ArrayRef, Field},
};

mod ot;
mod tfp;

pub use ot::BeaverOt;
pub use tfp::BeaverTfp;

/// Shares of a multiplication triple: `c = a * b` (or `c = a & b` for boolean triples), one per
/// element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    /// The share of the first factor.
    pub a: ArrayRef,
    /// The share of the second factor.
    pub b: ArrayRef,
    /// The share of the product.
    pub c: ArrayRef,
}

/// Shares of random bits `r`, one per element, both as XOR shares (in the least significant bit)
/// and as additive shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandBits {
    /// XOR shares of the bits.
    pub boolean: ArrayRef,
    /// Additive shares of the same bits.
    pub arith: ArrayRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Correlation {
    Mul,
    And,
}

/// The variants a [`Beaver`] source can be built from.
#[derive(Debug)]
pub enum BeaverSource {
    /// Rank 0 derives all correlations from the other parties' seeds.
    TrustedDealer(BeaverTfp),
    /// Correlations are generated interactively from oblivious transfers.
    Ot(BeaverOt),
}

#[derive(Debug)]
struct Ledger {
    issued: HashSet<String>,
    remaining: Option<usize>,
}

/// A source of multiplication triples and random bits, bound to one session.
#[derive(Debug)]
pub struct Beaver {
    source: BeaverSource,
    ledger: Mutex<Ledger>,
}

impl Beaver {
    /// Sets up the source of the given kind; this is the only time the source communicates
    /// outside of requests.
    pub async fn new<C: Channel + Sync>(
        link: &Link<C>,
        kind: BeaverKind,
        seed: Option<[u8; 32]>,
        budget: Option<usize>,
    ) -> Result<Self, Error> {
        let source = match kind {
            BeaverKind::TrustedDealer => {
                BeaverSource::TrustedDealer(BeaverTfp::new(link, seed).await?)
            }
            BeaverKind::Ot => BeaverSource::Ot(BeaverOt::new(link, seed)),
        };
        Ok(Self {
            source,
            ledger: Mutex::new(Ledger {
                issued: HashSet::new(),
                remaining: budget,
            }),
        })
    }

    /// Which variant this source is.
    pub fn kind(&self) -> BeaverKind {
        match self.source {
            BeaverSource::TrustedDealer(_) => BeaverKind::TrustedDealer,
            BeaverSource::Ot(_) => BeaverKind::Ot,
        }
    }

    /// The variant this source is built from.
    pub fn source(&self) -> &BeaverSource {
        &self.source
    }

    /// How many more correlations the budget allows, or `None` if unlimited.
    pub fn remaining(&self) -> Option<usize> {
        self.ledger().remaining
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn issue(&self, tag: &str, count: usize) -> Result<(), Error> {
        let mut ledger = self.ledger();
        if ledger.issued.contains(tag) {
            return Err(Error::TripleReuse(tag.to_string()));
        }
        if let Some(remaining) = ledger.remaining {
            if count > remaining {
                return Err(Error::BeaverExhausted {
                    tag: tag.to_string(),
                    requested: count,
                    remaining,
                });
            }
            ledger.remaining = Some(remaining - count);
        }
        ledger.issued.insert(tag.to_string());
        Ok(())
    }

    /// Returns shares of `len` arithmetic triples `c = a * b` in `field`.
    pub async fn mul<C: Channel + Sync>(
        &self,
        link: &Link<C>,
        tag: &str,
        field: Field,
        len: usize,
    ) -> Result<Triple, Error> {
        self.issue(tag, len)?;
        debug!(tag, %field, len, "beaver mul");
        match &self.source {
            BeaverSource::TrustedDealer(tfp) => Ok(tfp.triple(Correlation::Mul, tag, field, len)),
            BeaverSource::Ot(ot) => ot.triple(link, Correlation::Mul, tag, field, len).await,
        }
    }

    /// Returns shares of `len` boolean triples `c = a & b` in `field`.
    pub async fn and<C: Channel + Sync>(
        &self,
        link: &Link<C>,
        tag: &str,
        field: Field,
        len: usize,
    ) -> Result<Triple, Error> {
        self.issue(tag, len)?;
        debug!(tag, %field, len, "beaver and");
        match &self.source {
            BeaverSource::TrustedDealer(tfp) => Ok(tfp.triple(Correlation::And, tag, field, len)),
            BeaverSource::Ot(ot) => ot.triple(link, Correlation::And, tag, field, len).await,
        }
    }

    /// Returns shares of `len` random bits in `field`.
    pub async fn randbit<C: Channel + Sync>(
        &self,
        link: &Link<C>,
        tag: &str,
        field: Field,
        len: usize,
    ) -> Result<RandBits, Error> {
        self.issue(tag, len)?;
        debug!(tag, %field, len, "beaver randbit");
        match &self.source {
            BeaverSource::TrustedDealer(tfp) => Ok(tfp.randbits(tag, field, len)),
            BeaverSource::Ot(ot) => ot.randbits(link, tag, field, len).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::future::try_join_all;

    use super::*;
    use crate::{
        channel::SimpleChannel,
        ring::{reconstruct_arith, reconstruct_bool},
    };

    async fn sources(
        n: usize,
        kind: BeaverKind,
        budget: Option<usize>,
    ) -> Vec<(Link<SimpleChannel>, Beaver)> {
        let links: Vec<Link<SimpleChannel>> = SimpleChannel::channels(n)
            .into_iter()
            .enumerate()
            .map(|(rank, c)| Link::new(c, rank, n).unwrap())
            .collect();
        let beavers = try_join_all(
            links
                .iter()
                .map(|link| Beaver::new(link, kind, Some([1; 32]), budget)),
        )
        .await
        .unwrap();
        links.into_iter().zip(beavers).collect()
    }

    async fn check_correlations(n: usize, kind: BeaverKind) {
        let parties = sources(n, kind, None).await;
        for field in [Field::Ring8, Field::Ring64, Field::Ring128] {
            let tag = format!("test/{field}");
            let triples = try_join_all(
                parties
                    .iter()
                    .map(|(link, beaver)| beaver.mul(link, &tag, field, 5)),
            )
            .await
            .unwrap();
            let a = reconstruct_arith(&triples.iter().map(|t| t.a.clone()).collect::<Vec<_>>());
            let b = reconstruct_arith(&triples.iter().map(|t| t.b.clone()).collect::<Vec<_>>());
            let c = reconstruct_arith(&triples.iter().map(|t| t.c.clone()).collect::<Vec<_>>());
            assert_eq!(a.unwrap().mul(&b.unwrap()).unwrap(), c.unwrap());

            let tag = format!("test/and/{field}");
            let triples = try_join_all(
                parties
                    .iter()
                    .map(|(link, beaver)| beaver.and(link, &tag, field, 5)),
            )
            .await
            .unwrap();
            let a = reconstruct_bool(&triples.iter().map(|t| t.a.clone()).collect::<Vec<_>>());
            let b = reconstruct_bool(&triples.iter().map(|t| t.b.clone()).collect::<Vec<_>>());
            let c = reconstruct_bool(&triples.iter().map(|t| t.c.clone()).collect::<Vec<_>>());
            assert_eq!(a.unwrap().and(&b.unwrap()).unwrap(), c.unwrap());

            let tag = format!("test/randbit/{field}");
            let bits = try_join_all(
                parties
                    .iter()
                    .map(|(link, beaver)| beaver.randbit(link, &tag, field, 16)),
            )
            .await
            .unwrap();
            let rb = reconstruct_bool(&bits.iter().map(|r| r.boolean.clone()).collect::<Vec<_>>())
                .unwrap();
            let ra = reconstruct_arith(&bits.iter().map(|r| r.arith.clone()).collect::<Vec<_>>())
                .unwrap();
            assert_eq!(rb.bit(0), rb);
            assert_eq!(rb, ra);
        }
    }

    #[tokio::test]
    async fn trusted_dealer_correlations() {
        check_correlations(2, BeaverKind::TrustedDealer).await;
        check_correlations(3, BeaverKind::TrustedDealer).await;
    }

    #[tokio::test]
    async fn ot_correlations() {
        check_correlations(2, BeaverKind::Ot).await;
        check_correlations(3, BeaverKind::Ot).await;
    }

    #[tokio::test]
    async fn tags_are_never_reissued() {
        let parties = sources(2, BeaverKind::TrustedDealer, None).await;
        let (link, beaver) = &parties[0];
        beaver.mul(link, "MulAA#0", Field::Ring32, 1).await.unwrap();
        assert!(matches!(
            beaver.mul(link, "MulAA#0", Field::Ring32, 1).await,
            Err(Error::TripleReuse(_))
        ));
        assert!(matches!(
            beaver.and(link, "MulAA#0", Field::Ring32, 1).await,
            Err(Error::TripleReuse(_))
        ));
    }

    #[tokio::test]
    async fn budget_is_enforced() {
        let parties = sources(2, BeaverKind::TrustedDealer, Some(3)).await;
        let (link, beaver) = &parties[1];
        beaver.mul(link, "a", Field::Ring16, 2).await.unwrap();
        assert_eq!(beaver.remaining(), Some(1));
        let err = beaver.mul(link, "b", Field::Ring16, 2).await.unwrap_err();
        assert!(err.is_precondition());
        assert!(matches!(
            err,
            Error::BeaverExhausted {
                requested: 2,
                remaining: 1,
                ..
            }
        ));
        beaver.randbit(link, "c", Field::Ring16, 1).await.unwrap();
        assert_eq!(beaver.remaining(), Some(0));
    }
}
