//! Conversions between additive and boolean shares.

use super::{a2b_comm, a2b_latency, boolean::add_bb, open_bool, open_comm, zero};
use crate::{
    cexpr::Const,
    channel::Channel,
    error::Error,
    mpc::{
        beaver::RandBits,
        kernel::{KernelEvalContext, UnaryKernel},
    },
    ring::ArrayRef,
};

/// Converts additive shares into boolean shares of the same value.
///
/// Party `i`'s additive share is already a boolean sharing of itself (party `i` holds it, all
/// others hold zero). The `N` such sharings are summed with a tree of boolean adders; all
/// additions of one tree level run as a single batched `AddBB`, so the conversion takes
/// `log(N)` adder latencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct A2B;

cost!(A2B, "A2B", latency: a2b_latency(), comm: a2b_comm());

impl UnaryKernel for A2B {
    async fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        if x.is_empty() {
            return Ok(x.clone());
        }
        let len = x.len();
        let zeros = ArrayRef::zeros(x.field(), len);
        let me = ctx.rank();
        let mut level: Vec<ArrayRef> = (0..ctx.link().world_size())
            .map(|p| if p == me { x.clone() } else { zeros.clone() })
            .collect();
        while level.len() > 1 {
            let pairs = level.len() / 2;
            let lhs = ArrayRef::concat(&level.iter().step_by(2).take(pairs).collect::<Vec<_>>())?;
            let rhs = ArrayRef::concat(&level.iter().skip(1).step_by(2).collect::<Vec<_>>())?;
            let odd = (level.len() % 2 == 1).then(|| level[level.len() - 1].clone());
            level = add_bb(ctx, &lhs, &rhs).await?.chunks(len)?;
            level.extend(odd);
        }
        Ok(level.swap_remove(0))
    }
}

/// Converts boolean shares into additive shares using random bits `r` shared both ways.
///
/// The parties open `c = x ^ r` and compute, for every bit, `x_t = c_t + r_t - 2*c_t*r_t`
/// locally, then recombine the bits with their weights `2^t`.
async fn b2a_with_bits<C: Channel + Sync>(
    ctx: &KernelEvalContext<'_, C>,
    x: &ArrayRef,
    bits: RandBits,
) -> Result<ArrayRef, Error> {
    let (field, len, k) = (x.field(), x.len(), x.field().bits());
    let r_bool = bits.boolean.as_slice();
    let r_arith = bits.arith.as_slice();
    let r = ArrayRef::new(
        field,
        (0..len).map(|i| (0..k).fold(0, |acc, t| acc | ((r_bool[i * k + t] & 1) << t))),
    );
    let c = open_bool(ctx, &x.xor(&r)?, "open").await?;
    let rank0 = ctx.rank() == 0;
    Ok(ArrayRef::new(
        field,
        c.as_slice().iter().enumerate().map(|(i, c)| {
            (0..k).fold(0u128, |acc, t| {
                let c_t = (c >> t) & 1;
                let r_t = r_arith[i * k + t];
                let x_t = if c_t == 1 {
                    u128::from(rank0).wrapping_sub(r_t)
                } else {
                    r_t
                };
                acc.wrapping_add(x_t << t)
            })
        }),
    ))
}

/// Converts boolean shares into additive shares with random bits precomputed by
/// [`crate::mpc::state::Semi2kState::precompute_b2a`].
///
/// Fails with [`Error::MissingConversionMaterial`] before communicating if the pool holds fewer
/// than `K * len` bits of the operand's ring.
#[derive(Debug, Clone, Copy, Default)]
pub struct B2A;

cost!(B2A, "B2A", latency: zero(), comm: zero());

impl UnaryKernel for B2A {
    async fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        let required = x.len() * x.field().bits();
        // the pool is drawn before the first await so every party takes the same bits for
        // the same call, whatever other kernels of its wave are doing
        let bits = ctx
            .state()
            .take_b2a_material(ctx.kernel(), x.field(), required)?;
        if x.is_empty() {
            return Ok(x.clone());
        }
        b2a_with_bits(ctx, x, bits).await
    }
}

/// Converts boolean shares into additive shares with random bits generated on the spot.
#[derive(Debug, Clone, Copy, Default)]
pub struct B2ARandbit;

cost!(B2ARandbit, "B2A_Randbit", latency: Const(1), comm: open_comm());

impl UnaryKernel for B2ARandbit {
    async fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        if x.is_empty() {
            return Ok(x.clone());
        }
        let count = x.len() * x.field().bits();
        let tag = ctx.sub_tag("randbit");
        let bits = ctx
            .state()
            .beaver()
            .randbit(ctx.link(), &tag, x.field(), count)
            .await?;
        b2a_with_bits(ctx, x, bits).await
    }
}
