//! Kernels on boolean (XOR) shares.

use super::{open_bool, open_comm, zero};
use crate::{
    cexpr::{Const, K, Log, N},
    channel::Channel,
    error::Error,
    mpc::kernel::{BinaryKernel, KernelEvalContext, UnaryKernel},
    ring::ArrayRef,
};

/// Opens a boolean shared value to every party.
#[derive(Debug, Clone, Copy, Default)]
pub struct B2P;

cost!(B2P, "B2P", latency: Const(1), comm: open_comm());

impl UnaryKernel for B2P {
    async fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        open_bool(ctx, x, "open").await
    }
}

/// XORs two shared values locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorBB;

cost!(XorBB, "XorBB", latency: zero(), comm: zero());

impl BinaryKernel for XorBB {
    async fn proc<C: Channel + Sync>(
        &self,
        _ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
        y: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        x.check_compatible(y, "XorBB")?;
        x.xor(y)
    }
}

/// XORs a public value into a shared one; only rank 0 adjusts its share.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorBP;

cost!(XorBP, "XorBP", latency: zero(), comm: zero());

impl BinaryKernel for XorBP {
    async fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
        p: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        x.check_compatible(p, "XorBP")?;
        if ctx.rank() == 0 { x.xor(p) } else { Ok(x.clone()) }
    }
}

/// ANDs a shared value with a public one locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct AndBP;

cost!(AndBP, "AndBP", latency: zero(), comm: zero());

impl BinaryKernel for AndBP {
    async fn proc<C: Channel + Sync>(
        &self,
        _ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
        p: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        x.check_compatible(p, "AndBP")?;
        x.and(p)
    }
}

/// ANDs two shared values with one boolean triple per element.
#[derive(Debug, Clone, Copy, Default)]
pub struct AndBB;

cost!(AndBB, "AndBB", latency: Const(1), comm: 2 * K() * (N() - 1));

impl BinaryKernel for AndBB {
    async fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
        y: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        x.check_compatible(y, "AndBB")?;
        and_bb(ctx, x, y).await
    }
}

/// One round of bitwise ANDs; the XOR analogue of `MulAA`.
pub(super) async fn and_bb<C: Channel + Sync>(
    ctx: &KernelEvalContext<'_, C>,
    x: &ArrayRef,
    y: &ArrayRef,
) -> Result<ArrayRef, Error> {
    if x.is_empty() {
        return Ok(x.clone());
    }
    let (field, len) = (x.field(), x.len());
    let tag = ctx.sub_tag("beaver");
    let t = ctx.state().beaver().and(ctx.link(), &tag, field, len).await?;
    let masked = ArrayRef::concat(&[&x.xor(&t.a)?, &y.xor(&t.b)?])?;
    let opened = open_bool(ctx, &masked, "and").await?.chunks(len)?;
    let (e, f) = (&opened[0], &opened[1]);
    let z = t.c.xor(&e.and(&t.b)?)?.xor(&f.and(&t.a)?)?;
    if ctx.rank() == 0 { z.xor(&e.and(f)?) } else { Ok(z) }
}

/// Adds two boolean shared values modulo `2^K` with a parallel-prefix (Kogge-Stone) carry
/// circuit.
///
/// The first round computes the generate bits `x & y`; each of the `log(K)` prefix levels then
/// needs one more round, in which the generate and propagate updates are batched into a single
/// `AndBB`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddBB;

cost!(AddBB, "AddBB", latency: Log(K()) + 1, comm: Log(K()) * K());

impl BinaryKernel for AddBB {
    async fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
        y: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        x.check_compatible(y, "AddBB")?;
        add_bb(ctx, x, y).await
    }
}

pub(super) async fn add_bb<C: Channel + Sync>(
    ctx: &KernelEvalContext<'_, C>,
    x: &ArrayRef,
    y: &ArrayRef,
) -> Result<ArrayRef, Error> {
    if x.is_empty() {
        return Ok(x.clone());
    }
    let len = x.len();
    let bits = x.field().bits();
    let sum = x.xor(y)?;
    let mut g = and_bb(ctx, x, y).await?;
    let mut p = sum.clone();
    let mut stride = 1;
    while stride < bits {
        let last = stride * 2 >= bits;
        if last {
            g = g.xor(&and_bb(ctx, &p, &g.shl(stride)).await?)?;
        } else {
            let lhs = ArrayRef::concat(&[&p, &p])?;
            let rhs = ArrayRef::concat(&[&g.shl(stride), &p.shl(stride)])?;
            let out = and_bb(ctx, &lhs, &rhs).await?.chunks(len)?;
            g = g.xor(&out[0])?;
            p = out[1].clone();
        }
        stride *= 2;
    }
    // the carry out of bit i is the group generate of bits 0..=i
    sum.xor(&g.shl(1))
}
