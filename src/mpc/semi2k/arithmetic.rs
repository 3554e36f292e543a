//! Kernels on additive shares.

use super::{open_arith, open_comm, zero};
use crate::{
    cexpr::{Const, K, N},
    channel::Channel,
    error::Error,
    mpc::kernel::{BinaryKernel, KernelEvalContext, UnaryKernel, VariadicKernel},
    ring::ArrayRef,
};

/// Shares a public value: rank 0 holds it, all other parties hold zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct P2A;

cost!(P2A, "P2A", latency: zero(), comm: zero());

impl UnaryKernel for P2A {
    async fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        if ctx.rank() == 0 {
            Ok(x.clone())
        } else {
            Ok(ArrayRef::zeros(x.field(), x.len()))
        }
    }
}

/// Opens an additively shared value to every party.
#[derive(Debug, Clone, Copy, Default)]
pub struct A2P;

cost!(A2P, "A2P", latency: Const(1), comm: open_comm());

impl UnaryKernel for A2P {
    async fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        open_arith(ctx, x, "open").await
    }
}

/// Negates a shared value locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegA;

cost!(NegA, "NegA", latency: zero(), comm: zero());

impl UnaryKernel for NegA {
    async fn proc<C: Channel + Sync>(
        &self,
        _ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        Ok(x.neg())
    }
}

/// Adds two shared values locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddAA;

cost!(AddAA, "AddAA", latency: zero(), comm: zero());

impl BinaryKernel for AddAA {
    async fn proc<C: Channel + Sync>(
        &self,
        _ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
        y: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        x.check_compatible(y, "AddAA")?;
        x.add(y)
    }
}

/// Adds a public value to a shared one; only rank 0 adjusts its share.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddAP;

cost!(AddAP, "AddAP", latency: zero(), comm: zero());

impl BinaryKernel for AddAP {
    async fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
        p: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        x.check_compatible(p, "AddAP")?;
        if ctx.rank() == 0 { x.add(p) } else { Ok(x.clone()) }
    }
}

/// Multiplies a shared value by a public one locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct MulAP;

cost!(MulAP, "MulAP", latency: zero(), comm: zero());

impl BinaryKernel for MulAP {
    async fn proc<C: Channel + Sync>(
        &self,
        _ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
        p: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        x.check_compatible(p, "MulAP")?;
        x.mul(p)
    }
}

/// Multiplies two shared values with one Beaver triple per element.
///
/// With a triple `(a, b, c)`, the parties open `e = x - a` and `f = y - b` together in a single
/// round and compute `z = c + e*b + f*a (+ e*f at rank 0)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MulAA;

cost!(MulAA, "MulAA", latency: Const(1), comm: 2 * K() * (N() - 1));

impl BinaryKernel for MulAA {
    async fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
        y: &ArrayRef,
    ) -> Result<ArrayRef, Error> {
        x.check_compatible(y, "MulAA")?;
        if x.is_empty() {
            return Ok(x.clone());
        }
        let (field, len) = (x.field(), x.len());
        let tag = ctx.sub_tag("beaver");
        let t = ctx.state().beaver().mul(ctx.link(), &tag, field, len).await?;
        let masked = ArrayRef::concat(&[&x.sub(&t.a)?, &y.sub(&t.b)?])?;
        let opened = open_arith(ctx, &masked, "open").await?.chunks(len)?;
        let (e, f) = (&opened[0], &opened[1]);
        let z = t.c.add(&e.mul(&t.b)?)?.add(&f.mul(&t.a)?)?;
        if ctx.rank() == 0 { z.add(&e.mul(f)?) } else { Ok(z) }
    }
}

/// Sums any number of shared values locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumAA;

cost!(SumAA, "SumAA", latency: zero(), comm: zero());

impl VariadicKernel for SumAA {
    async fn proc<C: Channel + Sync>(
        &self,
        _ctx: &KernelEvalContext<'_, C>,
        xs: &[ArrayRef],
    ) -> Result<ArrayRef, Error> {
        let Some((first, rest)) = xs.split_first() else {
            return Err(Error::Arity {
                kernel: "SumAA".to_string(),
                expected: "at least 1".to_string(),
                actual: 0,
            });
        };
        rest.iter().try_fold(first.clone(), |acc, x| {
            acc.check_compatible(x, "SumAA")?;
            acc.add(x)
        })
    }
}
