//! The semi2k protocol: semi-honest additive (and XOR) secret sharing modulo `2^K` among any
//! number of parties.
//!
//! Kernel names follow the sharing of their operands: `A` is an additive share, `B` a boolean
//! (XOR) share and `P` a public value known to every party. All kernels are unit structs
//! implementing one of the arity traits of [`super::kernel`]; [`Semi2kOp`] closes over them so
//! that a [`Registry`] can store and dispatch them as data.

use super::kernel::{
    Arity, BinaryKernel, Kernel, KernelEvalContext, Registry, UnaryKernel, VariadicKernel,
};
use crate::{
    cexpr::{CExpr, Const, K, Log, N},
    channel::Channel,
    config::B2aVariant,
    error::Error,
    ring::ArrayRef,
};

macro_rules! cost {
    ($kernel:ident, $name:literal, latency: $latency:expr, comm: $comm:expr) => {
        impl $crate::mpc::kernel::Kernel for $kernel {
            fn name(&self) -> &'static str {
                $name
            }

            fn latency(&self) -> $crate::cexpr::CExpr {
                $latency
            }

            fn comm(&self) -> $crate::cexpr::CExpr {
                $comm
            }
        }
    };
}

mod arithmetic;
mod boolean;
mod conversion;

pub use arithmetic::{A2P, AddAA, AddAP, MulAA, MulAP, NegA, P2A, SumAA};
pub use boolean::{AddBB, AndBB, AndBP, B2P, XorBB, XorBP};
pub use conversion::{A2B, B2A, B2ARandbit};

/// Opens an additively shared value to all parties in one round.
pub(crate) async fn open_arith<C: Channel + Sync>(
    ctx: &KernelEvalContext<'_, C>,
    x: &ArrayRef,
    label: &str,
) -> Result<ArrayRef, Error> {
    let tag = ctx.sub_tag(label);
    let shares = ctx.link().all_gather_array(x, &tag).await?;
    shares
        .iter()
        .try_fold(ArrayRef::zeros(x.field(), x.len()), |acc, s| acc.add(s))
}

/// Opens a boolean shared value to all parties in one round.
pub(crate) async fn open_bool<C: Channel + Sync>(
    ctx: &KernelEvalContext<'_, C>,
    x: &ArrayRef,
    label: &str,
) -> Result<ArrayRef, Error> {
    let tag = ctx.sub_tag(label);
    let shares = ctx.link().all_gather_array(x, &tag).await?;
    shares
        .iter()
        .try_fold(ArrayRef::zeros(x.field(), x.len()), |acc, s| acc.xor(s))
}

/// The semi2k kernels, as a closed set of registrable operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semi2kOp {
    /// [`P2A`]
    P2A,
    /// [`A2P`]
    A2P,
    /// [`B2P`]
    B2P,
    /// [`NegA`]
    NegA,
    /// [`AddAA`]
    AddAA,
    /// [`AddAP`]
    AddAP,
    /// [`MulAP`]
    MulAP,
    /// [`MulAA`]
    MulAA,
    /// [`XorBB`]
    XorBB,
    /// [`XorBP`]
    XorBP,
    /// [`AndBP`]
    AndBP,
    /// [`AndBB`]
    AndBB,
    /// [`AddBB`]
    AddBB,
    /// [`A2B`]
    A2B,
    /// [`B2A`]
    B2A,
    /// [`B2ARandbit`]
    B2ARandbit,
    /// [`SumAA`]
    SumAA,
}

impl Semi2kOp {
    /// Every semi2k kernel.
    pub const ALL: [Semi2kOp; 17] = [
        Semi2kOp::P2A,
        Semi2kOp::A2P,
        Semi2kOp::B2P,
        Semi2kOp::NegA,
        Semi2kOp::AddAA,
        Semi2kOp::AddAP,
        Semi2kOp::MulAP,
        Semi2kOp::MulAA,
        Semi2kOp::XorBB,
        Semi2kOp::XorBP,
        Semi2kOp::AndBP,
        Semi2kOp::AndBB,
        Semi2kOp::AddBB,
        Semi2kOp::A2B,
        Semi2kOp::B2A,
        Semi2kOp::B2ARandbit,
        Semi2kOp::SumAA,
    ];

    /// The kernel implementing the operation, for its name and cost.
    pub fn kernel(self) -> &'static dyn Kernel {
        match self {
            Semi2kOp::P2A => &P2A,
            Semi2kOp::A2P => &A2P,
            Semi2kOp::B2P => &B2P,
            Semi2kOp::NegA => &NegA,
            Semi2kOp::AddAA => &AddAA,
            Semi2kOp::AddAP => &AddAP,
            Semi2kOp::MulAP => &MulAP,
            Semi2kOp::MulAA => &MulAA,
            Semi2kOp::XorBB => &XorBB,
            Semi2kOp::XorBP => &XorBP,
            Semi2kOp::AndBP => &AndBP,
            Semi2kOp::AndBB => &AndBB,
            Semi2kOp::AddBB => &AddBB,
            Semi2kOp::A2B => &A2B,
            Semi2kOp::B2A => &B2A,
            Semi2kOp::B2ARandbit => &B2ARandbit,
            Semi2kOp::SumAA => &SumAA,
        }
    }

    /// The number of operands the operation takes.
    pub fn arity(self) -> Arity {
        match self {
            Semi2kOp::P2A
            | Semi2kOp::A2P
            | Semi2kOp::B2P
            | Semi2kOp::NegA
            | Semi2kOp::A2B
            | Semi2kOp::B2A
            | Semi2kOp::B2ARandbit => Arity::Unary,
            Semi2kOp::AddAA
            | Semi2kOp::AddAP
            | Semi2kOp::MulAP
            | Semi2kOp::MulAA
            | Semi2kOp::XorBB
            | Semi2kOp::XorBP
            | Semi2kOp::AndBP
            | Semi2kOp::AndBB
            | Semi2kOp::AddBB => Arity::Binary,
            Semi2kOp::SumAA => Arity::Variadic,
        }
    }

    /// Runs the operation's kernel on the own shares of `operands`.
    pub(crate) async fn proc<C: Channel + Sync>(
        self,
        ctx: &KernelEvalContext<'_, C>,
        operands: &[ArrayRef],
    ) -> Result<ArrayRef, Error> {
        match (self, operands) {
            (Semi2kOp::P2A, [x]) => P2A.proc(ctx, x).await,
            (Semi2kOp::A2P, [x]) => A2P.proc(ctx, x).await,
            (Semi2kOp::B2P, [x]) => B2P.proc(ctx, x).await,
            (Semi2kOp::NegA, [x]) => NegA.proc(ctx, x).await,
            (Semi2kOp::A2B, [x]) => A2B.proc(ctx, x).await,
            (Semi2kOp::B2A, [x]) => B2A.proc(ctx, x).await,
            (Semi2kOp::B2ARandbit, [x]) => B2ARandbit.proc(ctx, x).await,
            (Semi2kOp::AddAA, [x, y]) => AddAA.proc(ctx, x, y).await,
            (Semi2kOp::AddAP, [x, y]) => AddAP.proc(ctx, x, y).await,
            (Semi2kOp::MulAP, [x, y]) => MulAP.proc(ctx, x, y).await,
            (Semi2kOp::MulAA, [x, y]) => MulAA.proc(ctx, x, y).await,
            (Semi2kOp::XorBB, [x, y]) => XorBB.proc(ctx, x, y).await,
            (Semi2kOp::XorBP, [x, y]) => XorBP.proc(ctx, x, y).await,
            (Semi2kOp::AndBP, [x, y]) => AndBP.proc(ctx, x, y).await,
            (Semi2kOp::AndBB, [x, y]) => AndBB.proc(ctx, x, y).await,
            (Semi2kOp::AddBB, [x, y]) => AddBB.proc(ctx, x, y).await,
            (Semi2kOp::SumAA, xs) if !xs.is_empty() => SumAA.proc(ctx, xs).await,
            (op, _) => Err(Error::Arity {
                kernel: ctx.kernel().to_string(),
                expected: op.arity().expected().to_string(),
                actual: operands.len(),
            }),
        }
    }
}

/// The semi2k registry; the name `B2A` resolves to the chosen conversion variant, while
/// `B2A_Randbit` is always available under its own name.
pub fn registry(b2a: B2aVariant) -> Registry {
    let mut registry = Registry::new("semi2k");
    for op in Semi2kOp::ALL {
        registry.register(op);
    }
    let b2a_op = match b2a {
        B2aVariant::Precomputed => Semi2kOp::B2A,
        B2aVariant::Randbit => Semi2kOp::B2ARandbit,
    };
    registry.register_as("B2A", b2a_op);
    registry
}

/// `(log(K)+1)*log(N)`, the rounds of an `N`-input tree of adders.
fn a2b_latency() -> CExpr {
    (Log(K()) + 1) * Log(N())
}

/// `(2*log(K)+1)*2*K*(N-1)*(N-1)`.
fn a2b_comm() -> CExpr {
    (2 * Log(K()) + 1) * 2 * K() * (N() - 1) * (N() - 1)
}

fn open_comm() -> CExpr {
    K() * (N() - 1)
}

fn zero() -> CExpr {
    Const(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_b2a_to_the_configured_variant() {
        let randbit = registry(B2aVariant::Randbit);
        assert_eq!(randbit.get("B2A").unwrap().op(), Semi2kOp::B2ARandbit);
        assert_eq!(randbit.get("B2A_Randbit").unwrap().op(), Semi2kOp::B2ARandbit);

        let precomputed = registry(B2aVariant::Precomputed);
        assert_eq!(precomputed.get("B2A").unwrap().op(), Semi2kOp::B2A);
        assert_eq!(precomputed.get("B2A").unwrap().latency().eval(64, 3), 0);
        assert_eq!(
            precomputed.get("B2A_Randbit").unwrap().op(),
            Semi2kOp::B2ARandbit
        );
    }

    #[test]
    fn every_kernel_is_registered_once() {
        let registry = registry(B2aVariant::Randbit);
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names.len(), Semi2kOp::ALL.len());
        for op in Semi2kOp::ALL {
            assert!(names.contains(&op.kernel().name()));
        }
        assert!(matches!(
            registry.get("MulBB"),
            Err(Error::UnknownKernel(name)) if name == "MulBB"
        ));
    }

    #[test]
    fn arities() {
        assert_eq!(Semi2kOp::A2B.arity(), Arity::Unary);
        assert_eq!(Semi2kOp::AddBB.arity(), Arity::Binary);
        assert_eq!(Semi2kOp::SumAA.arity(), Arity::Variadic);
    }
}
