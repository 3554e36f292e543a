//! Kernels, the context they are evaluated in, and the registry that resolves them by name.

use std::{
    collections::BTreeMap,
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
};

use serde::{Deserialize, Serialize};

use super::{semi2k::Semi2kOp, state::Semi2kState};
use crate::{cexpr::CExpr, channel::Channel, error::Error, link::Link, ring::ArrayRef};

/// A named protocol step with a symbolic cost.
pub trait Kernel: Send + Sync {
    /// The name the kernel is registered under.
    fn name(&self) -> &'static str;

    /// The number of communication rounds, as a function of `K` and `N`.
    fn latency(&self) -> CExpr;

    /// The bits each party sends per element, as a function of `K` and `N`.
    fn comm(&self) -> CExpr;
}

/// A kernel with one operand.
pub trait UnaryKernel: Kernel {
    /// Evaluates the kernel on the own share of `x`.
    fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
    ) -> impl Future<Output = Result<ArrayRef, Error>> + Send;
}

/// A kernel with two operands.
pub trait BinaryKernel: Kernel {
    /// Evaluates the kernel on the own shares of `x` and `y`.
    fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        x: &ArrayRef,
        y: &ArrayRef,
    ) -> impl Future<Output = Result<ArrayRef, Error>> + Send;
}

/// A kernel with any positive number of operands.
pub trait VariadicKernel: Kernel {
    /// Evaluates the kernel on the own shares of `xs`.
    fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        xs: &[ArrayRef],
    ) -> impl Future<Output = Result<ArrayRef, Error>> + Send;
}

/// Everything a kernel invocation may use: the communication context, the protocol state and
/// the invocation's unique tag.
pub struct KernelEvalContext<'a, C: Channel> {
    link: &'a Link<C>,
    state: &'a Semi2kState,
    kernel: &'a str,
    tag: String,
    sub_tags: AtomicUsize,
}

impl<'a, C: Channel> KernelEvalContext<'a, C> {
    /// Creates the context for one invocation of `kernel`.
    ///
    /// All parties must pass the same `tag` for the same invocation, and no two invocations of a
    /// session may share a tag.
    pub fn new(link: &'a Link<C>, state: &'a Semi2kState, kernel: &'a str, tag: String) -> Self {
        Self {
            link,
            state,
            kernel,
            tag,
            sub_tags: AtomicUsize::new(0),
        }
    }

    /// The communication context.
    pub fn link(&self) -> &'a Link<C> {
        self.link
    }

    /// The protocol state.
    pub fn state(&self) -> &'a Semi2kState {
        self.state
    }

    /// The name of the invoked kernel.
    pub fn kernel(&self) -> &str {
        self.kernel
    }

    /// The unique tag of this invocation.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The own rank.
    pub fn rank(&self) -> usize {
        self.link.rank()
    }

    /// A fresh tag for the next round of this invocation, e.g. `MulAA#3/mul0`.
    ///
    /// Sub-tags are numbered in the order they are requested, which is the same at every party
    /// as long as the kernel's round structure is fixed.
    pub fn sub_tag(&self, label: &str) -> String {
        let n = self.sub_tags.fetch_add(1, Ordering::Relaxed);
        format!("{}/{label}{n}", self.tag)
    }
}

/// The number of operands a kernel takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arity {
    /// Exactly one.
    Unary,
    /// Exactly two.
    Binary,
    /// At least one.
    Variadic,
}

impl Arity {
    pub(crate) fn expected(self) -> &'static str {
        match self {
            Arity::Unary => "1",
            Arity::Binary => "2",
            Arity::Variadic => "at least 1",
        }
    }

    fn check(self, kernel: &str, operands: usize) -> Result<(), Error> {
        let ok = match self {
            Arity::Unary => operands == 1,
            Arity::Binary => operands == 2,
            Arity::Variadic => operands >= 1,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::Arity {
                kernel: kernel.to_string(),
                expected: self.expected().to_string(),
                actual: operands,
            })
        }
    }
}

/// A registered kernel: its cost formulas are stored as data next to the operation they
/// describe.
#[derive(Debug, Clone)]
pub struct KernelEntry {
    name: String,
    arity: Arity,
    latency: CExpr,
    comm: CExpr,
    op: Semi2kOp,
}

impl KernelEntry {
    /// The name the entry is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of operands.
    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Rounds, as a function of `K` and `N`.
    pub fn latency(&self) -> &CExpr {
        &self.latency
    }

    /// Bits sent per party and element, as a function of `K` and `N`.
    pub fn comm(&self) -> &CExpr {
        &self.comm
    }

    /// The operation the entry runs.
    pub fn op(&self) -> Semi2kOp {
        self.op
    }

    /// Runs the kernel on the own shares of `operands`.
    pub async fn proc<C: Channel + Sync>(
        &self,
        ctx: &KernelEvalContext<'_, C>,
        operands: &[ArrayRef],
    ) -> Result<ArrayRef, Error> {
        self.arity.check(&self.name, operands.len())?;
        self.op.proc(ctx, operands).await
    }
}

/// The cost of one kernel at a concrete deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEntry {
    /// The kernel name.
    pub kernel: String,
    /// The latency formula.
    pub latency: String,
    /// The communication formula.
    pub comm: String,
    /// The latency at the report's `K` and `N`.
    pub latency_value: u64,
    /// The communication at the report's `K` and `N`.
    pub comm_value: u64,
}

/// The complexity table of a protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostReport {
    /// The protocol name.
    pub protocol: String,
    /// The ring width the formulas were evaluated at.
    pub k: u64,
    /// The party count the formulas were evaluated at.
    pub n: u64,
    /// One entry per kernel, ordered by name.
    pub entries: Vec<CostEntry>,
}

/// The kernels of one protocol, by name.
#[derive(Debug, Clone)]
pub struct Registry {
    protocol: String,
    entries: BTreeMap<String, KernelEntry>,
}

impl Registry {
    /// An empty registry for `protocol`.
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            entries: BTreeMap::new(),
        }
    }

    /// The protocol name.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Registers `op` under its kernel's own name.
    pub fn register(&mut self, op: Semi2kOp) {
        self.register_as(op.kernel().name(), op);
    }

    /// Registers `op` under `name`, replacing any previous entry.
    pub fn register_as(&mut self, name: &str, op: Semi2kOp) {
        let kernel = op.kernel();
        self.entries.insert(
            name.to_string(),
            KernelEntry {
                name: name.to_string(),
                arity: op.arity(),
                latency: kernel.latency(),
                comm: kernel.comm(),
                op,
            },
        );
    }

    /// Looks up a kernel by name.
    pub fn get(&self, name: &str) -> Result<&KernelEntry, Error> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::UnknownKernel(name.to_string()))
    }

    /// The registered names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Evaluates every kernel's cost at ring width `k` and `n` parties, without running it.
    pub fn report(&self, k: u64, n: u64) -> CostReport {
        CostReport {
            protocol: self.protocol.clone(),
            k,
            n,
            entries: self
                .entries
                .values()
                .map(|e| CostEntry {
                    kernel: e.name.clone(),
                    latency: e.latency.to_string(),
                    comm: e.comm.to_string(),
                    latency_value: e.latency.eval(k, n),
                    comm_value: e.comm.eval(k, n),
                })
                .collect(),
        }
    }

    /// Picks the candidate with the fewest rounds at `k` and `n`, breaking ties by
    /// communication.
    pub fn cheapest(&self, candidates: &[&str], k: u64, n: u64) -> Result<&KernelEntry, Error> {
        let mut best: Option<(&KernelEntry, (u64, u64))> = None;
        for name in candidates {
            let entry = self.get(name)?;
            let cost = (entry.latency.eval(k, n), entry.comm.eval(k, n));
            if best.is_none_or(|(_, c)| cost < c) {
                best = Some((entry, cost));
            }
        }
        best.map(|(e, _)| e).ok_or_else(|| Error::InvalidOperand {
            op: "cheapest".to_string(),
            reason: "no candidates".to_string(),
        })
    }
}
