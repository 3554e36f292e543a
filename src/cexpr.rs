//! Symbolic cost expressions over the ring width `K` and the party count `N`.
//!
//! Kernels declare their round latency and communication volume as a [`CExpr`], which a planner
//! evaluates for a concrete deployment without running any protocol:
//!
//! ```
//! use ringmpc::cexpr::{K, Log, N};
//!
//! let latency = (Log(K()) + 1) * Log(N());
//! assert_eq!(latency.eval(64, 3), 14);
//! assert_eq!(latency.to_string(), "(log(K)+1)*log(N)");
//! ```
//!
//! `Log(x)` rounds up: it is the smallest `e` with `2^e >= x`, and `Log(0) = Log(1) = 0`.
//! Subtraction saturates at zero, addition and multiplication saturate at `u64::MAX`.
use std::{
    fmt,
    ops::{Add, Mul, Sub},
};

/// A pure integer formula in the free variables `K` and `N`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CExpr {
    /// A constant.
    Const(u64),
    /// The ring bit-width.
    K,
    /// The number of parties.
    N,
    /// `ceil(log2(x))`.
    Log(Box<CExpr>),
    /// `x + y`.
    Add(Box<CExpr>, Box<CExpr>),
    /// `x - y`, saturating at zero.
    Sub(Box<CExpr>, Box<CExpr>),
    /// `x * y`.
    Mul(Box<CExpr>, Box<CExpr>),
}

/// A constant expression.
#[allow(non_snake_case)]
pub fn Const(v: u64) -> CExpr {
    CExpr::Const(v)
}

/// The ring bit-width `K`.
#[allow(non_snake_case)]
pub fn K() -> CExpr {
    CExpr::K
}

/// The party count `N`.
#[allow(non_snake_case)]
pub fn N() -> CExpr {
    CExpr::N
}

/// `ceil(log2(x))`.
#[allow(non_snake_case)]
pub fn Log(x: CExpr) -> CExpr {
    CExpr::Log(Box::new(x))
}

/// `ceil(log2(x))` on plain integers, the rounding rule used by [`CExpr::Log`].
pub fn ceil_log2(x: u64) -> u64 {
    if x <= 1 {
        0
    } else {
        u64::from(u64::BITS - (x - 1).leading_zeros())
    }
}

impl CExpr {
    /// Evaluates the expression for ring width `k` and `n` parties.
    pub fn eval(&self, k: u64, n: u64) -> u64 {
        match self {
            CExpr::Const(v) => *v,
            CExpr::K => k,
            CExpr::N => n,
            CExpr::Log(x) => ceil_log2(x.eval(k, n)),
            CExpr::Add(x, y) => x.eval(k, n).saturating_add(y.eval(k, n)),
            CExpr::Sub(x, y) => x.eval(k, n).saturating_sub(y.eval(k, n)),
            CExpr::Mul(x, y) => x.eval(k, n).saturating_mul(y.eval(k, n)),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            CExpr::Add(..) | CExpr::Sub(..) => 1,
            CExpr::Mul(..) => 2,
            _ => 3,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for CExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CExpr::Const(v) => write!(f, "{v}"),
            CExpr::K => f.write_str("K"),
            CExpr::N => f.write_str("N"),
            CExpr::Log(x) => write!(f, "log({x})"),
            CExpr::Add(x, y) => {
                x.fmt_operand(f, 1)?;
                f.write_str("+")?;
                y.fmt_operand(f, 1)
            }
            CExpr::Sub(x, y) => {
                x.fmt_operand(f, 1)?;
                f.write_str("-")?;
                y.fmt_operand(f, 2)
            }
            CExpr::Mul(x, y) => {
                x.fmt_operand(f, 2)?;
                f.write_str("*")?;
                y.fmt_operand(f, 2)
            }
        }
    }
}

impl From<u64> for CExpr {
    fn from(v: u64) -> Self {
        CExpr::Const(v)
    }
}

impl<T: Into<CExpr>> Add<T> for CExpr {
    type Output = CExpr;

    fn add(self, rhs: T) -> Self::Output {
        CExpr::Add(Box::new(self), Box::new(rhs.into()))
    }
}

impl<T: Into<CExpr>> Sub<T> for CExpr {
    type Output = CExpr;

    fn sub(self, rhs: T) -> Self::Output {
        CExpr::Sub(Box::new(self), Box::new(rhs.into()))
    }
}

impl<T: Into<CExpr>> Mul<T> for CExpr {
    type Output = CExpr;

    fn mul(self, rhs: T) -> Self::Output {
        CExpr::Mul(Box::new(self), Box::new(rhs.into()))
    }
}

impl Add<CExpr> for u64 {
    type Output = CExpr;

    fn add(self, rhs: CExpr) -> Self::Output {
        CExpr::from(self) + rhs
    }
}

impl Mul<CExpr> for u64 {
    type Output = CExpr;

    fn mul(self, rhs: CExpr) -> Self::Output {
        CExpr::from(self) * rhs
    }
}
