//! Local evaluation of kernels on public values.
//!
//! Operations the compiler labels as public see plaintext operands at every party, so their
//! result is computed without any protocol: conversions and openings are the identity, and the
//! arithmetic and boolean kernels apply the ring operation they stand for.

use super::semi2k::Semi2kOp;
use crate::{error::Error, ring::ArrayRef};

/// Evaluates the operation of `kernel` on public `operands`.
pub fn eval(op: Semi2kOp, kernel: &str, operands: &[ArrayRef]) -> Result<ArrayRef, Error> {
    let binary = |f: fn(&ArrayRef, &ArrayRef) -> Result<ArrayRef, Error>| match operands {
        [x, y] => {
            x.check_compatible(y, kernel)?;
            f(x, y)
        }
        _ => Err(arity(kernel, "2", operands.len())),
    };
    match op {
        Semi2kOp::P2A
        | Semi2kOp::A2P
        | Semi2kOp::B2P
        | Semi2kOp::A2B
        | Semi2kOp::B2A
        | Semi2kOp::B2ARandbit => match operands {
            [x] => Ok(x.clone()),
            _ => Err(arity(kernel, "1", operands.len())),
        },
        Semi2kOp::NegA => match operands {
            [x] => Ok(x.neg()),
            _ => Err(arity(kernel, "1", operands.len())),
        },
        Semi2kOp::AddAA | Semi2kOp::AddAP | Semi2kOp::AddBB => binary(ArrayRef::add),
        Semi2kOp::MulAA | Semi2kOp::MulAP => binary(ArrayRef::mul),
        Semi2kOp::XorBB | Semi2kOp::XorBP => binary(ArrayRef::xor),
        Semi2kOp::AndBB | Semi2kOp::AndBP => binary(ArrayRef::and),
        Semi2kOp::SumAA => {
            let Some((first, rest)) = operands.split_first() else {
                return Err(arity(kernel, "at least 1", 0));
            };
            rest.iter().try_fold(first.clone(), |acc, x| {
                acc.check_compatible(x, kernel)?;
                acc.add(x)
            })
        }
    }
}

fn arity(kernel: &str, expected: &str, actual: usize) -> Error {
    Error::Arity {
        kernel: kernel.to_string(),
        expected: expected.to_string(),
        actual,
    }
}
