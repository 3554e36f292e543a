//! Ring values: fixed-width elements modulo `2^K`, shared between kernels by reference counting.

use std::{fmt, sync::Arc};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The ring `Z_{2^K}` an [`ArrayRef`] lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    /// `K = 8`.
    Ring8,
    /// `K = 16`.
    Ring16,
    /// `K = 32`.
    Ring32,
    /// `K = 64`.
    Ring64,
    /// `K = 128`.
    Ring128,
}

impl Field {
    /// All supported ring widths, smallest first.
    pub const ALL: [Field; 5] = [
        Field::Ring8,
        Field::Ring16,
        Field::Ring32,
        Field::Ring64,
        Field::Ring128,
    ];

    /// The element bit-width `K`.
    pub const fn bits(self) -> usize {
        match self {
            Field::Ring8 => 8,
            Field::Ring16 => 16,
            Field::Ring32 => 32,
            Field::Ring64 => 64,
            Field::Ring128 => 128,
        }
    }

    /// The number of bytes an element occupies on the wire.
    pub const fn bytes(self) -> usize {
        self.bits() / 8
    }

    /// The mask selecting the low `K` bits of a `u128`.
    pub const fn mask(self) -> u128 {
        match self {
            Field::Ring128 => u128::MAX,
            f => (1u128 << f.bits()) - 1,
        }
    }

    /// Returns the field with the given bit-width, if it is supported.
    pub fn from_bits(bits: usize) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.bits() == bits)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FM{}", self.bits())
    }
}

/// An immutable, reference-counted buffer of ring elements.
///
/// Cloning an `ArrayRef` is cheap and never copies the elements. Every element is stored in a
/// `u128` and is always reduced modulo `2^K`.
#[derive(Clone, PartialEq, Eq)]
pub struct ArrayRef {
    field: Field,
    data: Arc<[u128]>,
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayRef<{}>[{}]", self.field, self.len())
    }
}

impl ArrayRef {
    /// Creates a ring value, reducing every element modulo `2^K`.
    pub fn new(field: Field, values: impl IntoIterator<Item = u128>) -> Self {
        let mask = field.mask();
        Self {
            field,
            data: values.into_iter().map(|v| v & mask).collect(),
        }
    }

    /// `len` zeros.
    pub fn zeros(field: Field, len: usize) -> Self {
        Self::new(field, std::iter::repeat_n(0, len))
    }

    /// `len` uniformly random elements drawn from `rng`.
    pub fn random(field: Field, len: usize, rng: &mut impl Rng) -> Self {
        Self::new(field, (0..len).map(|_| rng.random::<u128>()))
    }

    /// The ring this value lives in.
    pub fn field(&self) -> Field {
        self.field
    }

    /// The number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the value holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The elements, each reduced modulo `2^K`.
    pub fn as_slice(&self) -> &[u128] {
        &self.data
    }

    /// Checks that `other` has the same width and length, naming `op` otherwise.
    pub fn check_compatible(&self, other: &ArrayRef, op: &str) -> Result<(), Error> {
        if self.field != other.field {
            return Err(Error::FieldMismatch {
                op: op.to_string(),
                lhs: self.field,
                rhs: other.field,
            });
        }
        if self.len() != other.len() {
            return Err(Error::LengthMismatch {
                op: op.to_string(),
                lhs: self.len(),
                rhs: other.len(),
            });
        }
        Ok(())
    }

    fn zip_with(
        &self,
        other: &ArrayRef,
        op: &str,
        f: impl Fn(u128, u128) -> u128,
    ) -> Result<ArrayRef, Error> {
        self.check_compatible(other, op)?;
        Ok(ArrayRef::new(
            self.field,
            self.data.iter().zip(other.data.iter()).map(|(a, b)| f(*a, *b)),
        ))
    }

    fn map(&self, f: impl Fn(u128) -> u128) -> ArrayRef {
        ArrayRef::new(self.field, self.data.iter().map(|a| f(*a)))
    }

    /// Element-wise addition modulo `2^K`.
    pub fn add(&self, other: &ArrayRef) -> Result<ArrayRef, Error> {
        self.zip_with(other, "add", u128::wrapping_add)
    }

    /// Element-wise subtraction modulo `2^K`.
    pub fn sub(&self, other: &ArrayRef) -> Result<ArrayRef, Error> {
        self.zip_with(other, "sub", u128::wrapping_sub)
    }

    /// Element-wise multiplication modulo `2^K`.
    pub fn mul(&self, other: &ArrayRef) -> Result<ArrayRef, Error> {
        self.zip_with(other, "mul", u128::wrapping_mul)
    }

    /// Element-wise XOR.
    pub fn xor(&self, other: &ArrayRef) -> Result<ArrayRef, Error> {
        self.zip_with(other, "xor", |a, b| a ^ b)
    }

    /// Element-wise AND.
    pub fn and(&self, other: &ArrayRef) -> Result<ArrayRef, Error> {
        self.zip_with(other, "and", |a, b| a & b)
    }

    /// Additive inverse modulo `2^K`.
    pub fn neg(&self) -> ArrayRef {
        self.map(u128::wrapping_neg)
    }

    /// Bitwise complement within `K` bits.
    pub fn not(&self) -> ArrayRef {
        self.map(|a| !a)
    }

    /// Multiplies every element by a public scalar.
    pub fn scale(&self, k: u128) -> ArrayRef {
        self.map(|a| a.wrapping_mul(k))
    }

    /// Logical left shift; bits shifted past `K` are dropped.
    pub fn shl(&self, bits: usize) -> ArrayRef {
        if bits >= 128 {
            return ArrayRef::zeros(self.field, self.len());
        }
        self.map(|a| a << bits)
    }

    /// Logical right shift.
    pub fn shr(&self, bits: usize) -> ArrayRef {
        if bits >= 128 {
            return ArrayRef::zeros(self.field, self.len());
        }
        self.map(|a| a >> bits)
    }

    /// Extracts bit `i` of every element into the least significant bit.
    pub fn bit(&self, i: usize) -> ArrayRef {
        if i >= 128 {
            return ArrayRef::zeros(self.field, self.len());
        }
        self.map(|a| (a >> i) & 1)
    }

    /// Joins values of the same ring into one buffer, e.g. to batch several openings into one
    /// round.
    pub fn concat(parts: &[&ArrayRef]) -> Result<ArrayRef, Error> {
        let Some(first) = parts.first() else {
            return Err(Error::InvalidOperand {
                op: "concat".to_string(),
                reason: "no values to join".to_string(),
            });
        };
        for p in parts {
            if p.field != first.field {
                return Err(Error::FieldMismatch {
                    op: "concat".to_string(),
                    lhs: first.field,
                    rhs: p.field,
                });
            }
        }
        Ok(ArrayRef::new(
            first.field,
            parts.iter().flat_map(|p| p.data.iter().copied()),
        ))
    }

    /// Splits the buffer into consecutive chunks of `len` elements each.
    pub fn chunks(&self, len: usize) -> Result<Vec<ArrayRef>, Error> {
        if len == 0 || self.len() % len != 0 {
            return Err(Error::LengthMismatch {
                op: "chunks".to_string(),
                lhs: self.len(),
                rhs: len,
            });
        }
        Ok(self
            .data
            .chunks(len)
            .map(|c| ArrayRef::new(self.field, c.iter().copied()))
            .collect())
    }

    /// Packs the elements into `K/8` little-endian bytes each.
    pub fn to_bytes(&self) -> Vec<u8> {
        let width = self.field.bytes();
        let mut bytes = Vec::with_capacity(self.len() * width);
        for v in self.data.iter() {
            bytes.extend_from_slice(&v.to_le_bytes()[..width]);
        }
        bytes
    }

    /// Unpacks bytes produced by [`ArrayRef::to_bytes`], returning `None` if the length does not
    /// match `len` elements of `field`.
    pub fn from_bytes(field: Field, len: usize, bytes: &[u8]) -> Option<ArrayRef> {
        let width = field.bytes();
        if bytes.len() != len * width {
            return None;
        }
        Some(ArrayRef::new(
            field,
            bytes.chunks(width).map(|chunk| {
                let mut buf = [0u8; 16];
                buf[..width].copy_from_slice(chunk);
                u128::from_le_bytes(buf)
            }),
        ))
    }
}

/// Splits `secret` into `n` additive shares modulo `2^K`.
pub fn share_arith(secret: &ArrayRef, n: usize, rng: &mut impl Rng) -> Vec<ArrayRef> {
    let mut shares: Vec<ArrayRef> = (1..n)
        .map(|_| ArrayRef::random(secret.field(), secret.len(), rng))
        .collect();
    let last = ArrayRef::new(
        secret.field(),
        (0..secret.len()).map(|i| {
            shares
                .iter()
                .fold(secret.data[i], |acc, s| acc.wrapping_sub(s.data[i]))
        }),
    );
    shares.push(last);
    shares
}

/// Splits `secret` into `n` XOR shares.
pub fn share_bool(secret: &ArrayRef, n: usize, rng: &mut impl Rng) -> Vec<ArrayRef> {
    let mut shares: Vec<ArrayRef> = (1..n)
        .map(|_| ArrayRef::random(secret.field(), secret.len(), rng))
        .collect();
    let last = ArrayRef::new(
        secret.field(),
        (0..secret.len()).map(|i| shares.iter().fold(secret.data[i], |acc, s| acc ^ s.data[i])),
    );
    shares.push(last);
    shares
}

/// Sums additive shares.
pub fn reconstruct_arith(shares: &[ArrayRef]) -> Result<ArrayRef, Error> {
    fold_shares(shares, "reconstruct_arith", ArrayRef::add)
}

/// XORs boolean shares.
pub fn reconstruct_bool(shares: &[ArrayRef]) -> Result<ArrayRef, Error> {
    fold_shares(shares, "reconstruct_bool", ArrayRef::xor)
}

fn fold_shares(
    shares: &[ArrayRef],
    op: &str,
    f: impl Fn(&ArrayRef, &ArrayRef) -> Result<ArrayRef, Error>,
) -> Result<ArrayRef, Error> {
    let Some((first, rest)) = shares.split_first() else {
        return Err(Error::InvalidOperand {
            op: op.to_string(),
            reason: "no shares".to_string(),
        });
    };
    rest.iter().try_fold(first.clone(), |acc, s| f(&acc, s))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn elements_are_reduced() {
        let a = ArrayRef::new(Field::Ring8, [255, 256, 257]);
        assert_eq!(a.as_slice(), &[255, 0, 1]);
        let b = ArrayRef::new(Field::Ring8, [1, 1, 1]);
        assert_eq!(a.add(&b).unwrap().as_slice(), &[0, 1, 2]);
        assert_eq!(b.neg().as_slice(), &[255, 255, 255]);
        assert_eq!(a.shl(4).as_slice(), &[240, 0, 16]);
    }

    #[test]
    fn bits_past_the_word_are_zero() {
        let a = ArrayRef::new(Field::Ring128, [u128::MAX, 1 << 127]);
        assert_eq!(a.bit(127).as_slice(), &[1, 1]);
        assert_eq!(a.bit(128).as_slice(), &[0, 0]);
        assert_eq!(a.bit(usize::MAX).as_slice(), &[0, 0]);
        assert_eq!(a.shr(200).as_slice(), &[0, 0]);
    }

    #[test]
    fn mismatched_operands_fail() {
        let a = ArrayRef::zeros(Field::Ring32, 4);
        let b = ArrayRef::zeros(Field::Ring64, 4);
        let c = ArrayRef::zeros(Field::Ring32, 5);
        assert!(matches!(a.add(&b), Err(Error::FieldMismatch { .. })));
        assert!(matches!(a.xor(&c), Err(Error::LengthMismatch { .. })));
    }

    #[test]
    fn wire_codec_uses_k_bits() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        for field in Field::ALL {
            let a = ArrayRef::random(field, 7, &mut rng);
            let bytes = a.to_bytes();
            assert_eq!(bytes.len(), 7 * field.bits() / 8);
            assert_eq!(ArrayRef::from_bytes(field, 7, &bytes), Some(a));
            assert_eq!(ArrayRef::from_bytes(field, 6, &bytes), None);
        }
    }

    #[test]
    fn shares_reconstruct() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for field in Field::ALL {
            let secret = ArrayRef::random(field, 10, &mut rng);
            for n in [2, 3, 5] {
                let a = share_arith(&secret, n, &mut rng);
                let b = share_bool(&secret, n, &mut rng);
                assert_eq!(reconstruct_arith(&a).unwrap(), secret);
                assert_eq!(reconstruct_bool(&b).unwrap(), secret);
            }
        }
    }

    #[test]
    fn concat_and_chunks() {
        let a = ArrayRef::new(Field::Ring16, [1, 2]);
        let b = ArrayRef::new(Field::Ring16, [3, 4]);
        let joined = ArrayRef::concat(&[&a, &b]).unwrap();
        assert_eq!(joined.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(joined.chunks(2).unwrap(), vec![a, b]);
        assert!(joined.chunks(3).is_err());
    }
}
