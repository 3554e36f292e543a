//! Oblivious transfer between two parties, and the products built from it.
//!
//! The base OT is Chou-Orlandi (cf. <https://eprint.iacr.org/2015/267>) over the Ristretto group,
//! with the index of each transfer hashed into its key (which fixes the bug of the ePrint
//! write-up where all random OTs of one batch coincide). On top of it, [`product_sender`] and
//! [`product_receiver`] compute shares of `x * y` (or `x & y`) for `x` known to one party and `y`
//! known to the other, using one OT per bit of `y` (Gilboa's method).

use curve25519_dalek::{RistrettoPoint, Scalar, constants::RISTRETTO_BASEPOINT_TABLE};
use rand::{CryptoRng, Rng};

use crate::{
    channel::{Channel, ErrorKind},
    crypto::point_from_bytes,
    error::Error,
    link::Link,
    ring::{ArrayRef, Field},
    utils::RngCompat,
};

fn hash_pt(tweak: u128, pt: &RistrettoPoint) -> u128 {
    let h = blake3::keyed_hash(pt.compress().as_bytes(), &tweak.to_le_bytes());
    let mut bytes = [0; 16];
    bytes.copy_from_slice(&h.as_bytes()[..16]);
    u128::from_le_bytes(bytes)
}

fn decode_points<C: Channel>(
    link: &Link<C>,
    tag: &str,
    bytes: Vec<[u8; 32]>,
) -> Result<Vec<RistrettoPoint>, Error> {
    bytes
        .iter()
        .map(|b| {
            point_from_bytes(b).map_err(|e| link.fail(tag, ErrorKind::CryptoError(e.to_string())))
        })
        .collect()
}

/// Sends one of `(m0, m1)` per pair to `peer`, without learning which one it received.
pub(crate) async fn ot_send<C: Channel>(
    link: &Link<C>,
    peer: usize,
    tag: &str,
    inputs: &[(u128, u128)],
    rng: &mut (impl Rng + CryptoRng),
) -> Result<(), Error> {
    let y = Scalar::random(&mut RngCompat(&mut *rng));
    let s = &y * RISTRETTO_BASEPOINT_TABLE;
    link.send_to(peer, &format!("{tag}/s"), &s.compress().to_bytes())
        .await?;
    let ys = y * s;

    let r_tag = format!("{tag}/r");
    let rs: Vec<[u8; 32]> = link.recv_vec_from(peer, &r_tag, inputs.len()).await?;
    let rs = decode_points(link, &r_tag, rs)?;
    let mut cts = Vec::with_capacity(inputs.len());
    for (i, ((m0, m1), r)) in inputs.iter().zip(rs).enumerate() {
        let yr = y * r;
        let k0 = hash_pt(i as u128, &yr);
        let k1 = hash_pt(i as u128, &(yr - ys));
        cts.push((k0 ^ m0, k1 ^ m1));
    }
    link.send_to(peer, &format!("{tag}/c"), &cts).await
}

/// Receives `m_b` of the `i`-th pair sent by `peer` for every choice bit `b = choices[i]`.
pub(crate) async fn ot_recv<C: Channel>(
    link: &Link<C>,
    peer: usize,
    tag: &str,
    choices: &[bool],
    rng: &mut (impl Rng + CryptoRng),
) -> Result<Vec<u128>, Error> {
    let s_tag = format!("{tag}/s");
    let s: [u8; 32] = link.recv_from(peer, &s_tag).await?;
    let s = point_from_bytes(&s)
        .map_err(|e| link.fail(&s_tag, ErrorKind::CryptoError(e.to_string())))?;

    let mut rs = Vec::with_capacity(choices.len());
    let mut ks = Vec::with_capacity(choices.len());
    for (i, b) in choices.iter().enumerate() {
        let x = Scalar::random(&mut RngCompat(&mut *rng));
        let r = &x * RISTRETTO_BASEPOINT_TABLE;
        let r = if *b { r + s } else { r };
        rs.push(r.compress().to_bytes());
        ks.push(hash_pt(i as u128, &(x * s)));
    }
    link.send_to(peer, &format!("{tag}/r"), &rs).await?;

    let cts: Vec<(u128, u128)> = link
        .recv_vec_from(peer, &format!("{tag}/c"), choices.len())
        .await?;
    Ok(choices
        .iter()
        .zip(ks)
        .zip(cts)
        .map(|((b, k), (c0, c1))| k ^ if *b { c1 } else { c0 })
        .collect())
}

/// Whether a product is taken in the ring or bitwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProductKind {
    /// `x * y mod 2^K`; shares are additive.
    Arith,
    /// `x & y`; shares are XOR shares.
    Bool,
}

/// The sender's side of a two-party product: returns its share of `x ∘ y`, where `y` is held by
/// `peer` and only has its lowest `y_bits` bits set.
pub(crate) async fn product_sender<C: Channel>(
    link: &Link<C>,
    peer: usize,
    tag: &str,
    kind: ProductKind,
    x: &ArrayRef,
    y_bits: usize,
    rng: &mut (impl Rng + CryptoRng),
) -> Result<ArrayRef, Error> {
    let field = x.field();
    let mask = field.mask();
    let bits = y_bits.min(field.bits());
    let mut inputs = Vec::with_capacity(x.len() * bits);
    let mut shares = Vec::with_capacity(x.len());
    for &xi in x.as_slice() {
        let mut share = 0u128;
        for t in 0..bits {
            let s = rng.random::<u128>() & mask;
            let m1 = match kind {
                ProductKind::Arith => s.wrapping_add(xi << t),
                ProductKind::Bool => s ^ (xi & (1 << t)),
            };
            inputs.push((s, m1 & mask));
            share = match kind {
                ProductKind::Arith => share.wrapping_sub(s),
                ProductKind::Bool => share ^ s,
            };
        }
        shares.push(share);
    }
    ot_send(link, peer, tag, &inputs, rng).await?;
    Ok(ArrayRef::new(field, shares))
}

/// The receiver's side of a two-party product: returns its share of `x ∘ y`, where `x` is held
/// by `peer`. Bits of `y` above `y_bits` are ignored.
pub(crate) async fn product_receiver<C: Channel>(
    link: &Link<C>,
    peer: usize,
    tag: &str,
    kind: ProductKind,
    y: &ArrayRef,
    y_bits: usize,
    rng: &mut (impl Rng + CryptoRng),
) -> Result<ArrayRef, Error> {
    let field: Field = y.field();
    let bits = y_bits.min(field.bits());
    let choices: Vec<bool> = y
        .as_slice()
        .iter()
        .flat_map(|&yi| (0..bits).map(move |t| (yi >> t) & 1 == 1))
        .collect();
    let received = ot_recv(link, peer, tag, &choices, rng).await?;
    if bits == 0 {
        return Ok(ArrayRef::zeros(field, y.len()));
    }
    Ok(ArrayRef::new(
        field,
        received.chunks(bits).map(|chunk| match kind {
            ProductKind::Arith => chunk.iter().fold(0u128, |acc, m| acc.wrapping_add(*m)),
            ProductKind::Bool => chunk.iter().fold(0u128, |acc, m| acc ^ m),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::channel::SimpleChannel;

    fn pair() -> (Link<SimpleChannel>, Link<SimpleChannel>) {
        let [a, b]: [SimpleChannel; 2] = SimpleChannel::channels(2).try_into().unwrap();
        (Link::new(a, 0, 2).unwrap(), Link::new(b, 1, 2).unwrap())
    }

    #[tokio::test]
    async fn receiver_gets_chosen_messages() {
        let (a, b) = pair();
        let inputs: Vec<(u128, u128)> = (0..8).map(|i| (i, 100 + i)).collect();
        let choices = [true, false, false, true, true, true, false, true];
        let (sent, received) = tokio::join!(
            async {
                let mut rng = ChaCha20Rng::seed_from_u64(1);
                ot_send(&a, 1, "ot", &inputs, &mut rng).await
            },
            async {
                let mut rng = ChaCha20Rng::seed_from_u64(2);
                ot_recv(&b, 0, "ot", &choices, &mut rng).await
            }
        );
        sent.unwrap();
        let received = received.unwrap();
        for (i, (m, c)) in received.iter().zip(choices).enumerate() {
            let expected = if c { inputs[i].1 } else { inputs[i].0 };
            assert_eq!(*m, expected);
        }
    }

    #[tokio::test]
    async fn products_are_shared() {
        for (kind, field) in [
            (ProductKind::Arith, Field::Ring32),
            (ProductKind::Bool, Field::Ring16),
            (ProductKind::Arith, Field::Ring128),
        ] {
            let (a, b) = pair();
            let x = ArrayRef::new(field, [3, 0xfff1, u128::MAX]);
            let y = ArrayRef::new(field, [5, 0x0ff0, 7]);
            let (sa, sb) = tokio::join!(
                async {
                    let mut rng = ChaCha20Rng::seed_from_u64(3);
                    product_sender(&a, 1, "p", kind, &x, field.bits(), &mut rng).await
                },
                async {
                    let mut rng = ChaCha20Rng::seed_from_u64(4);
                    product_receiver(&b, 0, "p", kind, &y, field.bits(), &mut rng).await
                }
            );
            let (sa, sb) = (sa.unwrap(), sb.unwrap());
            let (got, expected) = match kind {
                ProductKind::Arith => (sa.add(&sb).unwrap(), x.mul(&y).unwrap()),
                ProductKind::Bool => (sa.xor(&sb).unwrap(), x.and(&y).unwrap()),
            };
            assert_eq!(got, expected);
        }
    }
}
