//! Cryptographic primitives used while bootstrapping secure channels.
//!
//! None of these are used per kernel invocation: they protect the key exchange between the
//! parties (see [`crate::channel::encrypted`]) and the envelope that can carry session secrets
//! such as seeds.
//!
//! * [`encrypt`] / [`decrypt`]: ChaCha20-Poly1305 with an explicit key and nonce.
//! * [`seal`] / [`open`]: a digital envelope, i.e. hybrid encryption to a Ristretto public key.
//! * [`sign`] / [`verify`]: Schnorr signatures over the Ristretto group.

use blake3::Hasher;
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use curve25519_dalek::{
    RistrettoPoint, Scalar, constants::RISTRETTO_BASEPOINT_TABLE, ristretto::CompressedRistretto,
};
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};

use crate::utils::RngCompat;

const ENVELOPE_CONTEXT: &str = "ringmpc 2024 digital envelope key";
const NONCE_CONTEXT: &str = "ringmpc 2024 schnorr nonce";
const CHALLENGE_CONTEXT: &str = "ringmpc 2024 schnorr challenge";

/// Errors raised by the primitives of this module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// The plaintext could not be encrypted.
    #[error("encryption failed")]
    EncryptionFailed,
    /// The ciphertext could not be authenticated.
    #[error("decryption failed")]
    DecryptionFailed,
    /// Bytes that should encode a curve point do not.
    #[error("invalid public key or curve point")]
    InvalidPoint,
    /// The signature does not match the message and public key.
    #[error("invalid signature")]
    InvalidSignature,
}

/// Encrypts `plaintext` with ChaCha20-Poly1305. A `(key, iv)` pair must never be reused.
pub fn encrypt(key: &[u8; 32], iv: &[u8; 12], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypts and authenticates a ciphertext produced by [`encrypt`].
pub fn decrypt(key: &[u8; 32], iv: &[u8; 12], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// A compressed Ristretto public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub(crate) fn point(&self) -> Result<RistrettoPoint, CryptoError> {
        point_from_bytes(&self.0)
    }
}

pub(crate) fn point_from_bytes(bytes: &[u8]) -> Result<RistrettoPoint, CryptoError> {
    CompressedRistretto::from_slice(bytes)
        .map_err(|_| CryptoError::InvalidPoint)?
        .decompress()
        .ok_or(CryptoError::InvalidPoint)
}

/// A Ristretto key pair, used both for signing and for receiving envelopes.
#[derive(Clone)]
pub struct KeyPair {
    secret: Scalar,
    public: PublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Samples a fresh key pair.
    pub fn generate(rng: &mut (impl Rng + CryptoRng)) -> Self {
        let secret = Scalar::random(&mut RngCompat(rng));
        Self::from_secret(secret)
    }

    pub(crate) fn from_secret(secret: Scalar) -> Self {
        let public = PublicKey((&secret * RISTRETTO_BASEPOINT_TABLE).compress().to_bytes());
        Self { secret, public }
    }

    /// The public half.
    pub fn public(&self) -> PublicKey {
        self.public
    }

    pub(crate) fn secret(&self) -> &Scalar {
        &self.secret
    }
}

fn wide_scalar(context: &str, parts: &[&[u8]]) -> Scalar {
    let mut hasher = Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let mut wide = [0u8; 64];
    hasher.finalize_xof().fill(&mut wide);
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// A Schnorr signature `(R, s)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    r: [u8; 32],
    s: [u8; 32],
}

/// Signs `msg`. The nonce is derived deterministically from the secret key and the message.
pub fn sign(key: &KeyPair, msg: &[u8]) -> Signature {
    let k = wide_scalar(NONCE_CONTEXT, &[key.secret.as_bytes(), msg]);
    let r = (&k * RISTRETTO_BASEPOINT_TABLE).compress().to_bytes();
    let e = wide_scalar(CHALLENGE_CONTEXT, &[&r, &key.public.0, msg]);
    let s = k + e * key.secret;
    Signature { r, s: s.to_bytes() }
}

/// Checks a signature produced by [`sign`].
pub fn verify(public: &PublicKey, msg: &[u8], sig: &Signature) -> Result<(), CryptoError> {
    let p = public.point()?;
    let r = point_from_bytes(&sig.r)?;
    let s = Option::<Scalar>::from(Scalar::from_canonical_bytes(sig.s))
        .ok_or(CryptoError::InvalidSignature)?;
    let e = wide_scalar(CHALLENGE_CONTEXT, &[&sig.r, &public.0, msg]);
    if &s * RISTRETTO_BASEPOINT_TABLE == r + e * p {
        Ok(())
    } else {
        Err(CryptoError::InvalidSignature)
    }
}

/// A message encrypted to a public key with [`seal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    ephemeral: [u8; 32],
    ciphertext: Vec<u8>,
}

fn envelope_key(shared: &RistrettoPoint, ephemeral: &[u8; 32], recipient: &PublicKey) -> [u8; 32] {
    let mut hasher = Hasher::new_derive_key(ENVELOPE_CONTEXT);
    hasher.update(shared.compress().as_bytes());
    hasher.update(ephemeral);
    hasher.update(&recipient.0);
    *hasher.finalize().as_bytes()
}

/// Encrypts `plaintext` so that only the owner of `recipient` can read it.
pub fn seal(
    recipient: &PublicKey,
    plaintext: &[u8],
    rng: &mut (impl Rng + CryptoRng),
) -> Result<Envelope, CryptoError> {
    let ephemeral = KeyPair::generate(rng);
    let shared = ephemeral.secret * recipient.point()?;
    let key = envelope_key(&shared, &ephemeral.public.0, recipient);
    // the key is never reused, so a fixed nonce is fine
    let ciphertext = encrypt(&key, &[0; 12], plaintext)?;
    Ok(Envelope {
        ephemeral: ephemeral.public.0,
        ciphertext,
    })
}

/// Decrypts an envelope sealed to `key`'s public half.
pub fn open(key: &KeyPair, envelope: &Envelope) -> Result<Vec<u8>, CryptoError> {
    let shared = key.secret * point_from_bytes(&envelope.ephemeral)?;
    let sym = envelope_key(&shared, &envelope.ephemeral, &key.public);
    decrypt(&sym, &[0; 12], &envelope.ciphertext)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn aead_detects_tampering() {
        let key = [7; 32];
        let iv = [1; 12];
        let mut ct = encrypt(&key, &iv, b"seed material").unwrap();
        assert_eq!(decrypt(&key, &iv, &ct).unwrap(), b"seed material");
        assert_eq!(decrypt(&key, &[2; 12], &ct), Err(CryptoError::DecryptionFailed));
        ct[0] ^= 1;
        assert_eq!(decrypt(&key, &iv, &ct), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn signatures() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let alice = KeyPair::generate(&mut rng);
        let bob = KeyPair::generate(&mut rng);
        let sig = sign(&alice, b"hello");
        assert_eq!(verify(&alice.public(), b"hello", &sig), Ok(()));
        assert_eq!(
            verify(&alice.public(), b"hellO", &sig),
            Err(CryptoError::InvalidSignature)
        );
        assert_eq!(
            verify(&bob.public(), b"hello", &sig),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn envelopes() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let alice = KeyPair::generate(&mut rng);
        let eve = KeyPair::generate(&mut rng);
        let envelope = seal(&alice.public(), b"triple seed", &mut rng).unwrap();
        assert_eq!(open(&alice, &envelope).unwrap(), b"triple seed");
        assert_eq!(open(&eve, &envelope), Err(CryptoError::DecryptionFailed));
    }
}
