//! A [`Channel`] wrapper that authenticates and encrypts every message.
//!
//! During [`EncryptedChannel::bootstrap`] every pair of parties runs a Diffie-Hellman exchange
//! over Ristretto. The ephemeral public keys are signed with each party's long-term identity key,
//! so a party only talks to the peers whose identities it was configured with. Each direction of
//! each pair gets its own ChaCha20-Poly1305 key, and messages are numbered, so replayed,
//! reordered or dropped messages are detected.

use curve25519_dalek::RistrettoPoint;
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{Channel, Error, ErrorKind};
use crate::crypto::{self, KeyPair, PublicKey, Signature};

const CHANNEL_KEY_CONTEXT: &str = "ringmpc 2024 pairwise channel key";

#[derive(Serialize, Deserialize)]
struct KeyShare {
    ephemeral: PublicKey,
    signature: Signature,
}

fn key_share_msg(from: usize, to: usize, ephemeral: &PublicKey) -> Vec<u8> {
    let mut msg = b"ringmpc key share".to_vec();
    msg.extend((from as u64).to_le_bytes());
    msg.extend((to as u64).to_le_bytes());
    msg.extend(ephemeral.0);
    msg
}

fn direction_key(shared: &RistrettoPoint, from: usize, to: usize) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(CHANNEL_KEY_CONTEXT);
    hasher.update(shared.compress().as_bytes());
    hasher.update(&(from as u64).to_le_bytes());
    hasher.update(&(to as u64).to_le_bytes());
    *hasher.finalize().as_bytes()
}

fn nonce(counter: u64) -> [u8; 12] {
    let mut iv = [0; 12];
    iv[..8].copy_from_slice(&counter.to_le_bytes());
    iv
}

struct Direction {
    key: [u8; 32],
    counter: Mutex<u64>,
}

/// The error raised by an [`EncryptedChannel`].
#[derive(Debug)]
pub enum EncryptedChannelError<E> {
    /// The underlying channel failed.
    Transport(E),
    /// A message failed authentication or was sent out of order.
    Crypto(crypto::CryptoError),
    /// There is no key for the party (e.g. the own index).
    UnknownParty(usize),
}

/// A channel whose messages are encrypted with per-direction keys agreed at bootstrap.
pub struct EncryptedChannel<C> {
    inner: C,
    send: Vec<Option<Direction>>,
    recv: Vec<Option<Direction>>,
}

impl<C: Channel + Sync> EncryptedChannel<C> {
    /// Agrees on pairwise keys with all parties.
    ///
    /// `identities[p]` is the long-term public key of party `p`; the own entry must match
    /// `identity`. Fails if a peer's key share is not signed by its identity key.
    pub async fn bootstrap(
        inner: C,
        rank: usize,
        identity: &KeyPair,
        identities: &[PublicKey],
        rng: &mut (impl Rng + CryptoRng),
    ) -> Result<Self, Error> {
        let phase = "channel bootstrap";
        let err = |reason| Error {
            phase: phase.to_string(),
            reason,
        };
        if identities.get(rank) != Some(&identity.public()) {
            return Err(err(ErrorKind::CryptoError(
                "own identity is not part of the party set".to_string(),
            )));
        }
        let world_size = identities.len();
        let ephemeral = KeyPair::generate(rng);
        for p in (0..world_size).filter(|p| *p != rank) {
            let share = KeyShare {
                ephemeral: ephemeral.public(),
                signature: crypto::sign(identity, &key_share_msg(rank, p, &ephemeral.public())),
            };
            let bytes = bincode::serialize(&share)
                .map_err(|e| err(ErrorKind::SerdeError(format!("{e:?}"))))?;
            inner
                .send_bytes_to(p, bytes)
                .await
                .map_err(|e| err(ErrorKind::SendError(format!("{e:?}"))))?;
        }
        let mut send = Vec::with_capacity(world_size);
        let mut recv = Vec::with_capacity(world_size);
        for (p, peer_identity) in identities.iter().enumerate() {
            if p == rank {
                send.push(None);
                recv.push(None);
                continue;
            }
            let bytes = inner
                .recv_bytes_from(p)
                .await
                .map_err(|e| err(ErrorKind::RecvError(format!("{e:?}"))))?;
            let share: KeyShare = bincode::deserialize(&bytes)
                .map_err(|e| err(ErrorKind::SerdeError(format!("{e:?}"))))?;
            crypto::verify(
                peer_identity,
                &key_share_msg(p, rank, &share.ephemeral),
                &share.signature,
            )
            .map_err(|e| err(ErrorKind::CryptoError(format!("party {p}: {e}"))))?;
            let peer_point = share
                .ephemeral
                .point()
                .map_err(|e| err(ErrorKind::CryptoError(format!("party {p}: {e}"))))?;
            let shared = ephemeral.secret() * peer_point;
            send.push(Some(Direction {
                key: direction_key(&shared, rank, p),
                counter: Mutex::new(0),
            }));
            recv.push(Some(Direction {
                key: direction_key(&shared, p, rank),
                counter: Mutex::new(0),
            }));
        }
        debug!(rank, world_size, "encrypted channel established");
        Ok(Self { inner, send, recv })
    }

    /// The wrapped channel.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Channel + Sync> Channel for EncryptedChannel<C> {
    type SendError = EncryptedChannelError<C::SendError>;
    type RecvError = EncryptedChannelError<C::RecvError>;

    async fn send_bytes_to(&self, party: usize, msg: Vec<u8>) -> Result<(), Self::SendError> {
        let Some(Some(dir)) = self.send.get(party) else {
            return Err(EncryptedChannelError::UnknownParty(party));
        };
        let mut counter = dir.counter.lock().await;
        let ct = crypto::encrypt(&dir.key, &nonce(*counter), &msg)
            .map_err(EncryptedChannelError::Crypto)?;
        self.inner
            .send_bytes_to(party, ct)
            .await
            .map_err(EncryptedChannelError::Transport)?;
        *counter += 1;
        Ok(())
    }

    async fn recv_bytes_from(&self, party: usize) -> Result<Vec<u8>, Self::RecvError> {
        let Some(Some(dir)) = self.recv.get(party) else {
            return Err(EncryptedChannelError::UnknownParty(party));
        };
        let mut counter = dir.counter.lock().await;
        let ct = self
            .inner
            .recv_bytes_from(party)
            .await
            .map_err(EncryptedChannelError::Transport)?;
        let msg = crypto::decrypt(&dir.key, &nonce(*counter), &ct)
            .map_err(EncryptedChannelError::Crypto)?;
        *counter += 1;
        Ok(msg)
    }
}
