//! The communication context shared by all kernels of a session.
//!
//! A [`Link`] wraps a [`Channel`] and knows the own rank and the number of parties. Every message
//! carries a tag; messages are buffered per peer and per tag, so that kernels running
//! concurrently never consume each other's messages. Messages between two parties under the same
//! tag are delivered in the order they were sent.
//!
//! The first transport failure aborts the link: every later call fails with
//! [`Error::SessionAborted`] without touching the channel.

use std::{
    collections::{HashMap, VecDeque},
    pin::pin,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::{trace, warn};

use crate::{
    channel::{self, Channel, ErrorKind},
    error::{ConfigError, Error},
    ring::{ArrayRef, Field},
};

#[derive(Serialize, Deserialize)]
struct Frame {
    tag: String,
    payload: Vec<u8>,
}

/// Messages received from one peer that have not been consumed yet.
#[derive(Default)]
struct Inbox {
    pending: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    reader: AsyncMutex<()>,
    arrived: Notify,
}

impl Inbox {
    fn take(&self, tag: &str) -> Option<Vec<u8>> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let queue = pending.get_mut(tag)?;
        let msg = queue.pop_front();
        if queue.is_empty() {
            pending.remove(tag);
        }
        msg
    }

    fn put(&self, tag: String, payload: Vec<u8>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.entry(tag).or_default().push_back(payload);
    }
}

/// Traffic sent by the own party over a [`Link`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Payload bytes sent, excluding tags and framing.
    pub bytes_sent: u64,
    /// Messages sent.
    pub messages_sent: u64,
}

/// The communication context of one party: rank, party set and tagged collectives.
pub struct Link<C: Channel> {
    channel: C,
    rank: usize,
    world_size: usize,
    inboxes: Vec<Inbox>,
    bytes_sent: AtomicU64,
    messages_sent: AtomicU64,
    aborted: AtomicBool,
}

impl<C: Channel> Link<C> {
    /// Creates the context of party `rank` out of `world_size` parties.
    pub fn new(channel: C, rank: usize, world_size: usize) -> Result<Self, ConfigError> {
        if world_size < 2 {
            return Err(ConfigError::TooFewParties(world_size));
        }
        if rank >= world_size {
            return Err(ConfigError::InvalidRank { rank, world_size });
        }
        Ok(Self {
            channel,
            rank,
            world_size,
            inboxes: (0..world_size).map(|_| Inbox::default()).collect(),
            bytes_sent: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
        })
    }

    /// The own rank in `0..world_size`.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The number of parties.
    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// All ranks except the own one, in ascending order.
    pub fn peers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.world_size).filter(move |p| *p != self.rank)
    }

    /// The traffic sent so far.
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
        }
    }

    /// Whether a previous failure has aborted the link.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Aborts the link, failing all later calls.
    pub fn abort(&self) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            warn!(rank = self.rank, "link aborted");
        }
    }

    fn check_alive(&self) -> Result<(), Error> {
        if self.is_aborted() {
            Err(Error::SessionAborted)
        } else {
            Ok(())
        }
    }

    fn check_peer(&self, party: usize, tag: &str) -> Result<(), Error> {
        if party >= self.world_size || party == self.rank {
            return Err(Error::InvalidOperand {
                op: tag.to_string(),
                reason: format!("party {party} is not a peer of party {}", self.rank),
            });
        }
        Ok(())
    }

    pub(crate) fn fail(&self, tag: &str, reason: ErrorKind) -> Error {
        self.abort();
        Error::Channel(channel::Error {
            phase: tag.to_string(),
            reason,
        })
    }

    /// Sends raw bytes to `party` under `tag`.
    pub async fn send(&self, party: usize, tag: &str, payload: Vec<u8>) -> Result<(), Error> {
        self.check_alive()?;
        self.check_peer(party, tag)?;
        let len = payload.len() as u64;
        let frame = Frame {
            tag: tag.to_string(),
            payload,
        };
        let bytes = bincode::serialize(&frame)
            .map_err(|e| self.fail(tag, ErrorKind::SerdeError(format!("{e:?}"))))?;
        trace!(from = self.rank, to = party, tag, len, "send");
        self.channel
            .send_bytes_to(party, bytes)
            .await
            .map_err(|e| self.fail(tag, ErrorKind::SendError(format!("{e:?}"))))?;
        self.bytes_sent.fetch_add(len, Ordering::Relaxed);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Receives the next raw message sent by `party` under `tag`.
    pub async fn recv(&self, party: usize, tag: &str) -> Result<Vec<u8>, Error> {
        self.check_alive()?;
        self.check_peer(party, tag)?;
        let inbox = &self.inboxes[party];
        loop {
            let mut arrived = pin!(inbox.arrived.notified());
            arrived.as_mut().enable();
            if let Some(payload) = inbox.take(tag) {
                trace!(from = party, to = self.rank, tag, len = payload.len(), "recv");
                return Ok(payload);
            }
            self.check_alive()?;
            tokio::select! {
                _reader = inbox.reader.lock() => {
                    let bytes = self
                        .channel
                        .recv_bytes_from(party)
                        .await
                        .map_err(|e| self.fail(tag, ErrorKind::RecvError(format!("{e:?}"))))?;
                    let frame: Frame = bincode::deserialize(&bytes)
                        .map_err(|e| self.fail(tag, ErrorKind::SerdeError(format!("{e:?}"))))?;
                    inbox.put(frame.tag, frame.payload);
                    inbox.arrived.notify_waiters();
                }
                _ = &mut arrived => {}
            }
        }
    }

    /// Serializes and sends a message to `party`.
    pub async fn send_to(
        &self,
        party: usize,
        tag: &str,
        msg: &impl Serialize,
    ) -> Result<(), Error> {
        let bytes = bincode::serialize(msg)
            .map_err(|e| self.fail(tag, ErrorKind::SerdeError(format!("{e:?}"))))?;
        self.send(party, tag, bytes).await
    }

    /// Receives and deserializes a message from `party`.
    pub async fn recv_from<T: DeserializeOwned>(
        &self,
        party: usize,
        tag: &str,
    ) -> Result<T, Error> {
        let bytes = self.recv(party, tag).await?;
        bincode::deserialize(&bytes)
            .map_err(|e| self.fail(tag, ErrorKind::SerdeError(format!("{e:?}"))))
    }

    /// Receives and deserializes a Vec from `party` (while checking the length).
    pub async fn recv_vec_from<T: DeserializeOwned>(
        &self,
        party: usize,
        tag: &str,
        len: usize,
    ) -> Result<Vec<T>, Error> {
        let v: Vec<T> = self.recv_from(party, tag).await?;
        if v.len() == len {
            Ok(v)
        } else {
            Err(self.fail(tag, ErrorKind::InvalidLength))
        }
    }

    /// Sends a ring value to `party`, using `K/8` bytes per element.
    pub async fn send_array(&self, party: usize, tag: &str, value: &ArrayRef) -> Result<(), Error> {
        self.send(party, tag, value.to_bytes()).await
    }

    /// Receives a ring value of `len` elements of `field` from `party`.
    pub async fn recv_array(
        &self,
        party: usize,
        tag: &str,
        field: Field,
        len: usize,
    ) -> Result<ArrayRef, Error> {
        let bytes = self.recv(party, tag).await?;
        ArrayRef::from_bytes(field, len, &bytes)
            .ok_or_else(|| self.fail(tag, ErrorKind::InvalidLength))
    }

    /// Distributes `inputs[p]` from `root` to every party `p`; every party returns its own buffer.
    ///
    /// Only the root's `inputs` are read; it must hold exactly one buffer per party.
    pub async fn scatter(
        &self,
        root: usize,
        inputs: Vec<Vec<u8>>,
        tag: &str,
    ) -> Result<Vec<u8>, Error> {
        self.check_alive()?;
        if root >= self.world_size {
            return Err(Error::InvalidOperand {
                op: tag.to_string(),
                reason: format!("root {root} is out of range"),
            });
        }
        if self.rank != root {
            return self.recv(root, tag).await;
        }
        if inputs.len() != self.world_size {
            return Err(Error::LengthMismatch {
                op: format!("scatter {tag}"),
                lhs: self.world_size,
                rhs: inputs.len(),
            });
        }
        let mut own = vec![];
        for (p, input) in inputs.into_iter().enumerate() {
            if p == self.rank {
                own = input;
            } else {
                self.send(p, tag, input).await?;
            }
        }
        Ok(own)
    }

    /// Sends `value` from `root` to all parties; every party returns the root's value.
    pub async fn broadcast(
        &self,
        root: usize,
        value: Vec<u8>,
        tag: &str,
    ) -> Result<Vec<u8>, Error> {
        if self.rank == root {
            for p in self.peers() {
                self.send(p, tag, value.clone()).await?;
            }
            Ok(value)
        } else {
            self.recv(root, tag).await
        }
    }

    /// Collects every party's `value` at `root`, ordered by rank. Other parties get `None`.
    pub async fn gather(
        &self,
        root: usize,
        value: Vec<u8>,
        tag: &str,
    ) -> Result<Option<Vec<Vec<u8>>>, Error> {
        if self.rank != root {
            self.send(root, tag, value).await?;
            return Ok(None);
        }
        let mut values = Vec::with_capacity(self.world_size);
        for p in 0..self.world_size {
            if p == self.rank {
                values.push(value.clone());
            } else {
                values.push(self.recv(p, tag).await?);
            }
        }
        Ok(Some(values))
    }

    /// Exchanges `value` with all parties in one round, returning every party's value by rank.
    pub async fn all_gather(&self, value: Vec<u8>, tag: &str) -> Result<Vec<Vec<u8>>, Error> {
        for p in self.peers() {
            self.send(p, tag, value.clone()).await?;
        }
        let mut values = Vec::with_capacity(self.world_size);
        for p in 0..self.world_size {
            if p == self.rank {
                values.push(value.clone());
            } else {
                values.push(self.recv(p, tag).await?);
            }
        }
        Ok(values)
    }

    /// Exchanges a ring value with all parties in one round, returning every party's value.
    pub async fn all_gather_array(
        &self,
        value: &ArrayRef,
        tag: &str,
    ) -> Result<Vec<ArrayRef>, Error> {
        let field = value.field();
        let len = value.len();
        self.all_gather(value.to_bytes(), tag)
            .await?
            .into_iter()
            .map(|bytes| {
                ArrayRef::from_bytes(field, len, &bytes)
                    .ok_or_else(|| self.fail(tag, ErrorKind::InvalidLength))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::try_join_all;

    use super::*;
    use crate::channel::SimpleChannel;

    fn links(n: usize) -> Vec<Arc<Link<SimpleChannel>>> {
        SimpleChannel::channels(n)
            .into_iter()
            .enumerate()
            .map(|(rank, c)| Arc::new(Link::new(c, rank, n).unwrap()))
            .collect()
    }

    #[test]
    fn invalid_party_sets_are_rejected() {
        let mut channels = SimpleChannel::channels(2);
        let c = channels.pop().unwrap();
        assert!(matches!(
            Link::new(c, 2, 2),
            Err(ConfigError::InvalidRank { rank: 2, .. })
        ));
        let c = channels.pop().unwrap();
        assert!(matches!(Link::new(c, 0, 1), Err(ConfigError::TooFewParties(1))));
    }

    #[tokio::test]
    async fn tags_keep_interleaved_messages_apart() {
        let links = links(2);
        links[0].send(1, "a", vec![1]).await.unwrap();
        links[0].send(1, "b", vec![2]).await.unwrap();
        links[0].send(1, "a", vec![3]).await.unwrap();
        assert_eq!(links[1].recv(0, "b").await.unwrap(), vec![2]);
        assert_eq!(links[1].recv(0, "a").await.unwrap(), vec![1]);
        assert_eq!(links[1].recv(0, "a").await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn concurrent_receivers_do_not_block_each_other() {
        let links = links(2);
        let (l0, l1) = (links[0].clone(), links[1].clone());
        // party 1 waits for "x" first, which party 0 only sends after it got "y"
        let waiting_x = tokio::spawn(async move { l1.recv(0, "x").await });
        let l1 = links[1].clone();
        let waiting_y = tokio::spawn(async move {
            let y = l1.recv(0, "y").await?;
            l1.send(0, "ack", y).await
        });
        l0.send(1, "y", vec![7]).await.unwrap();
        assert_eq!(l0.recv(1, "ack").await.unwrap(), vec![7]);
        l0.send(1, "x", vec![8]).await.unwrap();
        waiting_y.await.unwrap().unwrap();
        assert_eq!(waiting_x.await.unwrap().unwrap(), vec![8]);
    }

    #[tokio::test]
    async fn collectives() {
        let n = 3;
        let links = links(n);
        let results = try_join_all(links.iter().map(|link| async move {
            let rank = link.rank();
            let inputs = if rank == 1 {
                (0..n).map(|p| vec![p as u8 * 10]).collect()
            } else {
                vec![]
            };
            let scattered = link.scatter(1, inputs, "scatter").await?;
            let bcast = link.broadcast(2, vec![rank as u8], "bcast").await?;
            let gathered = link.gather(0, vec![rank as u8], "gather").await?;
            let all = link.all_gather(vec![rank as u8 + 100], "all").await?;
            Ok::<_, Error>((scattered, bcast, gathered, all))
        }))
        .await
        .unwrap();
        for (rank, (scattered, bcast, gathered, all)) in results.into_iter().enumerate() {
            assert_eq!(scattered, vec![rank as u8 * 10]);
            assert_eq!(bcast, vec![2]);
            if rank == 0 {
                assert_eq!(gathered, Some(vec![vec![0], vec![1], vec![2]]));
            } else {
                assert_eq!(gathered, None);
            }
            assert_eq!(all, vec![vec![100], vec![101], vec![102]]);
        }
        // 3 parties each send 2 all-gather messages of 1 byte
        assert!(links.iter().all(|l| l.stats().bytes_sent >= 2));
    }

    #[tokio::test]
    async fn failures_latch_an_abort() {
        let links = links(2);
        links[1].channel.disconnect(0).await;
        let err = links[1].recv(0, "x").await.unwrap_err();
        assert!(err.is_session_failure());
        assert!(links[1].is_aborted());
        assert!(matches!(
            links[1].send(0, "y", vec![]).await,
            Err(Error::SessionAborted)
        ));
    }

    #[tokio::test]
    async fn malformed_arrays_are_rejected() {
        let links = links(2);
        links[0].send(1, "arr", vec![1, 2, 3]).await.unwrap();
        let err = links[1]
            .recv_array(0, "arr", Field::Ring16, 2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Channel(channel::Error {
                reason: ErrorKind::InvalidLength,
                ..
            })
        ));
    }
}
