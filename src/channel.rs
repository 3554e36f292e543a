//! A communication channel used to send/receive raw messages to/from other parties.
//!
//! The [`Channel`] trait is the only thing a transport has to implement. Everything protocol
//! related (tags, collectives, abort handling) lives in [`crate::link`].

use std::{fmt, future::Future, time::Duration};

use tokio::{
    sync::{
        Mutex,
        mpsc::{Receiver, Sender, channel},
    },
    time::timeout,
};

pub mod encrypted;

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug, thiserror::Error)]
#[error("{reason} (during {phase})")]
pub struct Error {
    /// The protocol phase (message tag) during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    #[error("receive failed: {0}")]
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    #[error("send failed: {0}")]
    SendError(String),
    /// The message could not be (de-)serialized.
    #[error("malformed message: {0}")]
    SerdeError(String),
    /// The message does not have the expected length.
    #[error("message has an unexpected length")]
    InvalidLength,
    /// A message could not be authenticated or decrypted.
    #[error("message authentication failed: {0}")]
    CryptoError(String),
}

/// A communication channel used to send/receive messages to/from another party.
///
/// Implementations must deliver the messages between any two parties in order. Sending to or
/// receiving from the own party index is never requested.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given index (must be between `0..participants`).
    fn send_bytes_to(
        &self,
        party: usize,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a response from the party with the given index (must be between `0..participants`).
    fn recv_bytes_from(
        &self,
        party: usize,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// How long a [`SimpleChannel`] waits for a message before giving up.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// An in-memory channel using tokio's [`Sender`] and [`Receiver`], for simulations and tests.
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Mutex<Option<Sender<Vec<u8>>>>>,
    r: Vec<Mutex<Option<Receiver<Vec<u8>>>>>,
    recv_timeout: Duration,
}

impl SimpleChannel {
    /// Creates channels for N parties to communicate with each other.
    pub fn channels(parties: usize) -> Vec<Self> {
        Self::channels_with_timeout(parties, DEFAULT_RECV_TIMEOUT)
    }

    /// Like [`SimpleChannel::channels`], but receives fail after `recv_timeout`.
    pub fn channels_with_timeout(parties: usize, recv_timeout: Duration) -> Vec<Self> {
        let buffer_capacity = 1024;
        let mut senders: Vec<Vec<Option<Sender<Vec<u8>>>>> = vec![vec![]; parties];
        let mut receivers: Vec<Vec<Option<Receiver<Vec<u8>>>>> = (0..parties)
            .map(|_| (0..parties).map(|_| None).collect())
            .collect();
        for s in senders.iter_mut() {
            s.resize(parties, None);
        }
        for a in 0..parties {
            for b in 0..parties {
                if a == b {
                    continue;
                }
                let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
                senders[a][b] = Some(send_a_to_b);
                receivers[b][a] = Some(recv_a_to_b);
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .map(|(s, r)| SimpleChannel {
                s: s.into_iter().map(Mutex::new).collect(),
                r: r.into_iter().map(Mutex::new).collect(),
                recv_timeout,
            })
            .collect()
    }

    /// Drops both directions of the connection to `party`, as if the peer disconnected.
    pub async fn disconnect(&self, party: usize) {
        if let Some(s) = self.s.get(party) {
            s.lock().await.take();
        }
        if let Some(r) = self.r.get(party) {
            r.lock().await.take();
        }
    }
}

/// The error raised by `send` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncSendError {
    /// There is no (longer a) connection to the party.
    Disconnected(usize),
}

/// The error raised by `recv` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncRecvError {
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
}

impl Channel for SimpleChannel {
    type SendError = AsyncSendError;
    type RecvError = AsyncRecvError;

    async fn send_bytes_to(&self, p: usize, msg: Vec<u8>) -> Result<(), AsyncSendError> {
        let sender = match self.s.get(p) {
            Some(s) => s.lock().await.clone(),
            None => None,
        };
        let Some(sender) = sender else {
            return Err(AsyncSendError::Disconnected(p));
        };
        sender
            .send(msg)
            .await
            .map_err(|_| AsyncSendError::Disconnected(p))
    }

    async fn recv_bytes_from(&self, p: usize) -> Result<Vec<u8>, AsyncRecvError> {
        let Some(r) = self.r.get(p) else {
            return Err(AsyncRecvError::Closed);
        };
        let mut r = r.lock().await;
        let Some(r) = r.as_mut() else {
            return Err(AsyncRecvError::Closed);
        };
        match timeout(self.recv_timeout, r.recv()).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let [a, b]: [SimpleChannel; 2] = SimpleChannel::channels(2).try_into().unwrap();
        a.send_bytes_to(1, vec![1]).await.unwrap();
        a.send_bytes_to(1, vec![2, 3]).await.unwrap();
        assert_eq!(b.recv_bytes_from(0).await.unwrap(), vec![1]);
        assert_eq!(b.recv_bytes_from(0).await.unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn disconnect_is_observed_by_both_sides() {
        let [a, b]: [SimpleChannel; 2] = SimpleChannel::channels(2).try_into().unwrap();
        a.disconnect(1).await;
        assert!(matches!(
            a.send_bytes_to(1, vec![0]).await,
            Err(AsyncSendError::Disconnected(1))
        ));
        assert!(matches!(
            b.recv_bytes_from(0).await,
            Err(AsyncRecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn recv_times_out() {
        let [_a, b]: [SimpleChannel; 2] =
            SimpleChannel::channels_with_timeout(2, Duration::from_millis(20))
                .try_into()
                .unwrap();
        assert!(matches!(
            b.recv_bytes_from(0).await,
            Err(AsyncRecvError::TimeoutElapsed)
        ));
    }
}
