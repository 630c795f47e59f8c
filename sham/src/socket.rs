//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`crate::packet::Segment`] instead of raw bytes.  All protocol logic lives
//! elsewhere; this module owns only byte I/O and the bounded-wait receive
//! the protocol loops are built on.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::packet::{Segment, SegmentError, MAX_SEGMENT_LEN};

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The received datagram could not be decoded as a segment.
    #[error("segment decode error: {0}")]
    Segment(#[from] SegmentError),
}

/// An async, segment-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks if needed.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Encode `segment` and send it as a single UDP datagram to `dest`.
    pub async fn send_to(&self, segment: &Segment, dest: SocketAddr) -> Result<(), SocketError> {
        let bytes = segment.encode();
        self.inner.send_to(&bytes, dest).await?;
        Ok(())
    }

    /// Receive the next datagram and decode it into a [`Segment`].
    ///
    /// Returns `(segment, sender_address)`.  Datagrams that fail to decode are
    /// returned as `Err`; the caller decides whether to retry.
    pub async fn recv_from(&self) -> Result<(Segment, SocketAddr), SocketError> {
        let mut buf = [0u8; MAX_SEGMENT_LEN];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        let segment = Segment::decode(&buf[..n])?;
        Ok((segment, addr))
    }

    /// Wait until `deadline` for a well-formed segment.
    ///
    /// Returns `Ok(None)` once the deadline passes.  Malformed datagrams are
    /// discarded and the wait continues against the same deadline.
    pub async fn recv_until(
        &self,
        deadline: Instant,
    ) -> Result<Option<(Segment, SocketAddr)>, SocketError> {
        loop {
            match tokio::time::timeout_at(deadline, self.recv_from()).await {
                Err(_elapsed) => return Ok(None),
                Ok(Ok(received)) => return Ok(Some(received)),
                Ok(Err(SocketError::Segment(e))) => {
                    log::debug!("[socket] discarding datagram: {e}");
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    /// [`Socket::recv_until`] with a relative timeout.
    pub async fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<(Segment, SocketAddr)>, SocketError> {
        self.recv_until(Instant::now() + timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Flags, HEADER_LEN};

    async fn loopback() -> Socket {
        Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn segment_crosses_loopback() {
        let a = loopback().await;
        let b = loopback().await;
        let seg = Segment::control(100, 0, Flags::SYN, 65535);
        a.send_to(&seg, b.local_addr).await.unwrap();

        let (got, from) = b.recv_timeout(Duration::from_secs(2)).await.unwrap().unwrap();
        assert_eq!(got, seg);
        assert_eq!(from, a.local_addr);
    }

    #[tokio::test]
    async fn recv_until_times_out_with_none() {
        let a = loopback().await;
        let got = a.recv_timeout(Duration::from_millis(20)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn malformed_datagram_is_skipped() {
        let a = loopback().await;
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(&[1u8; HEADER_LEN - 1], a.local_addr).await.unwrap();
        let seg = Segment::data(7, 65535, b"ok".to_vec());
        raw.send_to(&seg.encode(), a.local_addr).await.unwrap();

        let (got, _) = a.recv_timeout(Duration::from_secs(2)).await.unwrap().unwrap();
        assert_eq!(got, seg);
    }
}
