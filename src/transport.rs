//! Datagram exchange with the remote peer.
//!
//! The engine talks to the network only through [`Transport`], so tests can
//! drive it with a scripted peer. [`UdpTransport`] is the real thing.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::packet::{ErrorCode, TftpPacket};
use crate::MAX_PACKET_SIZE;

#[derive(Debug, Error)]
pub enum RecvError {
    #[error("timed out waiting for a datagram")]
    TimedOut,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A datagram channel bound to one peer for the lifetime of a session.
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Waits at most `wait` for the next datagram from the peer.
    fn recv_timeout(
        &mut self,
        wait: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, RecvError>> + Send;
}

/// UDP transport that follows the server's transfer identifier.
///
/// Requests go to the server's well-known port. The server answers from a
/// fresh port, and the first datagram from the server's host fixes that
/// address as the peer. Datagrams from anywhere else are refused with
/// "Unknown transfer ID" and do not count as a reply.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    server: SocketAddr,
    peer: Option<SocketAddr>,
}

impl UdpTransport {
    /// Binds an ephemeral local port of the same family as `server`.
    pub async fn bind(server: SocketAddr) -> io::Result<Self> {
        let local = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        debug!(local = %socket.local_addr()?, %server, "bound transport");
        Ok(Self {
            socket,
            server,
            peer: None,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Where the next datagram goes: the latched peer, or the server's request port.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer.unwrap_or(self.server)
    }

    fn accepts(&mut self, from: SocketAddr) -> bool {
        match self.peer {
            Some(peer) => peer == from,
            None if from.ip() == self.server.ip() => {
                debug!(peer = %from, "latched server transfer id");
                self.peer = Some(from);
                true
            }
            None => false,
        }
    }

    async fn reject(&self, from: SocketAddr) {
        warn!(%from, "discarding datagram from unknown transfer id");
        let notice = TftpPacket::error(
            ErrorCode::UnknownTransferId,
            ErrorCode::UnknownTransferId.description(),
        );
        if let Ok(bytes) = notice.serialize() {
            if let Err(e) = self.socket.send_to(&bytes, from).await {
                debug!(%from, "failed to refuse stray datagram: {e}");
            }
        }
    }
}

impl Transport for UdpTransport {
    async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.socket.send_to(bytes, self.peer_addr()).await?;
        Ok(())
    }

    async fn recv_timeout(&mut self, wait: Duration) -> Result<Vec<u8>, RecvError> {
        let deadline = Instant::now() + wait;
        // one spare byte so an oversized datagram stays oversized instead of
        // being cut down to a full-looking block
        let mut buf = [0u8; MAX_PACKET_SIZE + 1];
        loop {
            let Ok(res) = timeout_at(deadline, self.socket.recv_from(&mut buf)).await else {
                return Err(RecvError::TimedOut);
            };
            let (n, from) = res?;
            if self.accepts(from) {
                return Ok(buf[..n].to_vec());
            }
            self.reject(from).await;
        }
    }
}
