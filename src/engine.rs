//! Lockstep transfer state machine.
//!
//! ```text
//! Idle -> RequestSent -> AwaitingData (download) -> Done
//!                     -> AwaitingAck  (upload)   -> Done
//! any state -> Failed
//! ```
//!
//! Exactly one packet is outstanding at a time. Retransmission always replays
//! the stored bytes of the last packet sent; the local source is never read
//! twice for the same block. Block numbers are compared for equality only, so
//! the 65535 -> 0 wrap needs no special casing.

use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::error::TransferError;
use crate::packet::TftpPacket;
use crate::session::{Role, Session};
use crate::transport::{RecvError, Transport};
use crate::BLOCK_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    RequestSent,
    AwaitingData,
    AwaitingAck,
    Done,
    Failed,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done | State::Failed)
    }
}

/// What a finished transfer moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// File bytes written (download) or sent and acknowledged (upload).
    pub bytes: u64,
    pub blocks: u32,
    pub retransmissions: u32,
    pub elapsed: Duration,
}

pub struct Engine<'a, T> {
    session: &'a mut Session,
    transport: &'a mut T,
    bytes: u64,
    blocks: u32,
    retransmissions: u32,
}

impl<'a, T: Transport> Engine<'a, T> {
    pub fn new(session: &'a mut Session, transport: &'a mut T) -> Self {
        Self {
            session,
            transport,
            bytes: 0,
            blocks: 0,
            retransmissions: 0,
        }
    }

    /// Drives the session from `Idle` to `Done` or `Failed`.
    pub async fn run(mut self) -> Result<Summary, TransferError> {
        if self.session.state != State::Idle {
            return Err(TransferError::Config(format!(
                "session is {:?}, not Idle",
                self.session.state
            )));
        }

        let start = Instant::now();
        match self.drive().await {
            Ok(()) => {
                self.transition(State::Done);
                let summary = Summary {
                    bytes: self.bytes,
                    blocks: self.blocks,
                    retransmissions: self.retransmissions,
                    elapsed: start.elapsed(),
                };
                info!(
                    role = %self.session.role(),
                    bytes = summary.bytes,
                    blocks = summary.blocks,
                    retransmissions = summary.retransmissions,
                    "transfer complete"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Some(notice) = e.notice() {
                    self.notify(notice).await;
                }
                self.transition(State::Failed);
                warn!(role = %self.session.role(), "transfer failed: {e}");
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<(), TransferError> {
        self.send_request().await?;

        loop {
            let bytes = match self.transport.recv_timeout(self.session.config.timeout).await {
                Ok(bytes) => bytes,
                Err(RecvError::TimedOut) => {
                    self.on_timeout().await?;
                    continue;
                }
                Err(RecvError::Io(e)) => return Err(e.into()),
            };

            let packet = TftpPacket::deserialize(&bytes)?;
            debug!(%packet, "received");

            let finished = match (self.session.state, packet) {
                (_, TftpPacket::ERROR { code, msg }) => {
                    return Err(TransferError::remote(code, msg));
                }
                (State::AwaitingData, TftpPacket::DATA { block, data }) => {
                    self.on_data(block, data).await?
                }
                (State::AwaitingAck, TftpPacket::ACK(block)) => self.on_ack(block).await?,
                (state, packet) => {
                    return Err(TransferError::ProtocolViolation(format!(
                        "unexpected {packet} while {state:?}"
                    )));
                }
            };
            if finished {
                return Ok(());
            }
        }
    }

    async fn send_request(&mut self) -> Result<(), TransferError> {
        let request = self.session.request();
        self.send(request).await?;
        self.transition(State::RequestSent);

        let next = match self.session.role() {
            Role::Download => State::AwaitingData,
            Role::Upload => State::AwaitingAck,
        };
        self.transition(next);
        Ok(())
    }

    /// Download step. Returns `true` once the terminal block is acknowledged.
    async fn on_data(&mut self, block: u16, data: Vec<u8>) -> Result<bool, TransferError> {
        self.session.retries = 0;

        if data.len() > BLOCK_SIZE {
            return Err(TransferError::ProtocolViolation(format!(
                "data block #{block} carries {} bytes",
                data.len()
            )));
        }

        let expected = self.session.block.wrapping_add(1);
        if block != expected {
            warn!(block, expected, "out-of-sequence data, resending last packet");
            self.resend().await?;
            return Ok(false);
        }

        self.session.file.write_block(&data).await?;
        self.bytes += data.len() as u64;
        self.blocks += 1;
        self.session.block = block;
        self.send(TftpPacket::ACK(block)).await?;

        if data.len() < BLOCK_SIZE {
            self.session.file.flush().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Upload step. Returns `true` once the terminal block is acknowledged.
    async fn on_ack(&mut self, block: u16) -> Result<bool, TransferError> {
        // an ack for a block not yet sent is answered the same way as a stale one
        if block != self.session.block {
            warn!(
                block,
                expected = self.session.block,
                "duplicate ack, resending last packet"
            );
            self.resend().await?;
            return Ok(false);
        }

        self.session.retries = 0;
        if let Some(len) = self.session.last_data_len {
            self.bytes += len as u64;
            self.blocks += 1;
            if len < BLOCK_SIZE {
                return Ok(true);
            }
        }

        let mut buf = vec![0u8; BLOCK_SIZE];
        let n = self.session.file.read_block(&mut buf).await?;
        buf.truncate(n);

        let next = self.session.block.wrapping_add(1);
        self.send(TftpPacket::DATA {
            block: next,
            data: buf,
        })
        .await?;
        self.session.block = next;
        self.session.last_data_len = Some(n);
        Ok(false)
    }

    async fn on_timeout(&mut self) -> Result<(), TransferError> {
        let max_retries = self.session.config.max_retries;
        if self.session.retries >= max_retries {
            return Err(TransferError::Timeout {
                retries: self.session.retries,
            });
        }

        self.session.retries += 1;
        warn!(
            attempt = self.session.retries,
            max_retries,
            block = self.session.block,
            "timeout, resending last packet"
        );
        self.resend().await
    }

    async fn send(&mut self, packet: TftpPacket) -> Result<(), TransferError> {
        let bytes = packet.serialize()?;
        self.transport.send(&bytes).await?;
        debug!(%packet, "sent");
        self.session.last_sent = bytes;
        Ok(())
    }

    async fn resend(&mut self) -> Result<(), TransferError> {
        self.transport.send(&self.session.last_sent).await?;
        self.retransmissions += 1;
        Ok(())
    }

    // Best effort: the transfer is already lost, so a failed send is only logged.
    async fn notify(&mut self, notice: TftpPacket) {
        match notice.serialize() {
            Ok(bytes) => {
                if let Err(e) = self.transport.send(&bytes).await {
                    debug!("could not send {notice} to peer: {e}");
                }
            }
            Err(e) => debug!("could not encode {notice}: {e}"),
        }
    }

    fn transition(&mut self, next: State) {
        trace!(from = ?self.session.state, to = ?next, "state");
        self.session.state = next;
    }
}
