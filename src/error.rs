//! Terminal outcomes of a transfer.
//!
//! Every variant ends the current transfer. The engine only retries inside
//! its own wait loop, on a plain receive timeout.

use std::io;

use thiserror::Error;

use crate::packet::{DecodeError, EncodeError, ErrorCode, TftpPacket};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to encode packet: {0}")]
    Encode(#[from] EncodeError),

    #[error("received undecodable packet: {0}")]
    Decode(#[from] DecodeError),

    /// Local file or socket failure. Never retried.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// The retry budget ran out without hearing from the peer.
    #[error("timed out after {retries} retransmissions")]
    Timeout { retries: u8 },

    #[error("server error {code}: {msg}")]
    Remote { code: u16, msg: String },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl TransferError {
    /// Builds a `Remote` error, filling in the standard description when the
    /// server sent an empty message.
    pub fn remote(code: u16, msg: String) -> Self {
        let msg = match ErrorCode::from_code(code) {
            Some(known) if msg.is_empty() => known.description().to_string(),
            _ => msg,
        };
        TransferError::Remote { code, msg }
    }

    /// The ERROR packet the peer should be told about before we give up, if any.
    ///
    /// Timeouts and remote errors stay silent: the peer is either gone or
    /// already knows.
    pub(crate) fn notice(&self) -> Option<TftpPacket> {
        match self {
            TransferError::Decode(e) => Some(TftpPacket::error(
                ErrorCode::IllegalOperation,
                e.to_string(),
            )),
            TransferError::ProtocolViolation(msg) => {
                Some(TftpPacket::error(ErrorCode::IllegalOperation, msg.clone()))
            }
            TransferError::Io(e) => Some(TftpPacket::error(ErrorCode::NotDefined, e.to_string())),
            _ => None,
        }
    }
}
