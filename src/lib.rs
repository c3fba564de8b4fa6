mod cli;
mod engine;
mod error;
mod file;
mod packet;
mod session;
mod transport;

use std::time::Duration;

pub use crate::cli::Cli;
pub use crate::engine::{Engine, State, Summary};
pub use crate::error::TransferError;
pub use crate::file::LocalFile;
pub use crate::packet::{DecodeError, EncodeError, ErrorCode, Mode, TftpPacket, UnknownMode};
pub use crate::session::{connect, Config, Role, Session};
pub use crate::transport::{RecvError, Transport, UdpTransport};

pub const BLOCK_SIZE: usize = 512; // RFC 1350
pub const MAX_PACKET_SIZE: usize = 4 + BLOCK_SIZE;

pub const DEFAULT_PORT: u16 = 69;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
pub const MAX_RETRY_COUNT: u8 = 3;

/// Runs `session` to completion over `transport`.
pub async fn transfer<T: Transport>(
    session: &mut Session,
    transport: &mut T,
) -> Result<Summary, TransferError> {
    Engine::new(session, transport).run().await
}
