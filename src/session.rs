use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::lookup_host;
use tracing::{debug, info};

use crate::engine::State;
use crate::error::TransferError;
use crate::file::LocalFile;
use crate::packet::{Mode, TftpPacket};
use crate::transport::UdpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Fetch a remote file (RRQ).
    Download,
    /// Send a local file (WRQ).
    Upload,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Download => f.write_str("download"),
            Role::Upload => f.write_str("upload"),
        }
    }
}

/// Per-session settings. Nothing here is process-wide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    /// How long to wait for each reply before retransmitting.
    pub timeout: Duration,
    /// Retransmissions allowed in a row before giving up.
    pub max_retries: u8,
    pub mode: Mode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            timeout: crate::DEFAULT_TIMEOUT,
            max_retries: crate::MAX_RETRY_COUNT,
            mode: Mode::Octet,
        }
    }
}

/// State of one transfer. Only the engine mutates it.
#[derive(Debug)]
pub struct Session {
    role: Role,
    pub(crate) file: LocalFile,
    peer: SocketAddr,
    filename: String,
    pub(crate) config: Config,
    /// Last data block sent (upload) or acknowledged (download).
    pub(crate) block: u16,
    /// Exact bytes of the last packet sent, replayed on retransmission.
    pub(crate) last_sent: Vec<u8>,
    /// Payload size of the last data block sent; `None` until one is.
    pub(crate) last_data_len: Option<usize>,
    pub(crate) retries: u8,
    pub(crate) state: State,
}

impl Session {
    /// Fails with [`TransferError::Config`] unless a download writes to a
    /// sink and an upload reads from a source.
    pub fn new(
        role: Role,
        file: LocalFile,
        peer: SocketAddr,
        filename: impl Into<String>,
        config: Config,
    ) -> Result<Self, TransferError> {
        match (role, file.is_source()) {
            (Role::Download, true) => {
                return Err(TransferError::Config(
                    "a download needs a local file opened for writing".into(),
                ))
            }
            (Role::Upload, false) => {
                return Err(TransferError::Config(
                    "an upload needs a local file opened for reading".into(),
                ))
            }
            _ => (),
        }

        let filename = filename.into();
        if filename.is_empty() {
            return Err(TransferError::Config("empty filename".into()));
        }
        if config.timeout.is_zero() {
            return Err(TransferError::Config("timeout must be non-zero".into()));
        }

        Ok(Self {
            role,
            file,
            peer,
            filename,
            config,
            block: 0,
            last_sent: Vec::new(),
            last_data_len: None,
            retries: 0,
            state: State::Idle,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The opening request for this session.
    pub fn request(&self) -> TftpPacket {
        let filename = self.filename.clone();
        let mode = self.config.mode.to_string();
        match self.role {
            Role::Download => TftpPacket::RRQ { filename, mode },
            Role::Upload => TftpPacket::WRQ { filename, mode },
        }
    }
}

/// Resolves `host`, binds a socket and opens `filename` for the given role.
///
/// The local file is opened last so that a download does not truncate an
/// existing file when the host cannot be reached.
pub async fn connect(
    role: Role,
    filename: &str,
    host: &str,
    config: Config,
) -> Result<(Session, UdpTransport), TransferError> {
    let peer = resolve(host, config.port).await?;
    let transport = UdpTransport::bind(peer).await?;

    let file = match role {
        Role::Download => LocalFile::create_sink(filename).await?,
        Role::Upload => LocalFile::open_source(filename).await?,
    };
    let session = Session::new(role, file, peer, filename, config)?;
    info!(%role, filename, %peer, mode = %session.config.mode, "session ready");
    Ok((session, transport))
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransferError> {
    let mut addrs = lookup_host((host, port)).await?;
    let addr = addrs
        .next()
        .ok_or_else(|| TransferError::Config(format!("no address found for {host}")))?;
    debug!(host, %addr, "resolved");
    Ok(addr)
}
