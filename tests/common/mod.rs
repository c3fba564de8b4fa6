#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::AsyncWrite;

use tftp_client::{Config, LocalFile, RecvError, Role, Session, TftpPacket, Transport};

pub const BLOCK: usize = tftp_client::BLOCK_SIZE;

/// In-memory peer that plays back a fixed sequence of replies.
///
/// Each wait consumes one scripted step; once the script runs out every wait
/// times out. Everything the engine sends is recorded.
#[derive(Default)]
pub struct ScriptedPeer {
    script: VecDeque<Option<Vec<u8>>>,
    pub sent: Vec<Vec<u8>>,
    pub waits: usize,
}

impl ScriptedPeer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, packet: TftpPacket) -> Self {
        let bytes = packet.serialize().expect("scripted packet encodes");
        self.script.push_back(Some(bytes));
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.script.push_back(Some(bytes.to_vec()));
        self
    }

    pub fn timeout(mut self) -> Self {
        self.script.push_back(None);
        self
    }

    pub fn sent_packets(&self) -> Vec<TftpPacket> {
        self.sent
            .iter()
            .map(|bytes| TftpPacket::deserialize(bytes).expect("engine sent a decodable packet"))
            .collect()
    }
}

impl Transport for ScriptedPeer {
    async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.sent.push(bytes.to_vec());
        Ok(())
    }

    async fn recv_timeout(&mut self, _wait: Duration) -> Result<Vec<u8>, RecvError> {
        self.waits += 1;
        match self.script.pop_front() {
            Some(Some(bytes)) => Ok(bytes),
            _ => Err(RecvError::TimedOut),
        }
    }
}

/// Sink whose contents stay readable after the session takes ownership.
#[derive(Clone, Default)]
pub struct SharedSink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl SharedSink {
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().unwrap().clone()
    }
}

impl AsyncWrite for SharedSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Sink that refuses every write, like a full disk.
pub struct FailingSink;

impl AsyncWrite for FailingSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "no space left")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

pub fn peer() -> SocketAddr {
    "127.0.0.1:69".parse().unwrap()
}

pub fn config(max_retries: u8) -> Config {
    Config {
        timeout: Duration::from_millis(100),
        max_retries,
        ..Config::default()
    }
}

pub fn download_session(filename: &str, sink: SharedSink, config: Config) -> Session {
    Session::new(Role::Download, LocalFile::sink(sink), peer(), filename, config)
        .expect("valid download session")
}

pub fn upload_session(filename: &str, contents: Vec<u8>, config: Config) -> Session {
    let source = LocalFile::source(io::Cursor::new(contents));
    Session::new(Role::Upload, source, peer(), filename, config).expect("valid upload session")
}

pub fn data(block: u16, len: usize) -> TftpPacket {
    TftpPacket::DATA {
        block,
        data: pattern(block, len),
    }
}

/// Payload bytes that differ per block so misplaced writes show up.
pub fn pattern(block: u16, len: usize) -> Vec<u8> {
    vec![block as u8; len]
}

pub fn rrq(filename: &str) -> TftpPacket {
    TftpPacket::RRQ {
        filename: filename.into(),
        mode: "octet".into(),
    }
}

pub fn wrq(filename: &str) -> TftpPacket {
    TftpPacket::WRQ {
        filename: filename.into(),
        mode: "octet".into(),
    }
}
