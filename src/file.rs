//! The local side of a transfer: a forward-only source for uploads or a
//! sink for downloads.

use std::fmt;
use std::io;
use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub enum LocalFile {
    Source(Box<dyn AsyncRead + Send + Unpin>),
    Sink(Box<dyn AsyncWrite + Send + Unpin>),
}

impl LocalFile {
    pub fn source<R: AsyncRead + Send + Unpin + 'static>(reader: R) -> Self {
        LocalFile::Source(Box::new(reader))
    }

    pub fn sink<W: AsyncWrite + Send + Unpin + 'static>(writer: W) -> Self {
        LocalFile::Sink(Box::new(writer))
    }

    /// Opens `path` for reading.
    pub async fn open_source(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self::source(file))
    }

    /// Creates or truncates `path` for writing.
    pub async fn create_sink(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        Ok(Self::sink(file))
    }

    pub fn is_source(&self) -> bool {
        matches!(self, LocalFile::Source(_))
    }

    /// Reads the next block; fewer than `buf.len()` bytes only at end of data.
    pub(crate) async fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            LocalFile::Source(reader) => read_up_to(reader, buf).await,
            LocalFile::Sink(_) => Err(wrong_direction("read from")),
        }
    }

    pub(crate) async fn write_block(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            LocalFile::Sink(writer) => writer.write_all(data).await,
            LocalFile::Source(_) => Err(wrong_direction("write to")),
        }
    }

    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        match self {
            LocalFile::Sink(writer) => writer.flush().await,
            LocalFile::Source(_) => Ok(()),
        }
    }
}

fn wrong_direction(op: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot {op} a file opened in the other direction"),
    )
}

impl fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalFile::Source(_) => f.write_str("LocalFile::Source"),
            LocalFile::Sink(_) => f.write_str("LocalFile::Sink"),
        }
    }
}

// A single `read` may come up short long before the reader is exhausted.
async fn read_up_to<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
