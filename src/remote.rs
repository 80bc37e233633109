//! The seam between the filesystem core and the SSH client it drives.
//!
//! Everything the core needs from a remote-shell session is expressed by the
//! three traits in this module, so that the adapter logic never touches a
//! concrete client type. The `russh` backend lives in
//! [`impl_russh`](crate::impl_russh); an in-memory backend used by the tests
//! lives in [`memory`](crate::memory).

use std::{io, sync::Arc};

use async_trait::async_trait;
use bitflags::bitflags;
use nix::errno::Errno;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncWrite, AsyncWriteExt};

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Callback receiving `(bytes_so_far, total_bytes)` during whole-file transfers.
pub type Progress<'a> = &'a mut (dyn FnMut(u64, u64) + Send);

/// Chunk size used by the whole-file transfer primitives.
pub const TRANSFER_CHUNK_SIZE: usize = 32 * 1024;

/// Errors raised by a transport backend, before translation.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// A protocol status that carries a POSIX errno.
    #[error("{message} (errno {errno})")]
    Os { errno: i32, message: String },
    /// A protocol status without any usable errno.
    #[error("{0}")]
    Failure(String),
    /// The remote side closed the stream unexpectedly.
    #[error("unexpected end of stream")]
    Eof,
    #[error("timed out")]
    Timeout,
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// Failures of the encrypted session itself.
    #[error("ssh: {0}")]
    Ssh(String),
    #[error("socket: {0}")]
    Socket(String),
    /// The local byte source or sink of a transfer failed.
    #[error("local stream: {0}")]
    Local(String),
}

impl RemoteError {
    pub fn errno(errno: Errno) -> Self {
        Self::Os {
            errno: errno as i32,
            message: errno.desc().to_owned(),
        }
    }

    /// Returns `true` when the error comes from the transport rather than from
    /// the remote filesystem.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Eof | Self::Timeout | Self::ConnectionLost(_) | Self::Ssh(_) | Self::Socket(_)
        )
    }
}

impl From<io::Error> for RemoteError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut => Self::Timeout,
            io::ErrorKind::UnexpectedEof => Self::Eof,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected => Self::Socket(error.to_string()),
            _ => match error.raw_os_error() {
                Some(errno) => Self::Os {
                    errno,
                    message: error.to_string(),
                },
                None => Self::Failure(error.to_string()),
            },
        }
    }
}

bitflags! {
    /// Open flags, using the SFTP wire values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const READ = 0x0000_0001;
        const WRITE = 0x0000_0002;
        const APPEND = 0x0000_0004;
        const CREATE = 0x0000_0008;
        const TRUNCATE = 0x0000_0010;
        const EXCLUDE = 0x0000_0020;
    }
}

/// Raw stat record returned by a transport, all fields optional since the
/// protocol lets servers omit any of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteStat {
    pub size: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: Option<u32>,
    pub atime: Option<u32>,
    pub mtime: Option<u32>,
    pub ctime: Option<u32>,
    pub birthtime: Option<u32>,
    pub user: Option<String>,
    pub group: Option<String>,
}

pub const S_IFMT: u32 = 0o170_000;
pub const S_IFSOCK: u32 = 0o140_000;
pub const S_IFLNK: u32 = 0o120_000;
pub const S_IFREG: u32 = 0o100_000;
pub const S_IFBLK: u32 = 0o060_000;
pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFCHR: u32 = 0o020_000;
pub const S_IFIFO: u32 = 0o010_000;

impl RemoteStat {
    fn format(&self) -> u32 {
        self.mode.unwrap_or(0) & S_IFMT
    }

    pub fn is_dir(&self) -> bool {
        self.format() == S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.format() == S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.format() == S_IFLNK
    }
}

#[derive(Debug, Clone)]
pub struct RemoteDirEntry {
    pub name: String,
    pub stat: RemoteStat,
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: Option<u32>,
}

/// An open remote file descriptor.
#[async_trait]
pub trait RemoteFile: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {
    /// Stats the open handle.
    async fn stat(&mut self) -> RemoteResult<RemoteStat>;

    /// Sets the file size; the remote call always needs an explicit size.
    async fn set_len(&mut self, size: u64) -> RemoteResult<()>;

    /// Hint that writes may be sent without waiting for each acknowledgement.
    fn set_pipelined(&mut self, pipelined: bool);
}

/// A file-transfer sub-channel opened on a session.
#[async_trait]
pub trait SftpChannel: Send + Sync {
    async fn stat(&self, path: &str) -> RemoteResult<RemoteStat>;

    async fn lstat(&self, path: &str) -> RemoteResult<RemoteStat>;

    async fn read_dir(&self, path: &str) -> RemoteResult<Vec<RemoteDirEntry>>;

    async fn open(&self, path: &str, flags: OpenFlags) -> RemoteResult<Box<dyn RemoteFile>>;

    async fn mkdir(&self, path: &str, mode: u32) -> RemoteResult<()>;

    async fn rmdir(&self, path: &str) -> RemoteResult<()>;

    async fn remove(&self, path: &str) -> RemoteResult<()>;

    async fn rename(&self, old_path: &str, new_path: &str) -> RemoteResult<()>;

    async fn symlink(&self, path: &str, target: &str) -> RemoteResult<()>;

    async fn read_link(&self, path: &str) -> RemoteResult<String>;

    async fn chmod(&self, path: &str, mode: u32) -> RemoteResult<()>;

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> RemoteResult<()>;

    /// Sets `(atime, mtime)`; `None` lets the remote side use the current time.
    async fn utime(&self, path: &str, times: Option<(u32, u32)>) -> RemoteResult<()>;

    async fn close(&self) -> RemoteResult<()>;

    /// Streams `source` into a new remote file at `path`.
    async fn put(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
        total: u64,
        mut progress: Option<Progress<'_>>,
    ) -> RemoteResult<u64> {
        let mut file = self
            .open(path, OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE)
            .await?;
        file.set_pipelined(true);

        let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
        let mut transferred = 0u64;
        loop {
            let read = source.read(&mut buf).await.map_err(local_io)?;
            if read == 0 {
                break;
            }
            file.write_all(&buf[..read]).await?;
            transferred += read as u64;
            if let Some(callback) = progress.as_mut() {
                callback(transferred, total);
            }
        }
        file.shutdown().await?;

        Ok(transferred)
    }

    /// Streams the remote file at `path` into `sink`.
    async fn get(
        &self,
        path: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        mut progress: Option<Progress<'_>>,
    ) -> RemoteResult<u64> {
        let total = self.stat(path).await?.size.unwrap_or(0);
        let mut file = self.open(path, OpenFlags::READ).await?;

        let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
        let mut transferred = 0u64;
        loop {
            let read = file.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            sink.write_all(&buf[..read]).await.map_err(local_io)?;
            transferred += read as u64;
            if let Some(callback) = progress.as_mut() {
                callback(transferred, total);
            }
        }
        sink.flush().await.map_err(local_io)?;
        file.shutdown().await?;

        Ok(transferred)
    }
}

/// An authenticated remote-shell connection.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// The primary transfer sub-channel, shared by metadata operations.
    fn sftp(&self) -> Arc<dyn SftpChannel>;

    /// Opens a fresh, dedicated transfer sub-channel.
    async fn open_sftp(&self) -> RemoteResult<Arc<dyn SftpChannel>>;

    async fn exec(&self, command: &str) -> RemoteResult<CommandOutput>;

    async fn close(&self) -> RemoteResult<()>;
}

fn local_io(error: io::Error) -> RemoteError {
    RemoteError::Local(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        assert!(matches!(
            RemoteError::from(io::Error::from(io::ErrorKind::TimedOut)),
            RemoteError::Timeout
        ));
        assert!(matches!(
            RemoteError::from(io::Error::from(io::ErrorKind::UnexpectedEof)),
            RemoteError::Eof
        ));
        assert!(RemoteError::from(io::Error::from(io::ErrorKind::ConnectionReset)).is_transport());
        assert!(matches!(
            RemoteError::from(io::Error::from_raw_os_error(Errno::ENOENT as i32)),
            RemoteError::Os { errno, .. } if errno == Errno::ENOENT as i32
        ));
    }

    #[test]
    fn stat_type_bits() {
        let dir = RemoteStat {
            mode: Some(S_IFDIR | 0o755),
            ..Default::default()
        };
        assert!(dir.is_dir());
        assert!(!dir.is_file());

        let link = RemoteStat {
            mode: Some(S_IFLNK | 0o777),
            ..Default::default()
        };
        assert!(link.is_symlink());
        assert!(!RemoteStat::default().is_dir());
    }
}
