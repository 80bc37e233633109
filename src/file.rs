//! Binary file handles returned by `openbin`.
//!
//! [`SshFile`] offers a Python-style stream API (`read(None)` reads to the
//! end, `truncate(None)` truncates at the current position) on top of the
//! tokio I/O traits, which it also implements. The inherent methods shadow
//! the `AsyncReadExt`/`AsyncWriteExt`/`AsyncSeekExt` ones of the same name;
//! call those through the trait when needed.

use std::{
    io::{self, Cursor, SeekFrom},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use log::debug;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt, ReadBuf,
};

use crate::{
    convert::{convert, ErrorContext},
    error::{FsError, Result},
    mode::Mode,
    remote::{RemoteError, RemoteFile, SftpChannel},
};

const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Reference point of a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start = 0,
    Current = 1,
    End = 2,
}

impl TryFrom<i32> for Whence {
    type Error = FsError;

    fn try_from(whence: i32) -> Result<Whence> {
        match whence {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            other => Err(FsError::InvalidArgument(format!(
                "invalid whence ({other}, should be 0, 1 or 2)"
            ))),
        }
    }
}

/// Options accepted by `openbin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// Chunk size used by line reads; `None` uses the default.
    pub buffering: Option<usize>,
    /// Send writes without waiting for each acknowledgement.
    pub pipelined: bool,
    /// Fetch the whole file up front when opened for reading only.
    pub prefetch: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            buffering: None,
            pipelined: true,
            prefetch: false,
        }
    }
}

impl OpenOptions {
    pub fn new() -> OpenOptions {
        OpenOptions::default()
    }

    pub fn buffering(&mut self, buffering: usize) -> &mut Self {
        self.buffering = Some(buffering);
        self
    }

    pub fn pipelined(&mut self, pipelined: bool) -> &mut Self {
        self.pipelined = pipelined;
        self
    }

    pub fn prefetch(&mut self, prefetch: bool) -> &mut Self {
        self.prefetch = prefetch;
        self
    }
}

/// An open remote file.
///
/// Owns the dedicated transfer channel it was opened on; closing the file
/// closes that channel.
pub struct SshFile {
    inner: Box<dyn RemoteFile>,
    channel: Arc<dyn SftpChannel>,
    prefetched: Option<Cursor<Bytes>>,
    path: String,
    endpoint: Arc<str>,
    mode: Mode,
    chunk_size: usize,
    closed: bool,
}

impl SshFile {
    pub(crate) async fn new(
        mut inner: Box<dyn RemoteFile>,
        channel: Arc<dyn SftpChannel>,
        path: String,
        endpoint: Arc<str>,
        mode: Mode,
        options: &OpenOptions,
    ) -> Result<SshFile> {
        inner.set_pipelined(options.pipelined);
        let mut file = SshFile {
            inner,
            channel,
            prefetched: None,
            path,
            endpoint,
            mode,
            chunk_size: options.buffering.filter(|size| *size > 1).unwrap_or(DEFAULT_CHUNK_SIZE),
            closed: false,
        };
        if options.prefetch && file.mode.reading() && !file.mode.writing() {
            debug!("prefetching {}", file.path);
            let mut content = Vec::new();
            let result = file.inner.read_to_end(&mut content).await;
            file.check_io("prefetch", result)?;
            file.prefetched = Some(Cursor::new(Bytes::from(content)));
        }
        Ok(file)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn readable(&self) -> bool {
        self.mode.reading()
    }

    pub fn writable(&self) -> bool {
        self.mode.writing()
    }

    pub fn seekable(&self) -> bool {
        true
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self, op: &str) -> Result<()> {
        if self.closed {
            return Err(FsError::OperationFailed {
                op: op.to_owned(),
                path: self.path.clone(),
                message: "I/O operation on closed file".to_owned(),
            });
        }
        Ok(())
    }

    fn check_io<T>(&self, op: &str, result: io::Result<T>) -> Result<T> {
        result.map_err(|error| {
            convert(
                ErrorContext::file(op, &self.path, &self.endpoint),
                RemoteError::from(error),
            )
        })
    }

    /// Moves the cursor; `offset` is relative to `whence`.
    pub async fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.ensure_open("seek")?;
        let target = match whence {
            Whence::Start => SeekFrom::Start(u64::try_from(offset).map_err(|_| {
                FsError::InvalidArgument(format!("negative seek position {offset}"))
            })?),
            Whence::Current => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };
        let result = match self.prefetched.as_mut() {
            Some(cursor) => cursor.seek(target).await,
            None => self.inner.seek(target).await,
        };
        self.check_io("seek", result)
    }

    pub async fn tell(&mut self) -> Result<u64> {
        self.seek(0, Whence::Current).await
    }

    /// Reads up to `size` bytes, or everything left when `size` is `None`.
    pub async fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        self.ensure_open("read")?;
        let mut output = Vec::new();
        let result = match (size, self.prefetched.as_mut()) {
            (None, Some(cursor)) => cursor.read_to_end(&mut output).await,
            (None, None) => self.inner.read_to_end(&mut output).await,
            (Some(size), Some(cursor)) => {
                (&mut *cursor)
                    .take(size as u64)
                    .read_to_end(&mut output)
                    .await
            }
            (Some(size), None) => {
                (&mut self.inner)
                    .take(size as u64)
                    .read_to_end(&mut output)
                    .await
            }
        };
        self.check_io("read", result)?;
        Ok(output)
    }

    /// Reads one line including its `\n`, reading at most `limit` bytes.
    pub async fn readline(&mut self, limit: Option<usize>) -> Result<Vec<u8>> {
        self.ensure_open("readline")?;
        let mut line = Vec::new();
        loop {
            let wanted = match limit {
                Some(limit) if line.len() >= limit => break,
                Some(limit) => self.chunk_size.min(limit - line.len()),
                None => self.chunk_size,
            };
            let chunk = self.read(Some(wanted)).await?;
            if chunk.is_empty() {
                break;
            }
            if let Some(index) = chunk.iter().position(|byte| *byte == b'\n') {
                line.extend_from_slice(&chunk[..=index]);
                let overshoot = (chunk.len() - index - 1) as i64;
                if overshoot > 0 {
                    self.seek(-overshoot, Whence::Current).await?;
                }
                break;
            }
            line.extend_from_slice(&chunk);
        }
        Ok(line)
    }

    /// Reads lines until EOF, or until about `hint` bytes have been read.
    pub async fn readlines(&mut self, hint: Option<usize>) -> Result<Vec<Vec<u8>>> {
        let mut lines = Vec::new();
        let mut total = 0;
        loop {
            let line = self.readline(None).await?;
            if line.is_empty() {
                break;
            }
            total += line.len();
            lines.push(line);
            if hint.is_some_and(|hint| hint > 0 && total >= hint) {
                break;
            }
        }
        Ok(lines)
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_open("write")?;
        if !self.mode.writing() {
            return Err(FsError::Unsupported {
                op: "write".to_owned(),
                path: self.path.clone(),
            });
        }
        let result = self.inner.write_all(data).await;
        self.check_io("write", result)?;
        Ok(data.len())
    }

    pub async fn writelines<I, B>(&mut self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        for line in lines {
            self.write(line.as_ref()).await?;
        }
        Ok(())
    }

    /// Resizes the file to `size`, or to the current position when `None`.
    pub async fn truncate(&mut self, size: Option<u64>) -> Result<u64> {
        self.ensure_open("truncate")?;
        let size = match size {
            Some(size) => size,
            None => self.tell().await?,
        };
        let result = self.inner.set_len(size).await;
        result.map_err(|error| {
            convert(
                ErrorContext::file("truncate", &self.path, &self.endpoint),
                error,
            )
        })?;
        Ok(size)
    }

    /// There is no local descriptor behind a remote file.
    pub fn fileno(&self) -> Result<i32> {
        Err(FsError::Unsupported {
            op: "fileno".to_owned(),
            path: self.path.clone(),
        })
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.ensure_open("flush")?;
        let result = self.inner.flush().await;
        self.check_io("flush", result)
    }

    /// Flushes and releases the remote handle and its channel. Closing twice
    /// is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.inner.shutdown().await;
        self.check_io("close", result)?;
        self.channel
            .close()
            .await
            .map_err(|error| {
                convert(
                    ErrorContext::file("close", &self.path, &self.endpoint),
                    error,
                )
            })
    }
}

impl AsyncRead for SshFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        match this.prefetched.as_mut() {
            Some(cursor) => Pin::new(cursor).poll_read(cx, buf),
            None => Pin::new(&mut this.inner).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SshFile {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl AsyncSeek for SshFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = &mut *self;
        match this.prefetched.as_mut() {
            Some(cursor) => Pin::new(cursor).start_seek(position),
            None => Pin::new(&mut this.inner).start_seek(position),
        }
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let this = &mut *self;
        match this.prefetched.as_mut() {
            Some(cursor) => Pin::new(cursor).poll_complete(cx),
            None => Pin::new(&mut this.inner).poll_complete(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whence_values() {
        assert_eq!(Whence::try_from(0).unwrap(), Whence::Start);
        assert_eq!(Whence::try_from(2).unwrap(), Whence::End);
        assert!(matches!(Whence::try_from(3), Err(FsError::InvalidArgument(_))));
        assert!(matches!(Whence::try_from(-1), Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn open_options_defaults() {
        let options = OpenOptions::default();
        assert!(options.pipelined);
        assert!(!options.prefetch);
        assert_eq!(OpenOptions::new().pipelined(false).buffering(16).buffering, Some(16));
    }
}
