use std::{
    io::{self, SeekFrom},
    pin::Pin,
    task::{Context, Poll},
};

use async_trait::async_trait;
use russh_sftp::client::fs::{File, Metadata};
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

use crate::remote::{RemoteFile, RemoteResult, RemoteStat};

use super::channel::{sftp_error, to_stat};

/// An open `russh-sftp` file handle.
pub struct RusshFile {
    inner: Pin<Box<File>>,
}

impl RusshFile {
    pub fn new(file: File) -> Self {
        Self { inner: Box::pin(file) }
    }
}

#[async_trait]
impl RemoteFile for RusshFile {
    async fn stat(&mut self) -> RemoteResult<RemoteStat> {
        self.inner.metadata().await.map(to_stat).map_err(sftp_error)
    }

    async fn set_len(&mut self, size: u64) -> RemoteResult<()> {
        let metadata = Metadata {
            size: Some(size),
            uid: None,
            user: None,
            gid: None,
            group: None,
            permissions: None,
            atime: None,
            mtime: None,
        };
        self.inner.set_metadata(metadata).await.map_err(sftp_error)
    }

    // requests are already awaited one at a time by the client
    fn set_pipelined(&mut self, _pipelined: bool) {}
}

impl AsyncRead for RusshFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for RusshFile {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.inner.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_shutdown(cx)
    }
}

impl AsyncSeek for RusshFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        self.inner.as_mut().start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        self.inner.as_mut().poll_complete(cx)
    }
}
