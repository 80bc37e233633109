use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    error::{FsError, Result},
    file::{OpenOptions, SshFile},
    filesystem::{Filesystem, Page},
    info::{Info, InfoUpdate, Namespace},
    path,
    permissions::Permissions,
    remote::Progress,
};

/// A view of a directory of another filesystem, seen as its root.
///
/// A closing view also closes the filesystem it wraps.
#[derive(Clone)]
pub struct SubFs<F> {
    parent: F,
    prefix: String,
    closing: bool,
    closed: Arc<AtomicBool>,
}

impl<F: Filesystem> SubFs<F> {
    pub fn new(parent: F, prefix: impl Into<String>) -> SubFs<F> {
        SubFs {
            parent,
            prefix: prefix.into(),
            closing: false,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn closing(parent: F, prefix: impl Into<String>) -> SubFs<F> {
        SubFs {
            closing: true,
            ..SubFs::new(parent, prefix)
        }
    }

    pub fn parent(&self) -> &F {
        &self.parent
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Maps a path of this view to a path of the parent.
    fn delegate(&self, path: &str) -> Result<String> {
        self.check()?;
        let inner = path::validate(path)?;
        Ok(path::join(&self.prefix, inner.trim_start_matches('/')))
    }

    fn check(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FsError::FilesystemClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl<F: Filesystem> Filesystem for SubFs<F> {
    async fn getinfo(&self, path: &str, namespaces: &[Namespace]) -> Result<Info> {
        self.parent.getinfo(&self.delegate(path)?, namespaces).await
    }

    async fn listdir(&self, path: &str) -> Result<Vec<String>> {
        self.parent.listdir(&self.delegate(path)?).await
    }

    fn scandir(
        &self,
        path: &str,
        namespaces: &[Namespace],
        page: Option<Page>,
    ) -> BoxStream<'static, Result<Info>> {
        match self.delegate(path) {
            Ok(path) => self.parent.scandir(&path, namespaces, page),
            Err(err) => stream::once(async move { Err(err) }).boxed(),
        }
    }

    async fn makedir(
        &self,
        path: &str,
        permissions: Option<Permissions>,
        recreate: bool,
    ) -> Result<SubFs<Self>> {
        let target = path::validate(path)?;
        self.parent.makedir(&self.delegate(&target)?, permissions, recreate).await?;
        Ok(SubFs::new(self.clone(), target))
    }

    async fn openbin(&self, path: &str, mode: &str, options: &OpenOptions) -> Result<SshFile> {
        self.parent.openbin(&self.delegate(path)?, mode, options).await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.parent.remove(&self.delegate(path)?).await
    }

    async fn removedir(&self, path: &str) -> Result<()> {
        self.parent.removedir(&self.delegate(path)?).await
    }

    async fn move_file(
        &self,
        src: &str,
        dst: &str,
        overwrite: bool,
        preserve_time: bool,
    ) -> Result<()> {
        self.parent
            .move_file(&self.delegate(src)?, &self.delegate(dst)?, overwrite, preserve_time)
            .await
    }

    async fn setinfo(&self, path: &str, info: &InfoUpdate) -> Result<()> {
        self.parent.setinfo(&self.delegate(path)?, info).await
    }

    async fn upload(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
        size: Option<u64>,
        progress: Option<Progress<'_>>,
    ) -> Result<u64> {
        self.parent.upload(&self.delegate(path)?, source, size, progress).await
    }

    async fn download(
        &self,
        path: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        progress: Option<Progress<'_>>,
    ) -> Result<u64> {
        self.parent.download(&self.delegate(path)?, sink, progress).await
    }

    fn geturl(&self, path: &str, purpose: &str) -> Result<String> {
        self.parent.geturl(&self.delegate(path)?, purpose)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.closing {
            self.parent.close().await?;
        }
        Ok(())
    }

    fn isclosed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.parent.isclosed()
    }
}
