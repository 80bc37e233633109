use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    error::{FsError, Result},
    file::{OpenOptions, SshFile},
    info::{Info, InfoUpdate, Namespace, ResourceType},
    path,
    permissions::Permissions,
    remote::Progress,
    subfs::SubFs,
};

/// A `(start, stop)` slice over a directory listing.
pub type Page = (usize, usize);

/// The uniform filesystem contract.
///
/// Paths are `/`-separated and relative paths are taken from the root of the
/// filesystem. Every operation fails with [`FsError::FilesystemClosed`] once
/// [`close`](Filesystem::close) has been called.
#[async_trait]
pub trait Filesystem: Clone + Send + Sync + 'static {
    /// Metadata of `path`, restricted to `namespaces` (`basic` is always
    /// present). Symlinks are reported as themselves.
    async fn getinfo(&self, path: &str, namespaces: &[Namespace]) -> Result<Info>;

    /// Names of the entries of a directory, in no particular order.
    async fn listdir(&self, path: &str) -> Result<Vec<String>>;

    /// Lazily computed metadata of the entries of a directory. Every call
    /// starts a new listing.
    fn scandir(
        &self,
        path: &str,
        namespaces: &[Namespace],
        page: Option<Page>,
    ) -> BoxStream<'static, Result<Info>>;

    /// Creates a directory (`0o755` unless `permissions` is given) and
    /// returns a view rooted at it.
    async fn makedir(
        &self,
        path: &str,
        permissions: Option<Permissions>,
        recreate: bool,
    ) -> Result<SubFs<Self>>;

    async fn openbin(&self, path: &str, mode: &str, options: &OpenOptions) -> Result<SshFile>;

    async fn remove(&self, path: &str) -> Result<()>;

    async fn removedir(&self, path: &str) -> Result<()>;

    /// Renames a file, replacing an existing file at `dst` only when
    /// `overwrite` is set.
    async fn move_file(
        &self,
        src: &str,
        dst: &str,
        overwrite: bool,
        preserve_time: bool,
    ) -> Result<()>;

    async fn setinfo(&self, path: &str, info: &InfoUpdate) -> Result<()>;

    /// Writes `source` to `path`; `size` is only reported to `progress`.
    async fn upload(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
        size: Option<u64>,
        progress: Option<Progress<'_>>,
    ) -> Result<u64>;

    async fn download(
        &self,
        path: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        progress: Option<Progress<'_>>,
    ) -> Result<u64>;

    /// Only the `download` purpose has a URL.
    fn geturl(&self, path: &str, purpose: &str) -> Result<String>;

    async fn close(&self) -> Result<()>;

    fn isclosed(&self) -> bool;

    async fn exists(&self, path: &str) -> Result<bool> {
        match self.getinfo(path, &[]).await {
            Ok(_) => Ok(true),
            Err(FsError::ResourceNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn isdir(&self, path: &str) -> Result<bool> {
        match self.getinfo(path, &[]).await {
            Ok(info) => Ok(info.is_dir()),
            Err(FsError::ResourceNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn isfile(&self, path: &str) -> Result<bool> {
        match self.getinfo(path, &[]).await {
            Ok(info) => Ok(info.is_file()),
            Err(FsError::ResourceNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn gettype(&self, path: &str) -> Result<ResourceType> {
        let info = self.getinfo(path, &[Namespace::Details]).await?;
        Ok(info.resource_type().unwrap_or(ResourceType::Unknown))
    }

    async fn isempty(&self, path: &str) -> Result<bool> {
        Ok(self.listdir(path).await?.is_empty())
    }

    /// Creates `path` and any missing ancestors.
    async fn makedirs(
        &self,
        path: &str,
        permissions: Option<Permissions>,
        recreate: bool,
    ) -> Result<SubFs<Self>> {
        let target = path::validate(path)?;
        for ancestor in path::ancestors(&target) {
            match self.getinfo(&ancestor, &[]).await {
                Ok(info) if info.is_dir() || info.is_link() => {}
                Ok(_) => return Err(FsError::directory_expected(ancestor)),
                Err(FsError::ResourceNotFound { .. }) => {
                    match self.makedir(&ancestor, permissions, true).await {
                        Ok(_) | Err(FsError::DirectoryExists { .. }) => {}
                        Err(err) => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            }
        }
        self.makedir(&target, permissions, recreate).await
    }

    async fn opendir(&self, path: &str) -> Result<SubFs<Self>> {
        let target = path::validate(path)?;
        if !self.getinfo(&target, &[]).await?.is_dir() {
            return Err(FsError::directory_expected(path));
        }
        Ok(SubFs::new(self.clone(), target))
    }

    async fn readbytes(&self, path: &str) -> Result<Vec<u8>> {
        let mut file = self.openbin(path, "r", &OpenOptions::default()).await?;
        let content = file.read(None).await;
        file.close().await?;
        content
    }

    async fn writebytes(&self, path: &str, content: &[u8]) -> Result<()> {
        let mut file = self.openbin(path, "w", &OpenOptions::default()).await?;
        let written = file.write(content).await;
        file.close().await?;
        written.map(|_| ())
    }

    async fn readtext(&self, path: &str) -> Result<String> {
        let content = self.readbytes(path).await?;
        String::from_utf8(content).map_err(|err| FsError::OperationFailed {
            op: "readtext".to_owned(),
            path: path.to_owned(),
            message: err.to_string(),
        })
    }

    async fn writetext(&self, path: &str, content: &str) -> Result<()> {
        self.writebytes(path, content.as_bytes()).await
    }

    /// Creates an empty file, or sets both times of an existing one to now.
    async fn touch(&self, path: &str) -> Result<()> {
        if self.exists(path).await? {
            self.setinfo(path, InfoUpdate::new().touch()).await
        } else {
            self.writebytes(path, b"").await
        }
    }

    /// Sets the modified time (and the accessed time when given).
    async fn settimes(
        &self,
        path: &str,
        accessed: Option<DateTime<Utc>>,
        modified: DateTime<Utc>,
    ) -> Result<()> {
        let mut update = InfoUpdate::new();
        update.modified(modified);
        if let Some(accessed) = accessed {
            update.accessed(accessed);
        }
        self.setinfo(path, &update).await
    }
}
