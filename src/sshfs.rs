//! The filesystem implementation over a remote-shell session.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, BoxStream, StreamExt};
use log::debug;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::Mutex,
};

use crate::{
    command::RemoteCommand,
    config::ResolvedParams,
    convert::{convert_errors, ignore_network_errors, ErrorContext},
    error::{FsError, Result},
    file::{OpenOptions, SshFile},
    filesystem::{Filesystem, Page},
    info::{Access, Basic, Details, Info, InfoUpdate, Link, Namespace},
    mode::Mode,
    path,
    permissions::Permissions,
    platform::{self, Memo, Platform},
    remote::{Progress, RemoteDirEntry, RemoteSession, RemoteStat, SftpChannel},
    subfs::SubFs,
};

const DEFAULT_DIR_PERMISSIONS: u32 = 0o755;

/// `getent` databases used to resolve owner names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NameDb {
    Passwd,
    Group,
}

impl NameDb {
    fn as_str(&self) -> &'static str {
        match self {
            NameDb::Passwd => "passwd",
            NameDb::Group => "group",
        }
    }
}

struct Inner {
    session: Arc<dyn RemoteSession>,
    sftp: Arc<dyn SftpChannel>,
    lock: Mutex<()>,
    closed: AtomicBool,
    host: String,
    port: u16,
    user: String,
    endpoint: Arc<str>,
    exec_timeout: Duration,
    platform: Memo<Platform>,
    locale: Memo<Option<String>>,
    names: DashMap<(NameDb, u32), Option<String>>,
}

/// A filesystem on a remote host reached over SSH.
///
/// Cloning is cheap; clones share the session.
#[derive(Clone)]
pub struct SshFs {
    inner: Arc<Inner>,
}

impl SshFs {
    /// Wraps an already authenticated session.
    pub fn from_session(
        session: Arc<dyn RemoteSession>,
        target: &ResolvedParams,
        exec_timeout: Duration,
    ) -> SshFs {
        let sftp = session.sftp();
        SshFs {
            inner: Arc::new(Inner {
                session,
                sftp,
                lock: Mutex::new(()),
                closed: AtomicBool::new(false),
                host: target.hostname.clone(),
                port: target.port,
                user: target.user.clone(),
                endpoint: format!("{}@{}:{}", target.user, target.hostname, target.port).into(),
                exec_timeout,
                platform: Memo::new(),
                locale: Memo::new(),
                names: DashMap::new(),
            }),
        }
    }

    /// Connects over SSH and opens the primary SFTP channel.
    #[cfg(feature = "russh")]
    pub async fn connect(params: &crate::config::ConnectionParams) -> Result<SshFs> {
        let target = params.resolve();
        let session = crate::impl_russh::connect(params, &target)
            .await
            .map_err(FsError::create_failed)?;
        let fs = SshFs::from_session(Arc::new(session), &target, params.effective_exec_timeout());
        log::info!("opened filesystem on {}", fs.inner.endpoint);
        Ok(fs)
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn user(&self) -> &str {
        &self.inner.user
    }

    fn check(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(FsError::FilesystemClosed);
        }
        Ok(())
    }

    fn file_ctx<'a>(&'a self, op: &'a str, path: &'a str) -> ErrorContext<'a> {
        ErrorContext::file(op, path, &self.inner.endpoint)
    }

    fn dir_ctx<'a>(&'a self, op: &'a str, path: &'a str) -> ErrorContext<'a> {
        ErrorContext::directory(op, path, &self.inner.endpoint)
    }

    /// Runs a diagnostic command, returning its trimmed stdout when it wrote
    /// nothing to stderr.
    async fn exec_command(&self, command: &RemoteCommand) -> Option<Vec<u8>> {
        let rendered = command.render();
        let running = self.inner.session.exec(&rendered);
        let output = match tokio::time::timeout(self.inner.exec_timeout, running).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                debug!("command {rendered:?} failed: {err}");
                return None;
            }
            Err(_) => {
                debug!("command {rendered:?} timed out");
                return None;
            }
        };
        if !output.stderr.trim_ascii().is_empty() {
            return None;
        }
        Some(output.stdout.trim_ascii().to_vec())
    }

    /// The remote platform, detected on first use.
    pub async fn platform(&self) -> Platform {
        self.inner.platform.get(move || self.guess_platform()).await
    }

    async fn guess_platform(&self) -> Platform {
        let uname = self.exec_command(&RemoteCommand::new("uname -s")).await;
        let uname = uname.map(|output| String::from_utf8_lossy(&output).into_owned());
        let sysinfo = match uname {
            Some(_) => None,
            None => self
                .exec_command(&RemoteCommand::new("sysinfo"))
                .await
                .map(|output| String::from_utf8_lossy(&output).into_owned()),
        };
        let platform = Platform::classify(uname.as_deref(), sysinfo.as_deref());
        debug!("{} runs {platform}", self.inner.endpoint);
        platform
    }

    /// The lowercase charset of the remote `$LANG`, on POSIX platforms only.
    pub async fn locale(&self) -> Option<String> {
        self.inner.locale.get(move || self.guess_locale()).await
    }

    async fn guess_locale(&self) -> Option<String> {
        if !self.platform().await.is_posix() {
            return None;
        }
        let lang = self.exec_command(&RemoteCommand::new("echo $LANG")).await?;
        platform::parse_locale(&String::from_utf8_lossy(&lang))
    }

    /// Forgets the detected platform, locale and owner names.
    pub async fn invalidate_platform(&self) {
        self.inner.platform.invalidate().await;
        self.inner.locale.invalidate().await;
        self.inner.names.clear();
    }

    async fn entry_name(&self, db: NameDb, id: u32) -> Option<String> {
        if let Some(name) = self.inner.names.get(&(db, id)) {
            return name.clone();
        }
        let mut command = RemoteCommand::new("getent");
        command.arg(db.as_str()).arg(id.to_string());
        let name = match self.exec_command(&command).await {
            Some(entry) => {
                let field = entry.split(|byte| *byte == b':').next().unwrap_or_default();
                let locale = self.locale().await;
                Some(platform::decode(field, locale.as_deref())).filter(|name| !name.is_empty())
            }
            None => None,
        };
        self.inner.names.insert((db, id), name.clone());
        name
    }

    async fn make_access(&self, stat: &RemoteStat) -> Access {
        let mut access = Access::from_stat(stat);
        if self.platform().await.is_posix() {
            if let Some(gid) = access.gid {
                access.group = self.entry_name(NameDb::Group, gid).await.or(access.group);
            }
            if let Some(uid) = access.uid {
                access.user = self.entry_name(NameDb::Passwd, uid).await.or(access.user);
            }
        }
        access
    }

    /// Builds an [`Info`] from a non-dereferencing stat of `path`.
    async fn make_info(
        &self,
        name: &str,
        path: &str,
        lstat: RemoteStat,
        namespaces: &[Namespace],
    ) -> Result<Info> {
        let mut info = Info::new(Basic::from_stat(name, &lstat));
        for namespace in namespaces {
            match namespace {
                Namespace::Basic => {}
                Namespace::Details => {
                    info.details = Some(Details::from_stat(&lstat, self.platform().await));
                }
                Namespace::Access => {
                    info.access = Some(self.make_access(&lstat).await);
                }
                Namespace::Stat => {
                    let stat = if lstat.is_symlink() {
                        let ctx = self.file_ctx("getinfo", path);
                        match convert_errors(ctx, self.inner.sftp.stat(path)).await {
                            Ok(stat) => stat,
                            // dangling link
                            Err(FsError::ResourceNotFound { .. }) => lstat.clone(),
                            Err(err) => return Err(err),
                        }
                    } else {
                        lstat.clone()
                    };
                    info.stat = Some(stat);
                }
                Namespace::Lstat => {
                    info.lstat = Some(lstat.clone());
                }
                Namespace::Link => {
                    let target = if lstat.is_symlink() {
                        let ctx = self.file_ctx("getinfo", path);
                        Some(convert_errors(ctx, self.inner.sftp.read_link(path)).await?)
                    } else {
                        None
                    };
                    info.link = Some(Link { target });
                }
            }
        }
        Ok(info)
    }

    async fn stat_info(&self, path: &str, namespaces: &[Namespace]) -> Result<Info> {
        let ctx = self.file_ctx("getinfo", path);
        let lstat = convert_errors(ctx, self.inner.sftp.lstat(path)).await?;
        self.make_info(path::basename(path), path, lstat, namespaces).await
    }

    /// Lists a directory, telling a missing directory from a file.
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>> {
        match convert_errors(self.dir_ctx("scandir", path), self.inner.sftp.read_dir(path)).await {
            Ok(entries) => Ok(entries
                .into_iter()
                .filter(|entry| entry.name != "." && entry.name != "..")
                .collect()),
            Err(FsError::ResourceNotFound { path: missing }) => {
                if self.isfile(path).await? {
                    Err(FsError::directory_expected(path))
                } else {
                    Err(FsError::ResourceNotFound { path: missing })
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn utime(&self, path: &str, accessed: Option<i64>, modified: Option<i64>) -> Result<()> {
        let times = match (accessed, modified) {
            (None, None) => None,
            (accessed, modified) => {
                let accessed = accessed.or(modified).unwrap_or_default();
                let modified = modified.unwrap_or(accessed);
                Some((clamp_time(accessed), clamp_time(modified)))
            }
        };
        convert_errors(self.file_ctx("setinfo", path), self.inner.sftp.utime(path, times)).await
    }

    /// The remote call needs both ids, a missing one is read back first.
    async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        let (uid, gid) = match (uid, gid) {
            (Some(uid), Some(gid)) => (uid, gid),
            (uid, gid) => {
                let current = self.stat_info(path, &[Namespace::Access]).await?;
                let access = current.access.ok_or_else(|| FsError::not_found(path))?;
                match (uid.or(access.uid), gid.or(access.gid)) {
                    (Some(uid), Some(gid)) => (uid, gid),
                    _ => {
                        return Err(FsError::OperationFailed {
                            op: "setinfo".to_owned(),
                            path: path.to_owned(),
                            message: "current owner is unknown".to_owned(),
                        })
                    }
                }
            }
        };
        convert_errors(self.file_ctx("setinfo", path), self.inner.sftp.chown(path, uid, gid)).await
    }
}

fn clamp_time(seconds: i64) -> u32 {
    u32::try_from(seconds.max(0)).unwrap_or(u32::MAX)
}

#[async_trait]
impl Filesystem for SshFs {
    async fn getinfo(&self, path: &str, namespaces: &[Namespace]) -> Result<Info> {
        self.check()?;
        let path = path::validate(path)?;
        self.stat_info(&path, namespaces).await
    }

    async fn listdir(&self, path: &str) -> Result<Vec<String>> {
        self.check()?;
        let path = path::validate(path)?;
        if !self.stat_info(&path, &[]).await?.is_dir() {
            return Err(FsError::directory_expected(path));
        }
        let ctx = self.dir_ctx("listdir", &path);
        let entries = convert_errors(ctx, self.inner.sftp.read_dir(&path)).await?;
        Ok(entries
            .into_iter()
            .map(|entry| entry.name)
            .filter(|name| name != "." && name != "..")
            .collect())
    }

    fn scandir(
        &self,
        path: &str,
        namespaces: &[Namespace],
        page: Option<Page>,
    ) -> BoxStream<'static, Result<Info>> {
        let fs = self.clone();
        let requested = path.to_owned();
        let namespaces = namespaces.to_vec();

        stream::once(async move {
            let listing = async {
                fs.check()?;
                let path = path::validate(&requested)?;
                let entries = fs.read_dir(&path).await?;
                let entries: Vec<RemoteDirEntry> = match page {
                    Some((start, stop)) => entries
                        .into_iter()
                        .skip(start)
                        .take(stop.saturating_sub(start))
                        .collect(),
                    None => entries,
                };
                Ok::<_, FsError>((path, entries))
            };
            match listing.await {
                Ok((path, entries)) => stream::iter(entries)
                    .then(move |entry| {
                        let fs = fs.clone();
                        let child = path::join(&path, &entry.name);
                        let namespaces = namespaces.clone();
                        async move {
                            fs.make_info(&entry.name, &child, entry.stat, &namespaces)
                                .await
                        }
                    })
                    .boxed(),
                Err(err) => stream::once(async move { Err(err) }).boxed(),
            }
        })
        .flatten()
        .boxed()
    }

    async fn makedir(
        &self,
        path: &str,
        permissions: Option<Permissions>,
        recreate: bool,
    ) -> Result<SubFs<Self>> {
        self.check()?;
        let path = path::validate(path)?;
        let mode = permissions
            .map(|permissions| permissions.mode())
            .unwrap_or(DEFAULT_DIR_PERMISSIONS);

        {
            let _guard = self.inner.lock.lock().await;
            match self.stat_info(&path, &[]).await {
                Ok(info) => {
                    if !info.is_dir() || !recreate {
                        return Err(FsError::DirectoryExists { path });
                    }
                }
                Err(FsError::ResourceNotFound { .. }) => {
                    let ctx = self.dir_ctx("makedir", &path);
                    convert_errors(ctx, self.inner.sftp.mkdir(&path, mode)).await?;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(SubFs::new(self.clone(), path))
    }

    async fn openbin(&self, path: &str, mode: &str, options: &OpenOptions) -> Result<SshFile> {
        self.check()?;
        let path = path::validate(path)?;
        let mode = Mode::new(mode)?;
        mode.validate_bin()?;

        let _guard = self.inner.lock.lock().await;
        let existing = match self.stat_info(&path, &[]).await {
            Ok(info) => Some(info),
            Err(FsError::ResourceNotFound { .. }) => None,
            Err(err) => return Err(err),
        };
        match &existing {
            Some(_) if mode.exclusive() => return Err(FsError::FileExists { path }),
            None if mode.reading() && !mode.create() => return Err(FsError::not_found(path)),
            Some(info) if info.is_dir() => return Err(FsError::file_expected(path)),
            _ => {}
        }

        let ctx = self.file_ctx("openbin", &path);
        let channel = convert_errors(ctx, self.inner.session.open_sftp()).await?;
        let opened = channel.open(&path, mode.to_open_flags());
        let handle = match convert_errors(self.file_ctx("openbin", &path), opened).await {
            Ok(handle) => handle,
            Err(err) => {
                if let Err(close_err) = channel.close().await {
                    debug!("closing channel of failed open of {path}: {close_err}");
                }
                return Err(err);
            }
        };
        SshFile::new(handle, channel, path, self.inner.endpoint.clone(), mode, options).await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.check()?;
        let path = path::validate(path)?;
        if self.stat_info(&path, &[]).await?.is_dir() {
            return Err(FsError::file_expected(path));
        }
        let _guard = self.inner.lock.lock().await;
        convert_errors(self.file_ctx("remove", &path), self.inner.sftp.remove(&path)).await
    }

    async fn removedir(&self, path: &str) -> Result<()> {
        self.check()?;
        let path = path::validate(path)?;
        if !self.isempty(&path).await? {
            return Err(FsError::DirectoryNotEmpty { path });
        }
        let _guard = self.inner.lock.lock().await;
        convert_errors(self.dir_ctx("removedir", &path), self.inner.sftp.rmdir(&path)).await
    }

    async fn move_file(
        &self,
        src: &str,
        dst: &str,
        overwrite: bool,
        preserve_time: bool,
    ) -> Result<()> {
        self.check()?;
        let src = path::validate(src)?;
        let dst = path::validate(dst)?;

        let _guard = self.inner.lock.lock().await;
        let source = self.stat_info(&src, &[Namespace::Details]).await?;
        if source.is_dir() {
            return Err(FsError::file_expected(src));
        }
        if src == dst {
            return Ok(());
        }
        match self.stat_info(&dst, &[]).await {
            Ok(target) if target.is_dir() => return Err(FsError::file_expected(dst)),
            Ok(_) if !overwrite => return Err(FsError::DestinationExists { path: dst }),
            Ok(_) => {
                convert_errors(self.file_ctx("move", &dst), self.inner.sftp.remove(&dst)).await?;
            }
            Err(FsError::ResourceNotFound { .. }) => {
                if !self.isdir(path::dirname(&dst)).await? {
                    return Err(FsError::not_found(dst));
                }
            }
            Err(err) => return Err(err),
        }

        convert_errors(self.file_ctx("move", &src), self.inner.sftp.rename(&src, &dst)).await?;

        if preserve_time {
            let accessed = source.accessed().map(|time| time.timestamp());
            let modified = source.modified().map(|time| time.timestamp());
            if accessed.is_some() || modified.is_some() {
                self.utime(&dst, accessed, modified).await?;
            }
        }
        Ok(())
    }

    async fn setinfo(&self, path: &str, info: &InfoUpdate) -> Result<()> {
        self.check()?;
        let path = path::validate(path)?;
        if !self.exists(&path).await? {
            return Err(FsError::not_found(path));
        }

        if let Some(details) = &info.details {
            self.utime(
                &path,
                details.accessed.map(|time| time.timestamp()),
                details.modified.map(|time| time.timestamp()),
            )
            .await?;
        }
        if let Some(access) = &info.access {
            if access.uid.is_some() || access.gid.is_some() {
                self.chown(&path, access.uid, access.gid).await?;
            }
            if let Some(permissions) = access.permissions {
                let ctx = self.file_ctx("setinfo", &path);
                convert_errors(ctx, self.inner.sftp.chmod(&path, permissions.mode())).await?;
            }
        }
        Ok(())
    }

    async fn upload(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
        size: Option<u64>,
        progress: Option<Progress<'_>>,
    ) -> Result<u64> {
        self.check()?;
        let path = path::validate(path)?;
        {
            let _guard = self.inner.lock.lock().await;
            if !self.isdir(path::dirname(&path)).await? {
                return Err(FsError::not_found(path));
            }
            if self.isdir(&path).await? {
                return Err(FsError::file_expected(path));
            }
        }
        convert_errors(
            self.file_ctx("upload", &path),
            self.inner.sftp.put(&path, source, size.unwrap_or(0), progress),
        )
        .await
    }

    async fn download(
        &self,
        path: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        progress: Option<Progress<'_>>,
    ) -> Result<u64> {
        self.check()?;
        let path = path::validate(path)?;
        if self.stat_info(&path, &[]).await?.is_dir() {
            return Err(FsError::file_expected(path));
        }
        let ctx = self.file_ctx("download", &path);
        convert_errors(ctx, self.inner.sftp.get(&path, sink, progress)).await
    }

    fn geturl(&self, path: &str, purpose: &str) -> Result<String> {
        let path = path::validate(path)?;
        if purpose != "download" {
            return Err(FsError::NoUrl {
                path,
                purpose: purpose.to_owned(),
            });
        }
        Ok(format!(
            "ssh://{}@{}:{}{}",
            self.inner.user, self.inner.host, self.inner.port, path
        ))
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("closing session to {}", self.inner.endpoint);
        ignore_network_errors(
            "close",
            convert_errors(self.file_ctx("close", "/"), self.inner.session.close()),
        )
        .await
    }

    fn isclosed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}
