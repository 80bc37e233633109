//! An in-memory remote that behaves like an OpenSSH `sftp-server`.
//!
//! Errors follow what an SFTP client actually observes: only "no such file",
//! "permission denied" and "unsupported" carry an errno, everything else is a
//! bare failure. Commands are answered from a scriptable table.

use std::{
    collections::{BTreeMap, HashMap},
    io::{self, SeekFrom},
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use nix::errno::Errno;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

use crate::{
    config::ResolvedParams,
    path,
    remote::{
        CommandOutput, OpenFlags, RemoteDirEntry, RemoteError, RemoteFile, RemoteResult,
        RemoteSession, RemoteStat,
        SftpChannel, S_IFDIR, S_IFLNK, S_IFREG,
    },
    sshfs::SshFs,
};

const MAX_SYMLINK_DEPTH: usize = 8;
const DEFAULT_FILE_MODE: u32 = 0o644;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now() -> u32 {
    u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX)
}

fn failure(message: &str) -> RemoteError {
    RemoteError::Failure(message.to_owned())
}

#[derive(Debug, Clone)]
enum NodeKind {
    Directory,
    File(Arc<Mutex<Vec<u8>>>),
    Symlink(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    permissions: u32,
    uid: u32,
    gid: u32,
    atime: u32,
    mtime: u32,
}

impl Node {
    fn new(kind: NodeKind, permissions: u32, owner: (u32, u32)) -> Node {
        let now = now();
        Node {
            kind,
            permissions: permissions & 0o7777,
            uid: owner.0,
            gid: owner.1,
            atime: now,
            mtime: now,
        }
    }

    fn stat(&self) -> RemoteStat {
        let (format, size) = match &self.kind {
            NodeKind::Directory => (S_IFDIR, 4096),
            NodeKind::File(data) => (S_IFREG, lock(data).len() as u64),
            NodeKind::Symlink(target) => (S_IFLNK, target.len() as u64),
        };
        RemoteStat {
            size: Some(size),
            uid: Some(self.uid),
            gid: Some(self.gid),
            mode: Some(format | self.permissions),
            atime: Some(self.atime),
            mtime: Some(self.mtime),
            ..Default::default()
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }
}

#[derive(Debug)]
struct State {
    nodes: Mutex<BTreeMap<String, Node>>,
    commands: Mutex<HashMap<String, CommandOutput>>,
    exec_log: Mutex<Vec<String>>,
    chown_log: Mutex<Vec<(String, u32, u32)>>,
    owner: Mutex<(u32, u32)>,
    fail_exec: AtomicBool,
    exec_delay: Mutex<Option<Duration>>,
    disconnected: AtomicBool,
    open_channels: AtomicUsize,
}

impl State {
    fn check_connected(&self) -> RemoteResult<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(RemoteError::ConnectionLost("session closed".to_owned()));
        }
        Ok(())
    }

    fn owner(&self) -> (u32, u32) {
        *lock(&self.owner)
    }

    /// Resolves symlinks of the final component.
    fn resolve(nodes: &BTreeMap<String, Node>, path: &str) -> RemoteResult<String> {
        let mut current = path.to_owned();
        for _ in 0..MAX_SYMLINK_DEPTH {
            match nodes.get(&current).map(|node| &node.kind) {
                None => return Err(RemoteError::errno(Errno::ENOENT)),
                Some(NodeKind::Symlink(target)) => {
                    let joined = path::join(path::dirname(&current), target);
                    current = normalize(&joined)?;
                }
                Some(_) => return Ok(current),
            }
        }
        Err(failure("too many levels of symbolic links"))
    }

    fn require_parent_dir(nodes: &BTreeMap<String, Node>, path: &str) -> RemoteResult<()> {
        let parent = State::resolve(nodes, path::dirname(path))?;
        match nodes.get(&parent) {
            Some(node) if node.is_dir() => Ok(()),
            _ => Err(RemoteError::errno(Errno::ENOENT)),
        }
    }
}

fn normalize(path: &str) -> RemoteResult<String> {
    path::normalize(path)
        .map(|normalized| path::abspath(&normalized))
        .map_err(|_| RemoteError::errno(Errno::ENOENT))
}

fn children<'a>(
    nodes: &'a BTreeMap<String, Node>,
    dir: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Node)> + 'a {
    let prefix = if dir == "/" { "/".to_owned() } else { format!("{dir}/") };
    nodes
        .range(prefix.clone()..)
        .take_while(move |(key, _)| key.starts_with(&prefix))
        .filter(move |(key, _)| {
            !key[dir.len()..].trim_start_matches('/').contains('/') && key.as_str() != "/"
        })
}

/// The remote host: owns the tree and answers commands.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    state: Arc<State>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// A Linux host with a UTF-8 locale whose only user is `root`.
    pub fn new() -> MemoryRemote {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_owned(), Node::new(NodeKind::Directory, 0o755, (0, 0)));
        let remote = MemoryRemote {
            state: Arc::new(State {
                nodes: Mutex::new(nodes),
                commands: Mutex::new(HashMap::new()),
                exec_log: Mutex::new(Vec::new()),
                chown_log: Mutex::new(Vec::new()),
                owner: Mutex::new((0, 0)),
                fail_exec: AtomicBool::new(false),
                exec_delay: Mutex::new(None),
                disconnected: AtomicBool::new(false),
                open_channels: AtomicUsize::new(0),
            }),
        };
        remote
            .set_command("uname -s", "Linux\n", "")
            .set_command("echo $LANG", "en_US.UTF-8\n", "")
            .set_command("getent passwd 0", "root:x:0:0:root:/root:/bin/bash\n", "")
            .set_command("getent group 0", "root:x:0:\n", "");
        remote
    }

    /// Answers `command` with the given output.
    pub fn set_command(&self, command: &str, stdout: &str, stderr: &str) -> &Self {
        lock(&self.state.commands).insert(
            command.to_owned(),
            CommandOutput {
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
                exit_status: Some(if stderr.is_empty() { 0 } else { 1 }),
            },
        );
        self
    }

    pub fn remove_command(&self, command: &str) -> &Self {
        lock(&self.state.commands).remove(command);
        self
    }

    /// Makes every exec request fail at the protocol level.
    pub fn fail_exec(&self, fail: bool) -> &Self {
        self.state.fail_exec.store(fail, Ordering::SeqCst);
        self
    }

    /// Delays every command, to exercise execution timeouts.
    pub fn exec_delay(&self, delay: Option<Duration>) -> &Self {
        *lock(&self.state.exec_delay) = delay;
        self
    }

    /// Owner given to resources created from now on; also registered with
    /// `getent` as `name`.
    pub fn login(&self, name: &str, uid: u32, gid: u32) -> &Self {
        *lock(&self.state.owner) = (uid, gid);
        self.set_command(
            &format!("getent passwd {uid}"),
            &format!("{name}:x:{uid}:{gid}::/home/{name}:/bin/sh\n"),
            "",
        )
        .set_command(&format!("getent group {gid}"), &format!("{name}:x:{gid}:\n"), "")
    }

    pub fn exec_log(&self) -> Vec<String> {
        lock(&self.state.exec_log).clone()
    }

    pub fn chown_log(&self) -> Vec<(String, u32, u32)> {
        lock(&self.state.chown_log).clone()
    }

    /// Dedicated channels opened and not yet closed.
    pub fn open_channels(&self) -> usize {
        self.state.open_channels.load(Ordering::SeqCst)
    }

    /// Simulates a dropped connection.
    pub fn disconnect(&self) {
        self.state.disconnected.store(true, Ordering::SeqCst);
    }

    pub fn is_disconnected(&self) -> bool {
        self.state.disconnected.load(Ordering::SeqCst)
    }

    /// Creates a directory tree directly, bypassing the protocol.
    pub fn seed_dir(&self, dir: &str) -> &Self {
        let owner = self.state.owner();
        let mut nodes = lock(&self.state.nodes);
        for ancestor in path::ancestors(dir).into_iter().chain([dir.to_owned()]) {
            nodes
                .entry(ancestor)
                .or_insert_with(|| Node::new(NodeKind::Directory, 0o755, owner));
        }
        self
    }

    /// Creates a file directly, bypassing the protocol.
    pub fn seed_file(&self, file: &str, content: &[u8]) -> &Self {
        self.seed_dir(path::dirname(file));
        let owner = self.state.owner();
        lock(&self.state.nodes).insert(
            file.to_owned(),
            Node::new(
                NodeKind::File(Arc::new(Mutex::new(content.to_vec()))),
                DEFAULT_FILE_MODE,
                owner,
            ),
        );
        self
    }

    /// A filesystem over this remote, as `user@memory:22`.
    pub fn filesystem(&self, user: &str) -> SshFs {
        SshFs::from_session(
            Arc::new(self.clone()),
            &ResolvedParams {
                hostname: "memory".to_owned(),
                port: 22,
                user: user.to_owned(),
                key_file: None,
            },
            Duration::from_secs(5),
        )
    }
}

#[async_trait]
impl RemoteSession for MemoryRemote {
    fn sftp(&self) -> Arc<dyn SftpChannel> {
        Arc::new(MemorySftp {
            state: self.state.clone(),
            dedicated: false,
            closed: AtomicBool::new(false),
        })
    }

    async fn open_sftp(&self) -> RemoteResult<Arc<dyn SftpChannel>> {
        self.state.check_connected()?;
        self.state.open_channels.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySftp {
            state: self.state.clone(),
            dedicated: true,
            closed: AtomicBool::new(false),
        }))
    }

    async fn exec(&self, command: &str) -> RemoteResult<CommandOutput> {
        self.state.check_connected()?;
        lock(&self.state.exec_log).push(command.to_owned());
        let delay = *lock(&self.state.exec_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_exec.load(Ordering::SeqCst) {
            return Err(RemoteError::Ssh("exec request failed on channel".to_owned()));
        }
        let output = lock(&self.state.commands).get(command).cloned();
        Ok(output.unwrap_or_else(|| CommandOutput {
            stdout: Vec::new(),
            stderr: format!("sh: 1: {command}: not found\n").into_bytes(),
            exit_status: Some(127),
        }))
    }

    async fn close(&self) -> RemoteResult<()> {
        self.state.check_connected()?;
        self.state.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A transfer channel on a [`MemoryRemote`].
#[derive(Debug)]
pub struct MemorySftp {
    state: Arc<State>,
    dedicated: bool,
    closed: AtomicBool,
}

impl MemorySftp {
    fn nodes(&self) -> RemoteResult<MutexGuard<'_, BTreeMap<String, Node>>> {
        self.state.check_connected()?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(RemoteError::ConnectionLost("channel closed".to_owned()));
        }
        Ok(lock(&self.state.nodes))
    }
}

#[async_trait]
impl SftpChannel for MemorySftp {
    async fn stat(&self, path: &str) -> RemoteResult<RemoteStat> {
        let path = normalize(path)?;
        let nodes = self.nodes()?;
        let resolved = State::resolve(&nodes, &path)?;
        nodes
            .get(&resolved)
            .map(Node::stat)
            .ok_or_else(|| RemoteError::errno(Errno::ENOENT))
    }

    async fn lstat(&self, path: &str) -> RemoteResult<RemoteStat> {
        let path = normalize(path)?;
        let nodes = self.nodes()?;
        nodes
            .get(&path)
            .map(Node::stat)
            .ok_or_else(|| RemoteError::errno(Errno::ENOENT))
    }

    async fn read_dir(&self, path: &str) -> RemoteResult<Vec<RemoteDirEntry>> {
        let path = normalize(path)?;
        let nodes = self.nodes()?;
        let resolved = State::resolve(&nodes, &path)?;
        match nodes.get(&resolved) {
            Some(node) if node.is_dir() => {}
            // sftp-server reports ENOTDIR as "no such file"
            _ => return Err(RemoteError::errno(Errno::ENOENT)),
        }
        Ok(children(&nodes, &resolved)
            .map(|(key, node)| RemoteDirEntry {
                name: path::basename(key).to_owned(),
                stat: node.stat(),
            })
            .collect())
    }

    async fn open(&self, path: &str, flags: OpenFlags) -> RemoteResult<Box<dyn RemoteFile>> {
        let path = normalize(path)?;
        let owner = self.state.owner();
        let mut nodes = self.nodes()?;
        let target = match State::resolve(&nodes, &path) {
            Ok(resolved) => Some(resolved),
            Err(RemoteError::Os { .. }) => None,
            Err(err) => return Err(err),
        };

        let data = match target.as_ref().and_then(|target| nodes.get(target)) {
            Some(_) if flags.contains(OpenFlags::EXCLUDE) => return Err(failure("file exists")),
            Some(node) => match &node.kind {
                NodeKind::File(data) => data.clone(),
                _ => return Err(failure("not a regular file")),
            },
            None => {
                if !flags.contains(OpenFlags::CREATE) {
                    return Err(RemoteError::errno(Errno::ENOENT));
                }
                State::require_parent_dir(&nodes, &path)?;
                let data = Arc::new(Mutex::new(Vec::new()));
                nodes.insert(
                    path.clone(),
                    Node::new(NodeKind::File(data.clone()), DEFAULT_FILE_MODE, owner),
                );
                data
            }
        };
        if flags.contains(OpenFlags::TRUNCATE) {
            lock(&data).clear();
        }
        let position = if flags.contains(OpenFlags::APPEND) {
            lock(&data).len() as u64
        } else {
            0
        };

        Ok(Box::new(MemoryFile {
            state: self.state.clone(),
            path: target.unwrap_or(path),
            data,
            flags,
            position,
            seek_target: None,
            dirty: false,
        }))
    }

    async fn mkdir(&self, path: &str, mode: u32) -> RemoteResult<()> {
        let path = normalize(path)?;
        let owner = self.state.owner();
        let mut nodes = self.nodes()?;
        if nodes.contains_key(&path) {
            return Err(failure("file exists"));
        }
        State::require_parent_dir(&nodes, &path)?;
        nodes.insert(path, Node::new(NodeKind::Directory, mode, owner));
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> RemoteResult<()> {
        let path = normalize(path)?;
        let mut nodes = self.nodes()?;
        match nodes.get(&path) {
            None => return Err(RemoteError::errno(Errno::ENOENT)),
            Some(node) if !node.is_dir() || path == "/" => {
                return Err(failure("not a removable directory"))
            }
            Some(_) => {}
        }
        if children(&nodes, &path).next().is_some() {
            return Err(failure("directory not empty"));
        }
        nodes.remove(&path);
        Ok(())
    }

    async fn remove(&self, path: &str) -> RemoteResult<()> {
        let path = normalize(path)?;
        let mut nodes = self.nodes()?;
        match nodes.get(&path) {
            None => Err(RemoteError::errno(Errno::ENOENT)),
            Some(node) if node.is_dir() => Err(failure("is a directory")),
            Some(_) => {
                nodes.remove(&path);
                Ok(())
            }
        }
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> RemoteResult<()> {
        let old_path = normalize(old_path)?;
        let new_path = normalize(new_path)?;
        let mut nodes = self.nodes()?;
        if !nodes.contains_key(&old_path) {
            return Err(RemoteError::errno(Errno::ENOENT));
        }
        if nodes.contains_key(&new_path) {
            return Err(failure("file exists"));
        }
        State::require_parent_dir(&nodes, &new_path)?;

        let moved: Vec<String> = nodes
            .keys()
            .filter(|key| **key == old_path || key.starts_with(&format!("{old_path}/")))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = nodes.remove(&key) {
                nodes.insert(format!("{new_path}{}", &key[old_path.len()..]), node);
            }
        }
        Ok(())
    }

    async fn symlink(&self, path: &str, target: &str) -> RemoteResult<()> {
        let path = normalize(path)?;
        let owner = self.state.owner();
        let mut nodes = self.nodes()?;
        if nodes.contains_key(&path) {
            return Err(failure("file exists"));
        }
        State::require_parent_dir(&nodes, &path)?;
        nodes.insert(path, Node::new(NodeKind::Symlink(target.to_owned()), 0o777, owner));
        Ok(())
    }

    async fn read_link(&self, path: &str) -> RemoteResult<String> {
        let path = normalize(path)?;
        let nodes = self.nodes()?;
        match nodes.get(&path).map(|node| &node.kind) {
            None => Err(RemoteError::errno(Errno::ENOENT)),
            Some(NodeKind::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(failure("not a symbolic link")),
        }
    }

    async fn chmod(&self, path: &str, mode: u32) -> RemoteResult<()> {
        let path = normalize(path)?;
        let mut nodes = self.nodes()?;
        let resolved = State::resolve(&nodes, &path)?;
        if let Some(node) = nodes.get_mut(&resolved) {
            node.permissions = mode & 0o7777;
        }
        Ok(())
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> RemoteResult<()> {
        let path = normalize(path)?;
        let mut nodes = self.nodes()?;
        let resolved = State::resolve(&nodes, &path)?;
        lock(&self.state.chown_log).push((path, uid, gid));
        if let Some(node) = nodes.get_mut(&resolved) {
            node.uid = uid;
            node.gid = gid;
        }
        Ok(())
    }

    async fn utime(&self, path: &str, times: Option<(u32, u32)>) -> RemoteResult<()> {
        let path = normalize(path)?;
        let mut nodes = self.nodes()?;
        let resolved = State::resolve(&nodes, &path)?;
        let (atime, mtime) = times.unwrap_or_else(|| (now(), now()));
        if let Some(node) = nodes.get_mut(&resolved) {
            node.atime = atime;
            node.mtime = mtime;
        }
        Ok(())
    }

    async fn close(&self) -> RemoteResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) && self.dedicated {
            self.state.open_channels.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// A handle on a file of a [`MemoryRemote`].
pub struct MemoryFile {
    state: Arc<State>,
    path: String,
    data: Arc<Mutex<Vec<u8>>>,
    flags: OpenFlags,
    position: u64,
    seek_target: Option<u64>,
    dirty: bool,
}

impl MemoryFile {
    fn touch(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        if let Some(node) = lock(&self.state.nodes).get_mut(&self.path) {
            node.mtime = now();
        }
    }

    fn check(&self) -> io::Result<()> {
        if self.state.disconnected.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "session closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteFile for MemoryFile {
    async fn stat(&mut self) -> RemoteResult<RemoteStat> {
        self.check()?;
        lock(&self.state.nodes)
            .get(&self.path)
            .map(Node::stat)
            .ok_or_else(|| RemoteError::errno(Errno::ENOENT))
    }

    async fn set_len(&mut self, size: u64) -> RemoteResult<()> {
        self.check()?;
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(RemoteError::errno(Errno::EACCES));
        }
        let size = usize::try_from(size).map_err(|_| failure("size out of range"))?;
        lock(&self.data).resize(size, 0);
        self.dirty = true;
        self.touch();
        Ok(())
    }

    fn set_pipelined(&mut self, _pipelined: bool) {}
}

impl AsyncRead for MemoryFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.check()?;
        if !self.flags.contains(OpenFlags::READ) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "not opened for reading",
            )));
        }
        let data = self.data.clone();
        let data = lock(&data);
        let start = usize::try_from(self.position).unwrap_or(usize::MAX).min(data.len());
        let count = buf.remaining().min(data.len() - start);
        buf.put_slice(&data[start..start + count]);
        self.position += count as u64;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MemoryFile {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.check()?;
        if !self.flags.contains(OpenFlags::WRITE) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "not opened for writing",
            )));
        }
        let data = self.data.clone();
        let mut data = lock(&data);
        if self.flags.contains(OpenFlags::APPEND) {
            self.position = data.len() as u64;
        }
        let start = usize::try_from(self.position).unwrap_or(usize::MAX);
        if data.len() < start + buf.len() {
            data.resize(start + buf.len(), 0);
        }
        data[start..start + buf.len()].copy_from_slice(buf);
        self.position += buf.len() as u64;
        self.dirty = true;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.touch();
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.touch();
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for MemoryFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let len = lock(&self.data).len() as i64;
        let target = match position {
            SeekFrom::Start(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
            SeekFrom::Current(offset) => self.position as i64 + offset,
            SeekFrom::End(offset) => len + offset,
        };
        if target < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "negative seek position"));
        }
        self.seek_target = Some(target as u64);
        Ok(())
    }

    fn poll_complete(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        if let Some(target) = self.seek_target.take() {
            self.position = target;
        }
        Poll::Ready(Ok(self.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directories_conflate_missing_and_not_a_directory() {
        let remote = MemoryRemote::new();
        remote.seed_file("/a/file.txt", b"x");
        let sftp = remote.sftp();

        let names: Vec<String> = sftp
            .read_dir("/a")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["file.txt"]);
        assert!(matches!(
            sftp.read_dir("/a/file.txt").await,
            Err(RemoteError::Os { errno, .. }) if errno == Errno::ENOENT as i32
        ));
    }

    #[tokio::test]
    async fn children_are_direct_only() {
        let remote = MemoryRemote::new();
        remote.seed_file("/a/b/c.txt", b"").seed_file("/ab.txt", b"");
        let sftp = remote.sftp();

        let mut root: Vec<String> = sftp
            .read_dir("/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        root.sort();
        assert_eq!(root, vec!["a", "ab.txt"]);
        let nested: Vec<String> = sftp
            .read_dir("/a")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(nested, vec!["b"]);
    }

    #[tokio::test]
    async fn exec_answers_from_table() {
        let remote = MemoryRemote::new();
        let output = remote.exec("uname -s").await.unwrap();
        assert_eq!(output.stdout, b"Linux\n");
        let missing = remote.exec("sysinfo").await.unwrap();
        assert!(!missing.stderr.is_empty());
        remote.fail_exec(true);
        assert!(remote.exec("uname -s").await.is_err());
        assert_eq!(remote.exec_log().len(), 3);
    }
}
