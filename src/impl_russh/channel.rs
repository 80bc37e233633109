use async_trait::async_trait;
use chrono::Utc;
use nix::errno::Errno;
use russh_sftp::{
    client::{error::Error as SftpError, fs::Metadata, SftpSession},
    protocol::{OpenFlags as SftpOpenFlags, Status},
};

use crate::remote::{
    OpenFlags, RemoteDirEntry, RemoteError, RemoteFile, RemoteResult, RemoteStat, SftpChannel,
};

use super::RusshFile;

// SSH_FXP_STATUS codes, see draft-ietf-secsh-filexfer-02 section 7.
const FX_EOF: u32 = 1;
const FX_NO_SUCH_FILE: u32 = 2;
const FX_PERMISSION_DENIED: u32 = 3;
const FX_NO_CONNECTION: u32 = 6;
const FX_CONNECTION_LOST: u32 = 7;
const FX_OP_UNSUPPORTED: u32 = 8;

/// An SFTP sub-channel driven by `russh-sftp`.
pub struct RusshSftp {
    session: SftpSession,
}

impl RusshSftp {
    pub fn new(session: SftpSession) -> Self {
        Self { session }
    }
}

pub(super) fn status_error(status: Status) -> RemoteError {
    match status.status_code as u32 {
        FX_NO_SUCH_FILE => RemoteError::errno(Errno::ENOENT),
        FX_PERMISSION_DENIED => RemoteError::errno(Errno::EACCES),
        FX_OP_UNSUPPORTED => RemoteError::errno(Errno::EOPNOTSUPP),
        FX_NO_CONNECTION | FX_CONNECTION_LOST => RemoteError::ConnectionLost(status.error_message),
        FX_EOF => RemoteError::Failure("end of file".to_owned()),
        _ => RemoteError::Failure(status.error_message),
    }
}

pub(super) fn sftp_error(err: SftpError) -> RemoteError {
    match err {
        SftpError::Status(status) => status_error(status),
        SftpError::Timeout => RemoteError::Timeout,
        // the channel behind the session is gone
        SftpError::IO(message)
            if message.starts_with("SendError") || message.starts_with("RecvError") =>
        {
            RemoteError::ConnectionLost(message)
        }
        SftpError::IO(message) => RemoteError::Socket(message),
        SftpError::Limited(message) => RemoteError::Failure(message),
        other => RemoteError::Ssh(other.to_string()),
    }
}

fn attributes() -> Metadata {
    Metadata {
        size: None,
        uid: None,
        user: None,
        gid: None,
        group: None,
        permissions: None,
        atime: None,
        mtime: None,
    }
}

pub(super) fn to_stat(metadata: Metadata) -> RemoteStat {
    RemoteStat {
        size: metadata.size,
        uid: metadata.uid,
        gid: metadata.gid,
        mode: metadata.permissions,
        atime: metadata.atime,
        mtime: metadata.mtime,
        user: metadata.user,
        group: metadata.group,
        ..Default::default()
    }
}

#[async_trait]
impl SftpChannel for RusshSftp {
    async fn stat(&self, path: &str) -> RemoteResult<RemoteStat> {
        self.session.metadata(path).await.map(to_stat).map_err(sftp_error)
    }

    async fn lstat(&self, path: &str) -> RemoteResult<RemoteStat> {
        self.session.symlink_metadata(path).await.map(to_stat).map_err(sftp_error)
    }

    async fn read_dir(&self, path: &str) -> RemoteResult<Vec<RemoteDirEntry>> {
        let entries = self.session.read_dir(path).await.map_err(sftp_error)?;
        Ok(entries
            .map(|entry| RemoteDirEntry {
                name: entry.file_name(),
                stat: to_stat(entry.metadata()),
            })
            .collect())
    }

    async fn open(&self, path: &str, flags: OpenFlags) -> RemoteResult<Box<dyn RemoteFile>> {
        let file = self
            .session
            .open_with_flags(path, SftpOpenFlags::from_bits_truncate(flags.bits()))
            .await
            .map_err(sftp_error)?;
        Ok(Box::new(RusshFile::new(file)))
    }

    async fn mkdir(&self, path: &str, mode: u32) -> RemoteResult<()> {
        self.session.create_dir(path).await.map_err(sftp_error)?;
        self.chmod(path, mode).await
    }

    async fn rmdir(&self, path: &str) -> RemoteResult<()> {
        self.session.remove_dir(path).await.map_err(sftp_error)
    }

    async fn remove(&self, path: &str) -> RemoteResult<()> {
        self.session.remove_file(path).await.map_err(sftp_error)
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> RemoteResult<()> {
        self.session.rename(old_path, new_path).await.map_err(sftp_error)
    }

    async fn symlink(&self, path: &str, target: &str) -> RemoteResult<()> {
        self.session.symlink(path, target).await.map_err(sftp_error)
    }

    async fn read_link(&self, path: &str) -> RemoteResult<String> {
        self.session.read_link(path).await.map_err(sftp_error)
    }

    async fn chmod(&self, path: &str, mode: u32) -> RemoteResult<()> {
        let metadata = Metadata {
            permissions: Some(mode),
            ..attributes()
        };
        self.session.set_metadata(path, metadata).await.map_err(sftp_error)
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> RemoteResult<()> {
        let metadata = Metadata {
            uid: Some(uid),
            gid: Some(gid),
            ..attributes()
        };
        self.session.set_metadata(path, metadata).await.map_err(sftp_error)
    }

    /// The protocol has no "now" marker, so `None` sends the local time.
    async fn utime(&self, path: &str, times: Option<(u32, u32)>) -> RemoteResult<()> {
        let (atime, mtime) = times.unwrap_or_else(|| {
            let now = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX);
            (now, now)
        });
        let metadata = Metadata {
            atime: Some(atime),
            mtime: Some(mtime),
            ..attributes()
        };
        self.session.set_metadata(path, metadata).await.map_err(sftp_error)
    }

    async fn close(&self) -> RemoteResult<()> {
        self.session.close().await.map_err(sftp_error)
    }
}

#[cfg(test)]
mod tests {
    use russh_sftp::protocol::StatusCode;

    use super::*;

    fn status(status_code: StatusCode, message: &str) -> Status {
        Status {
            id: 1,
            status_code,
            error_message: message.to_owned(),
            language_tag: "en-US".to_owned(),
        }
    }

    #[test]
    fn status_codes_become_errnos() {
        assert!(matches!(
            status_error(status(StatusCode::NoSuchFile, "no such file")),
            RemoteError::Os { errno, .. } if errno == Errno::ENOENT as i32
        ));
        assert!(matches!(
            status_error(status(StatusCode::OpUnsupported, "nope")),
            RemoteError::Os { errno, .. } if errno == Errno::EOPNOTSUPP as i32
        ));
        assert!(status_error(status(StatusCode::ConnectionLost, "gone")).is_transport());
        assert!(matches!(
            status_error(status(StatusCode::Failure, "failure")),
            RemoteError::Failure(message) if message == "failure"
        ));
    }

    #[test]
    fn closed_channel_is_connection_loss() {
        assert!(sftp_error(SftpError::IO("SendError: channel closed".to_owned())).is_transport());
        assert!(matches!(sftp_error(SftpError::Timeout), RemoteError::Timeout));
    }
}
