//! Translation of transport errors into [`FsError`].

use std::{future::Future, io};

use log::{debug, info};
use nix::errno::Errno;

use crate::{
    error::{FsError, Result},
    remote::{RemoteError, RemoteResult},
};

/// Machine is not on the network (ENONET on Linux, not exposed by `nix` on
/// every target).
const RAW_ENONET: i32 = 64;
/// Windows ERROR_ALREADY_EXISTS, reported by some SFTP servers on Windows.
const RAW_ALREADY_EXISTS: i32 = 183;

/// Describes the remote call an error originated from.
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext<'a> {
    pub op: &'a str,
    pub path: &'a str,
    /// Use the directory table (wrong type maps to DirectoryExpected).
    pub directory: bool,
    /// `user@host:port`, named in connection errors.
    pub endpoint: &'a str,
}

impl<'a> ErrorContext<'a> {
    pub fn file(op: &'a str, path: &'a str, endpoint: &'a str) -> Self {
        Self {
            op,
            path,
            directory: false,
            endpoint,
        }
    }

    pub fn directory(op: &'a str, path: &'a str, endpoint: &'a str) -> Self {
        Self {
            op,
            path,
            directory: true,
            endpoint,
        }
    }
}

/// Runs a unit of remote work, translating any failure with `ctx`.
pub async fn convert_errors<T, F>(ctx: ErrorContext<'_>, work: F) -> Result<T>
where
    F: Future<Output = RemoteResult<T>>,
{
    debug!("{} {}", ctx.op, ctx.path);
    work.await.map_err(|error| convert(ctx, error))
}

/// Translates a single transport error.
pub fn convert(ctx: ErrorContext<'_>, error: RemoteError) -> FsError {
    let path = ctx.path.to_owned();
    match error {
        RemoteError::Os { errno, message } => {
            let mapped = if ctx.directory {
                directory_error(errno, &path)
            } else {
                file_error(errno, &path)
            };
            match mapped {
                Some(FsError::RemoteConnection { .. }) => connection_lost(ctx, &message),
                Some(error) => error,
                None => FsError::OperationFailed {
                    op: ctx.op.to_owned(),
                    path,
                    message,
                },
            }
        }
        RemoteError::Failure(message) => FsError::OperationFailed {
            op: ctx.op.to_owned(),
            path,
            message,
        },
        RemoteError::Local(message) => FsError::Io(io::Error::other(message)),
        transport => connection_lost(ctx, &transport.to_string()),
    }
}

fn connection_lost(ctx: ErrorContext<'_>, cause: &str) -> FsError {
    info!("connection to {} failed during {} {}: {cause}", ctx.endpoint, ctx.op, ctx.path);
    FsError::RemoteConnection {
        message: format!(
            "connection to {} failed during {} on '{}': {cause}",
            ctx.endpoint, ctx.op, ctx.path
        ),
    }
}

fn file_error(errno: i32, path: &str) -> Option<FsError> {
    let path = path.to_owned();
    Some(match errno {
        RAW_ALREADY_EXISTS => FsError::DirectoryExists { path },
        RAW_ENONET => FsError::RemoteConnection { message: String::new() },
        _ => match Errno::from_raw(errno) {
            Errno::ENETDOWN | Errno::ECONNRESET => FsError::RemoteConnection {
                message: String::new(),
            },
            Errno::ENOENT | Errno::EFAULT | Errno::ESRCH | Errno::ENOTDIR => {
                FsError::ResourceNotFound { path }
            }
            Errno::ENOTEMPTY => FsError::DirectoryNotEmpty { path },
            Errno::EEXIST => FsError::FileExists { path },
            Errno::EISDIR | Errno::EINVAL => FsError::FileExpected { path },
            Errno::ENOSPC => FsError::InsufficientStorage { path },
            Errno::EPERM | Errno::EACCES => FsError::PermissionDenied { path },
            Errno::ENAMETOOLONG => FsError::PathError {
                message: "name too long".to_owned(),
                path,
            },
            Errno::EOPNOTSUPP | Errno::ENOSYS => FsError::Unsupported {
                op: "remote".to_owned(),
                path,
            },
            _ => return None,
        },
    })
}

fn directory_error(errno: i32, path: &str) -> Option<FsError> {
    match Errno::from_raw(errno) {
        Errno::ENOTDIR | Errno::EINVAL => Some(FsError::directory_expected(path)),
        Errno::EEXIST => Some(FsError::DirectoryExists { path: path.to_owned() }),
        _ => file_error(errno, path),
    }
}

/// Runs `work`, discarding connection failures. Only for teardown paths where
/// a dead session is as good as a closed one.
pub async fn ignore_network_errors<F>(op: &str, work: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match work.await {
        Err(FsError::RemoteConnection { message }) => {
            info!("ignoring network error during {op}: {message}");
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "user@example.com:22";

    fn os(errno: Errno) -> RemoteError {
        RemoteError::errno(errno)
    }

    #[test]
    fn file_table() {
        let ctx = ErrorContext::file("remove", "/a", ENDPOINT);
        assert!(matches!(convert(ctx, os(Errno::ENOENT)), FsError::ResourceNotFound { .. }));
        assert!(matches!(convert(ctx, os(Errno::ENOTDIR)), FsError::ResourceNotFound { .. }));
        assert!(matches!(convert(ctx, os(Errno::EEXIST)), FsError::FileExists { .. }));
        assert!(matches!(convert(ctx, os(Errno::EISDIR)), FsError::FileExpected { .. }));
        assert!(matches!(convert(ctx, os(Errno::ENOTEMPTY)), FsError::DirectoryNotEmpty { .. }));
        assert!(matches!(convert(ctx, os(Errno::ENOSPC)), FsError::InsufficientStorage { .. }));
        assert!(matches!(convert(ctx, os(Errno::EACCES)), FsError::PermissionDenied { .. }));
        assert!(matches!(convert(ctx, os(Errno::ENAMETOOLONG)), FsError::PathError { .. }));
        assert!(matches!(convert(ctx, os(Errno::EOPNOTSUPP)), FsError::Unsupported { .. }));
        assert!(matches!(
            convert(ctx, RemoteError::Os { errno: 183, message: String::new() }),
            FsError::DirectoryExists { .. }
        ));
    }

    #[test]
    fn directory_table_prefers_directory_kinds() {
        let ctx = ErrorContext::directory("listdir", "/a", ENDPOINT);
        assert!(matches!(convert(ctx, os(Errno::ENOTDIR)), FsError::DirectoryExpected { .. }));
        assert!(matches!(convert(ctx, os(Errno::EINVAL)), FsError::DirectoryExpected { .. }));
        assert!(matches!(convert(ctx, os(Errno::EEXIST)), FsError::DirectoryExists { .. }));
        assert!(matches!(convert(ctx, os(Errno::ENOENT)), FsError::ResourceNotFound { .. }));
    }

    #[test]
    fn transport_failures_are_connection_errors() {
        let ctx = ErrorContext::file("getinfo", "/a", ENDPOINT);
        for error in [
            RemoteError::Eof,
            RemoteError::Timeout,
            RemoteError::Ssh("bad mac".into()),
            RemoteError::Socket("reset".into()),
            RemoteError::ConnectionLost("gone".into()),
            os(Errno::ECONNRESET),
            RemoteError::Os { errno: 64, message: "not on network".into() },
        ] {
            match convert(ctx, error) {
                FsError::RemoteConnection { message } => {
                    assert!(message.contains(ENDPOINT));
                    assert!(message.contains("getinfo"));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn unmapped_errors_are_operation_failures() {
        let ctx = ErrorContext::file("openbin", "/a", ENDPOINT);
        assert!(matches!(convert(ctx, os(Errno::EXDEV)), FsError::OperationFailed { .. }));
        assert!(matches!(
            convert(ctx, RemoteError::Failure("nope".into())),
            FsError::OperationFailed { .. }
        ));
    }

    #[tokio::test]
    async fn ignore_network_errors_only_swallows_connection_errors() {
        let ignored = ignore_network_errors("close", async {
            Err(FsError::RemoteConnection { message: "gone".into() })
        })
        .await;
        assert!(ignored.is_ok());

        let kept = ignore_network_errors("close", async { Err(FsError::not_found("/a")) }).await;
        assert!(matches!(kept, Err(FsError::ResourceNotFound { .. })));
    }
}
