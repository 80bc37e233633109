use std::{error::Error as StdError, io};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

/// Errors surfaced by every filesystem operation.
///
/// Transport and protocol failures never cross the crate boundary as-is: they
/// are translated into one of these kinds at the call site (see
/// [`convert_errors`](crate::convert::convert_errors)).
#[derive(Debug, Error)]
pub enum FsError {
    #[error("resource '{path}' not found")]
    ResourceNotFound { path: String },
    #[error("path '{path}' should be a file")]
    FileExpected { path: String },
    #[error("path '{path}' should be a directory")]
    DirectoryExpected { path: String },
    #[error("file '{path}' exists")]
    FileExists { path: String },
    #[error("directory '{path}' exists")]
    DirectoryExists { path: String },
    #[error("directory '{path}' is not empty")]
    DirectoryNotEmpty { path: String },
    #[error("destination '{path}' exists")]
    DestinationExists { path: String },
    #[error("insufficient storage space for '{path}'")]
    InsufficientStorage { path: String },
    #[error("permission denied for '{path}'")]
    PermissionDenied { path: String },
    #[error("path '{path}' is invalid: {message}")]
    PathError { path: String, message: String },
    #[error("operation '{op}' is not supported for '{path}'")]
    Unsupported { op: String, path: String },
    #[error("remote connection error: {message}")]
    RemoteConnection { message: String },
    #[error("unable to create filesystem: {message}")]
    CreateFailed {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
    #[error("no '{purpose}' URL available for '{path}'")]
    NoUrl { path: String, purpose: String },
    #[error("operation '{op}' failed for '{path}': {message}")]
    OperationFailed { op: String, path: String, message: String },
    #[error("filesystem is closed")]
    FilesystemClosed,
    #[error("path '{path}' contains back-references outside of the filesystem")]
    IllegalBackReference { path: String },
    #[error("path '{path}' is invalid: {message}")]
    InvalidPath { path: String, message: String },
    #[error("mode '{mode}' is invalid: {message}")]
    InvalidMode { mode: String, message: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("local I/O: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Self::ResourceNotFound { path: path.into() }
    }

    pub(crate) fn file_expected(path: impl Into<String>) -> Self {
        Self::FileExpected { path: path.into() }
    }

    pub(crate) fn directory_expected(path: impl Into<String>) -> Self {
        Self::DirectoryExpected { path: path.into() }
    }

    pub(crate) fn create_failed<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::CreateFailed {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns `true` for failures of the underlying session rather than of the
    /// requested operation.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::RemoteConnection { .. })
    }
}
