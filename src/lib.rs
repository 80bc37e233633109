pub mod command;
pub mod config;
pub mod convert;
pub mod error;
pub mod file;
pub mod filesystem;
pub mod info;
pub mod mode;
pub mod opener;
pub mod path;
pub mod permissions;
pub mod platform;
pub mod remote;
pub mod ssh_config;
pub mod sshfs;
pub mod subfs;

#[cfg(feature = "russh")]
pub mod impl_russh;

#[cfg(feature = "memory")]
pub mod memory;

pub use config::{ConnectionParams, HostKeyPolicy};
pub use error::{FsError, Result};
pub use file::{OpenOptions, SshFile, Whence};
pub use filesystem::{Filesystem, Page};
pub use info::{Info, InfoUpdate, Namespace, ResourceType};
#[cfg(feature = "russh")]
pub use opener::open_url;
pub use opener::FsUrl;
pub use permissions::Permissions;
pub use platform::Platform;
pub use sshfs::SshFs;
pub use subfs::SubFs;
