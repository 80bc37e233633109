//! Namespaced resource metadata.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::{
    permissions::Permissions,
    platform::Platform,
    remote::{RemoteStat, S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK},
};

/// A named subset of metadata fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Basic,
    Details,
    Access,
    Stat,
    Lstat,
    Link,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Basic => "basic",
            Namespace::Details => "details",
            Namespace::Access => "access",
            Namespace::Stat => "stat",
            Namespace::Lstat => "lstat",
            Namespace::Link => "link",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResourceType {
    Unknown = 0,
    Directory = 1,
    File = 2,
    Character = 3,
    BlockSpecialFile = 4,
    Fifo = 5,
    Socket = 6,
    Symlink = 7,
}

impl ResourceType {
    pub fn from_mode(mode: u32) -> ResourceType {
        match mode & S_IFMT {
            S_IFDIR => ResourceType::Directory,
            S_IFREG => ResourceType::File,
            S_IFCHR => ResourceType::Character,
            S_IFBLK => ResourceType::BlockSpecialFile,
            S_IFIFO => ResourceType::Fifo,
            S_IFSOCK => ResourceType::Socket,
            S_IFLNK => ResourceType::Symlink,
            _ => ResourceType::Unknown,
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Basic {
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Details {
    pub accessed: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub metadata_changed: Option<DateTime<Utc>>,
    pub size: u64,
    pub resource_type: ResourceType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub permissions: Option<Permissions>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub user: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// `None` unless the resource is a symlink.
    pub target: Option<String>,
}

/// Metadata of a single resource, restricted to the namespaces requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub basic: Basic,
    pub details: Option<Details>,
    pub access: Option<Access>,
    pub stat: Option<RemoteStat>,
    pub lstat: Option<RemoteStat>,
    pub link: Option<Link>,
}

pub(crate) fn timestamp(seconds: Option<u32>) -> Option<DateTime<Utc>> {
    seconds.and_then(|seconds| DateTime::from_timestamp(i64::from(seconds), 0))
}

impl Basic {
    pub fn from_stat(name: &str, stat: &RemoteStat) -> Basic {
        Basic {
            name: name.to_owned(),
            is_dir: stat.is_dir(),
        }
    }
}

impl Details {
    /// Maps stat times; on win32 the change time stands in for the creation
    /// time, elsewhere it is the metadata change time.
    pub fn from_stat(stat: &RemoteStat, platform: Platform) -> Details {
        let mut details = Details {
            accessed: timestamp(stat.atime),
            modified: timestamp(stat.mtime),
            created: timestamp(stat.birthtime),
            metadata_changed: None,
            size: stat.size.unwrap_or(0),
            resource_type: stat.mode.map(ResourceType::from_mode).unwrap_or(ResourceType::Unknown),
        };
        if platform == Platform::Win32 {
            details.created = timestamp(stat.ctime);
        } else {
            details.metadata_changed = timestamp(stat.ctime);
        }
        details
    }
}

impl Access {
    /// Access fields without resolved names.
    pub fn from_stat(stat: &RemoteStat) -> Access {
        Access {
            permissions: stat.mode.map(Permissions::from_mode),
            uid: stat.uid,
            gid: stat.gid,
            user: stat.user.clone(),
            group: stat.group.clone(),
        }
    }
}

impl Info {
    pub fn new(basic: Basic) -> Info {
        Info {
            basic,
            details: None,
            access: None,
            stat: None,
            lstat: None,
            link: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.basic.name
    }

    pub fn is_dir(&self) -> bool {
        self.basic.is_dir
    }

    pub fn is_file(&self) -> bool {
        !self.basic.is_dir
    }

    pub fn has_namespace(&self, namespace: Namespace) -> bool {
        match namespace {
            Namespace::Basic => true,
            Namespace::Details => self.details.is_some(),
            Namespace::Access => self.access.is_some(),
            Namespace::Stat => self.stat.is_some(),
            Namespace::Lstat => self.lstat.is_some(),
            Namespace::Link => self.link.is_some(),
        }
    }

    pub fn resource_type(&self) -> Option<ResourceType> {
        self.details.as_ref().map(|details| details.resource_type)
    }

    pub fn size(&self) -> Option<u64> {
        self.details.as_ref().map(|details| details.size)
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.details.as_ref().and_then(|details| details.modified)
    }

    pub fn accessed(&self) -> Option<DateTime<Utc>> {
        self.details.as_ref().and_then(|details| details.accessed)
    }

    pub fn permissions(&self) -> Option<Permissions> {
        self.access.as_ref().and_then(|access| access.permissions)
    }

    pub fn is_link(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.target.is_some())
    }
}

/// Writable timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailsUpdate {
    pub accessed: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// Writable access fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessUpdate {
    pub permissions: Option<Permissions>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Input of `setinfo`: only the namespaces present are applied.
///
/// A `details` namespace with neither time set touches both times to the
/// current remote time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoUpdate {
    pub details: Option<DetailsUpdate>,
    pub access: Option<AccessUpdate>,
}

impl InfoUpdate {
    pub fn new() -> InfoUpdate {
        InfoUpdate::default()
    }

    pub fn modified(&mut self, modified: DateTime<Utc>) -> &mut Self {
        self.details.get_or_insert_with(Default::default).modified = Some(modified);
        self
    }

    pub fn accessed(&mut self, accessed: DateTime<Utc>) -> &mut Self {
        self.details.get_or_insert_with(Default::default).accessed = Some(accessed);
        self
    }

    /// Requests both times be set to "now".
    pub fn touch(&mut self) -> &mut Self {
        self.details.get_or_insert_with(Default::default);
        self
    }

    pub fn permissions(&mut self, permissions: Permissions) -> &mut Self {
        self.access.get_or_insert_with(Default::default).permissions = Some(permissions);
        self
    }

    pub fn uid(&mut self, uid: u32) -> &mut Self {
        self.access.get_or_insert_with(Default::default).uid = Some(uid);
        self
    }

    pub fn gid(&mut self, gid: u32) -> &mut Self {
        self.access.get_or_insert_with(Default::default).gid = Some(gid);
        self
    }

    pub fn build(&mut self) -> InfoUpdate {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_stat() -> RemoteStat {
        RemoteStat {
            size: Some(12),
            uid: Some(1000),
            gid: Some(100),
            mode: Some(S_IFREG | 0o640),
            atime: Some(1_600_000_000),
            mtime: Some(1_600_000_100),
            ctime: Some(1_600_000_200),
            ..Default::default()
        }
    }

    #[test]
    fn details_ctime_slot_depends_on_platform() {
        let posix = Details::from_stat(&file_stat(), Platform::Linux);
        assert_eq!(posix.created, None);
        assert_eq!(posix.metadata_changed, timestamp(Some(1_600_000_200)));
        assert_eq!(posix.size, 12);
        assert_eq!(posix.resource_type, ResourceType::File);
        assert_eq!(posix.modified.map(|t| t.timestamp()), Some(1_600_000_100));

        let windows = Details::from_stat(&file_stat(), Platform::Win32);
        assert_eq!(windows.created, timestamp(Some(1_600_000_200)));
        assert_eq!(windows.metadata_changed, None);
    }

    #[test]
    fn resource_type_codes() {
        assert_eq!(ResourceType::from_mode(S_IFDIR | 0o755).code(), 1);
        assert_eq!(ResourceType::from_mode(S_IFLNK).code(), 7);
        assert_eq!(ResourceType::from_mode(S_IFSOCK).code(), 6);
        assert_eq!(ResourceType::from_mode(0).code(), 0);
    }

    #[test]
    fn access_from_stat() {
        let access = Access::from_stat(&file_stat());
        assert_eq!(access.permissions, Some(Permissions::from_mode(0o640)));
        assert_eq!(access.uid, Some(1000));
        assert_eq!(access.gid, Some(100));
        assert_eq!(access.user, None);
    }

    #[test]
    fn info_update_builder() {
        let update = InfoUpdate::new().gid(8000).touch().build();
        assert_eq!(update.details, Some(DetailsUpdate::default()));
        assert_eq!(update.access.and_then(|access| access.uid), None);
    }
}
