use std::{path::PathBuf, time::Duration};

use crate::ssh_config::{expand_home, SshConfig};

pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(10);
pub const DEFAULT_CONFIG_PATH: &str = "~/.ssh/config";

/// What to do with a host key that is not in the known-hosts file. Changed
/// keys are always rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Trust the key and add it to the known-hosts file.
    #[default]
    AutoAdd,
    /// Trust the key for this connection only and log a warning.
    Warn,
    Reject,
}

/// Everything needed to open an [`SshFs`](crate::SshFs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) user: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) key_file: Option<PathBuf>,
    pub(crate) timeout: Duration,
    pub(crate) keepalive: Duration,
    pub(crate) compress: bool,
    pub(crate) config_path: Option<PathBuf>,
    pub(crate) exec_timeout: Option<Duration>,
    pub(crate) host_key_policy: HostKeyPolicy,
    pub(crate) known_hosts: Option<PathBuf>,
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>) -> ConnectionParams {
        ConnectionParams {
            host: host.into(),
            port: DEFAULT_PORT,
            user: None,
            password: None,
            key_file: None,
            timeout: DEFAULT_TIMEOUT,
            keepalive: DEFAULT_KEEPALIVE,
            compress: false,
            config_path: Some(expand_home(DEFAULT_CONFIG_PATH)),
            exec_timeout: None,
            host_key_policy: HostKeyPolicy::default(),
            known_hosts: None,
        }
    }

    pub fn port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn user(&mut self, user: impl Into<String>) -> &mut Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(&mut self, password: impl Into<String>) -> &mut Self {
        self.password = Some(password.into());
        self
    }

    pub fn key_file(&mut self, key_file: impl Into<PathBuf>) -> &mut Self {
        self.key_file = Some(key_file.into());
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// A zero interval disables keepalive.
    pub fn keepalive(&mut self, keepalive: Duration) -> &mut Self {
        self.keepalive = keepalive;
        self
    }

    pub fn compress(&mut self, compress: bool) -> &mut Self {
        self.compress = compress;
        self
    }

    /// `~` is expanded; `None` skips the client configuration entirely.
    pub fn config_path(&mut self, config_path: Option<&str>) -> &mut Self {
        self.config_path = config_path.map(expand_home);
        self
    }

    pub fn exec_timeout(&mut self, exec_timeout: Duration) -> &mut Self {
        self.exec_timeout = Some(exec_timeout);
        self
    }

    pub fn host_key_policy(&mut self, policy: HostKeyPolicy) -> &mut Self {
        self.host_key_policy = policy;
        self
    }

    pub fn known_hosts(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.known_hosts = Some(path.into());
        self
    }

    pub fn build(&mut self) -> ConnectionParams {
        self.clone()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Falls back to the connection timeout.
    pub fn effective_exec_timeout(&self) -> Duration {
        self.exec_timeout.unwrap_or(self.timeout)
    }

    /// Applies the client configuration entry for the host alias.
    ///
    /// Hostname, port and identity file come from the entry when it has
    /// them. The user is the explicit one, else the entry's, else the local
    /// login name.
    pub fn resolve(&self) -> ResolvedParams {
        let entry = self
            .config_path
            .as_deref()
            .map(|path| SshConfig::load(path).lookup(&self.host))
            .unwrap_or_default();

        ResolvedParams {
            hostname: entry.hostname.unwrap_or_else(|| self.host.clone()),
            port: entry.port.unwrap_or(self.port),
            user: self
                .user
                .clone()
                .or(entry.user)
                .unwrap_or_else(local_user),
            key_file: entry.identity_files.into_iter().next().or_else(|| self.key_file.clone()),
        }
    }
}

/// Connection target after applying the client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParams {
    pub hostname: String,
    pub port: u16,
    pub user: String,
    pub key_file: Option<PathBuf>,
}

fn local_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_owned())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        let params = ConnectionParams::new("example.com");
        assert_eq!(params.port, 22);
        assert_eq!(params.timeout, Duration::from_secs(10));
        assert_eq!(params.keepalive, Duration::from_secs(10));
        assert!(!params.compress);
        assert_eq!(params.host_key_policy, HostKeyPolicy::AutoAdd);
        assert_eq!(params.effective_exec_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn resolve_with_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "Host alias\n  HostName real.example.com\n  Port 2200\n  User configured\n  IdentityFile /keys/id"
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_owned();
        let explicit = ConnectionParams::new("alias")
            .user("explicit")
            .port(22)
            .key_file("/keys/other")
            .config_path(Some(&path))
            .build()
            .resolve();
        assert_eq!(explicit.hostname, "real.example.com");
        assert_eq!(explicit.port, 2200);
        assert_eq!(explicit.user, "explicit");
        assert_eq!(explicit.key_file, Some(PathBuf::from("/keys/id")));

        let implicit = ConnectionParams::new("alias").config_path(Some(&path)).build().resolve();
        assert_eq!(implicit.user, "configured");

        let other = ConnectionParams::new("other").config_path(Some(&path)).build().resolve();
        assert_eq!(other.hostname, "other");
        assert_eq!(other.port, 22);
        assert_eq!(other.key_file, None);
    }
}
