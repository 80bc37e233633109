mod channel;
mod file;

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, info, warn};
use russh::{
    client::{self, Handle},
    ChannelMsg, Disconnect, Preferred,
};
use russh_keys::key::{KeyPair, PublicKey};
use russh_sftp::client::SftpSession;
use thiserror::Error;
use tokio::sync::Mutex;

pub use channel::RusshSftp;
pub use file::RusshFile;

use crate::{
    config::{ConnectionParams, HostKeyPolicy, ResolvedParams},
    remote::{CommandOutput, RemoteError, RemoteResult, RemoteSession, SftpChannel},
    ssh_config::expand_home,
};

/// Private keys tried when no identity file is configured.
const DEFAULT_IDENTITIES: [&str; 3] = ["~/.ssh/id_ed25519", "~/.ssh/id_ecdsa", "~/.ssh/id_rsa"];

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),
    #[error("unable to connect: {0}")]
    Connection(#[source] russh::Error),
    #[error("unable to load key '{path}': {source}")]
    Key {
        path: PathBuf,
        #[source]
        source: russh_keys::Error,
    },
    #[error("authentication failed for user '{0}'")]
    Authentication(String),
    #[error("unable to open channel: {0}")]
    Channel(#[source] russh::Error),
    #[error("unable to start sftp: {0}")]
    Sftp(#[source] russh_sftp::client::error::Error),
}

/// Checks server keys against a known-hosts file.
pub struct HostKeyHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: Option<PathBuf>,
}

impl HostKeyHandler {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        policy: HostKeyPolicy,
        known_hosts: Option<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
            known_hosts,
        }
    }

    fn check(&self, key: &PublicKey) -> Result<bool, russh_keys::Error> {
        match &self.known_hosts {
            Some(path) => russh_keys::check_known_hosts_path(&self.host, self.port, key, path),
            None => russh_keys::check_known_hosts(&self.host, self.port, key),
        }
    }

    fn learn(&self, key: &PublicKey) -> Result<(), russh_keys::Error> {
        match &self.known_hosts {
            Some(path) => russh_keys::learn_known_hosts_path(&self.host, self.port, key, path),
            None => russh_keys::learn_known_hosts(&self.host, self.port, key),
        }
    }
}

#[async_trait]
impl client::Handler for HostKeyHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.check(server_public_key) {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(russh_keys::Error::KeyChanged { line }) => {
                warn!(
                    "host key of {}:{} does not match known hosts line {line}",
                    self.host, self.port
                );
                return Ok(false);
            }
            Err(err) => debug!("unable to read known hosts: {err}"),
        }

        match self.policy {
            HostKeyPolicy::AutoAdd => {
                if let Err(err) = self.learn(server_public_key) {
                    warn!("unable to record host key of {}: {err}", self.host);
                }
                Ok(true)
            }
            HostKeyPolicy::Warn => {
                warn!("unknown host key for {}:{}", self.host, self.port);
                Ok(true)
            }
            HostKeyPolicy::Reject => {
                warn!("rejecting unknown host key for {}:{}", self.host, self.port);
                Ok(false)
            }
        }
    }
}

/// An authenticated russh connection with its primary SFTP channel.
pub struct RusshSession {
    handle_mutex: Arc<Mutex<Handle<HostKeyHandler>>>,
    sftp: Arc<RusshSftp>,
}

impl RusshSession {
    async fn open_sftp_session(&self) -> Result<SftpSession, ConnectError> {
        let handle = self.handle_mutex.lock().await;
        start_sftp(&handle).await
    }
}

#[async_trait]
impl RemoteSession for RusshSession {
    fn sftp(&self) -> Arc<dyn SftpChannel> {
        self.sftp.clone()
    }

    async fn open_sftp(&self) -> RemoteResult<Arc<dyn SftpChannel>> {
        let session = self.open_sftp_session().await.map_err(|err| match err {
            ConnectError::Channel(err) => ssh_error(err),
            other => RemoteError::Ssh(other.to_string()),
        })?;
        Ok(Arc::new(RusshSftp::new(session)))
    }

    async fn exec(&self, command: &str) -> RemoteResult<CommandOutput> {
        let mut channel = {
            let handle = self.handle_mutex.lock().await;
            handle.channel_open_session().await.map_err(ssh_error)?
        };
        channel.exec(true, command).await.map_err(ssh_error)?;

        let mut output = CommandOutput::default();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                // ext 1 is stderr according to SSH spec
                ChannelMsg::ExtendedData { data, ext: 1 } => output.stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
                _ => {}
            }
        }
        Ok(output)
    }

    async fn close(&self) -> RemoteResult<()> {
        if let Err(err) = self.sftp.close().await {
            debug!("closing sftp channel: {err}");
        }
        let handle = self.handle_mutex.lock().await;
        handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(ssh_error)
    }
}

pub(crate) fn ssh_error(err: russh::Error) -> RemoteError {
    let message = err.to_string();
    match err {
        russh::Error::IO(err) => err.into(),
        russh::Error::ConnectionTimeout => RemoteError::Timeout,
        russh::Error::Disconnect | russh::Error::SendError => RemoteError::ConnectionLost(message),
        _ => RemoteError::Ssh(message),
    }
}

async fn start_sftp(handle: &Handle<HostKeyHandler>) -> Result<SftpSession, ConnectError> {
    let channel = handle.channel_open_session().await.map_err(ConnectError::Channel)?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(ConnectError::Channel)?;
    SftpSession::new(channel.into_stream()).await.map_err(ConnectError::Sftp)
}

/// Connects, authenticates and opens the primary SFTP channel, all within the
/// connection timeout.
pub async fn connect(
    params: &ConnectionParams,
    target: &ResolvedParams,
) -> Result<RusshSession, ConnectError> {
    match tokio::time::timeout(params.timeout, establish(params, target)).await {
        Ok(result) => result,
        Err(_) => Err(ConnectError::Timeout(params.timeout)),
    }
}

async fn establish(
    params: &ConnectionParams,
    target: &ResolvedParams,
) -> Result<RusshSession, ConnectError> {
    let config = client::Config {
        keepalive_interval: (!params.keepalive.is_zero()).then_some(params.keepalive),
        preferred: if params.compress {
            Preferred::COMPRESSED
        } else {
            Preferred::default()
        },
        ..Default::default()
    };
    let handler = HostKeyHandler::new(
        target.hostname.clone(),
        target.port,
        params.host_key_policy,
        params.known_hosts.clone(),
    );

    debug!("connecting to {}:{}", target.hostname, target.port);
    let address = (target.hostname.as_str(), target.port);
    let mut handle = client::connect(Arc::new(config), address, handler)
        .await
        .map_err(ConnectError::Connection)?;

    let setup = async {
        authenticate(&mut handle, params, target).await?;
        start_sftp(&handle).await
    };
    let sftp = match setup.await {
        Ok(sftp) => sftp,
        Err(err) => {
            let disconnected = handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await;
            if let Err(disconnect_err) = disconnected {
                debug!("tearing down failed connection: {disconnect_err}");
            }
            return Err(err);
        }
    };

    info!("connected to {}@{}:{}", target.user, target.hostname, target.port);
    Ok(RusshSession {
        handle_mutex: Arc::new(Mutex::new(handle)),
        sftp: Arc::new(RusshSftp::new(sftp)),
    })
}

/// Tries the configured key, then the password, then the default keys, then
/// the `none` method.
async fn authenticate(
    handle: &mut Handle<HostKeyHandler>,
    params: &ConnectionParams,
    target: &ResolvedParams,
) -> Result<(), ConnectError> {
    let user = target.user.as_str();

    if let Some(key_file) = &target.key_file {
        let key = load_key(key_file, params.password.as_deref())?;
        if publickey(handle, user, key).await? {
            return Ok(());
        }
    }

    if let Some(password) = &params.password {
        if handle
            .authenticate_password(user, password)
            .await
            .map_err(ConnectError::Connection)?
        {
            return Ok(());
        }
    }

    for identity in DEFAULT_IDENTITIES {
        let path = expand_home(identity);
        if !path.exists() {
            continue;
        }
        match load_key(&path, None) {
            Ok(key) => {
                if publickey(handle, user, key).await? {
                    return Ok(());
                }
            }
            Err(err) => debug!("skipping default identity: {err}"),
        }
    }

    if handle.authenticate_none(user).await.map_err(ConnectError::Connection)? {
        return Ok(());
    }
    Err(ConnectError::Authentication(user.to_owned()))
}

fn load_key(path: &std::path::Path, passphrase: Option<&str>) -> Result<KeyPair, ConnectError> {
    let path = expand_home(&path.to_string_lossy());
    russh_keys::load_secret_key(&path, passphrase)
        .map_err(|source| ConnectError::Key { path, source })
}

async fn publickey(
    handle: &mut Handle<HostKeyHandler>,
    user: &str,
    key: KeyPair,
) -> Result<bool, ConnectError> {
    handle
        .authenticate_publickey(user, Arc::new(key))
        .await
        .map_err(ConnectError::Connection)
}
