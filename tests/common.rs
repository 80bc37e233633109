#![allow(dead_code)]

use std::time::Duration;

use sshfs::{memory::MemoryRemote, ConnectionParams, HostKeyPolicy, SshFs};
use testcontainers::{core::ContainerPort, runners::AsyncRunner, ContainerAsync, GenericImage};
use uuid::Uuid;

pub const USER: &str = "alice";
pub const UID: u32 = 1000;
pub const GID: u32 = 1000;
pub const HOME: &str = "/home/alice";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn get_tmp_path() -> String {
    format!("/tmp/{}", Uuid::new_v4())
}

pub struct TestData {
    pub remote: MemoryRemote,
    pub fs: SshFs,
}

impl TestData {
    /// A Linux host where `alice` owns her home directory.
    pub fn setup() -> TestData {
        init_logging();
        let remote = MemoryRemote::new();
        remote.seed_dir("/tmp").login(USER, UID, GID).seed_dir(HOME);
        let fs = remote.filesystem(USER);
        TestData { remote, fs }
    }

    pub fn init_file(&self, content: &str) -> String {
        let path = get_tmp_path();
        self.remote.seed_file(&path, content.as_bytes());
        path
    }

    pub fn init_dir(&self) -> String {
        let path = get_tmp_path();
        self.remote.seed_dir(&path);
        path
    }
}

/// A filesystem on a containerized sshd, kept alive with the container.
pub struct ContainerData {
    pub fs: SshFs,
    _container: ContainerAsync<GenericImage>,
}

impl ContainerData {
    pub async fn setup() -> ContainerData {
        init_logging();
        let container = GenericImage::new("ssh_server", "latest")
            .with_exposed_port(ContainerPort::Tcp(22))
            .start()
            .await
            .expect("Could not start SSH container");
        let ports = container.ports().await.expect("Could not get SSH container ports");
        let ssh_port = ports
            .map_to_host_port_ipv4(ContainerPort::Tcp(22))
            .expect("Could not get SSH container port corresponding to 22");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let known_hosts = std::env::temp_dir().join(format!("known_hosts-{}", Uuid::new_v4()));
        let params = ConnectionParams::new("localhost")
            .port(ssh_port)
            .user("root")
            .password("root123")
            .config_path(None)
            .host_key_policy(HostKeyPolicy::AutoAdd)
            .known_hosts(known_hosts)
            .build();
        let fs = SshFs::connect(&params).await.expect("Could not connect");

        ContainerData { fs, _container: container }
    }
}
