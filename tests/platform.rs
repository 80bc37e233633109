use std::time::Duration;

use common::{TestData, UID};
use sshfs::{Filesystem, Namespace, Platform};

mod common;

#[tokio::test]
async fn platform_is_detected_once() {
    let test_data = TestData::setup();

    assert_eq!(test_data.fs.platform().await, Platform::Linux);
    assert_eq!(test_data.fs.platform().await, Platform::Linux);
    let runs = test_data
        .remote
        .exec_log()
        .iter()
        .filter(|command| command.as_str() == "uname -s")
        .count();
    assert_eq!(runs, 1);
}

#[tokio::test]
async fn failed_detection_is_unknown() {
    let test_data = TestData::setup();
    test_data.remote.fail_exec(true);

    assert_eq!(test_data.fs.platform().await, Platform::Unknown);
    assert_eq!(test_data.fs.locale().await, None);
}

#[tokio::test]
async fn sysinfo_marks_windows_hosts() {
    let test_data = TestData::setup();
    test_data
        .remote
        .set_command("uname -s", "", "'uname' is not recognized\n")
        .set_command("sysinfo", "Host Name: WIN\n", "");

    assert_eq!(test_data.fs.platform().await, Platform::Win32);
    assert_eq!(test_data.fs.locale().await, None);
}

#[tokio::test]
async fn windows_hosts_report_change_time_as_creation() {
    let test_data = TestData::setup();
    test_data.remote.remove_command("uname -s").set_command("sysinfo", "WIN", "");
    let path = test_data.init_file("x");

    let info = test_data
        .fs
        .getinfo(&path, &[Namespace::Details, Namespace::Access])
        .await
        .unwrap();
    let details = info.details.unwrap();
    assert_eq!(details.metadata_changed, None);
    // names are only resolved on POSIX hosts
    let access = info.access.unwrap();
    assert_eq!(access.uid, Some(UID));
    assert_eq!(access.user, None);
}

#[tokio::test]
async fn locale_is_detected_on_posix_hosts() {
    let test_data = TestData::setup();
    assert_eq!(test_data.fs.locale().await.as_deref(), Some("utf-8"));

    test_data.remote.set_command("echo $LANG", "C\n", "");
    assert_eq!(test_data.fs.locale().await.as_deref(), Some("utf-8"));

    test_data.fs.invalidate_platform().await;
    assert_eq!(test_data.fs.locale().await.as_deref(), Some("c"));
}

#[tokio::test]
async fn invalidation_forces_a_new_detection() {
    let test_data = TestData::setup();
    assert_eq!(test_data.fs.platform().await, Platform::Linux);

    test_data.remote.set_command("uname -s", "Darwin\n", "");
    assert_eq!(test_data.fs.platform().await, Platform::Linux);
    test_data.fs.invalidate_platform().await;
    assert_eq!(test_data.fs.platform().await, Platform::Darwin);
}

#[tokio::test]
async fn owner_names_are_cached_and_decoded() {
    let test_data = TestData::setup();
    test_data
        .remote
        .set_command("echo $LANG", "de_DE.ISO-8859-1\n", "")
        .set_command("getent passwd 1000", "j\u{fc}rgen:x:1000:1000::/home/j:/bin/sh\n", "");
    let path = test_data.init_file("x");

    let access = test_data
        .fs
        .getinfo(&path, &[Namespace::Access])
        .await
        .unwrap()
        .access
        .unwrap();
    assert_eq!(access.user.as_deref(), Some("j\u{c3}\u{bc}rgen"));

    test_data.fs.getinfo(&path, &[Namespace::Access]).await.unwrap();
    let lookups = test_data
        .remote
        .exec_log()
        .iter()
        .filter(|command| command.starts_with("getent passwd"))
        .count();
    assert_eq!(lookups, 1);
}

#[tokio::test]
async fn slow_commands_time_out() {
    let test_data = TestData::setup();
    test_data.remote.exec_delay(Some(Duration::from_secs(30)));

    tokio::time::pause();
    assert_eq!(test_data.fs.platform().await, Platform::Unknown);
}
