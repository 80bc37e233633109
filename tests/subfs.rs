use common::TestData;
use sshfs::{Filesystem, FsError, Namespace, SubFs};

mod common;

#[tokio::test]
async fn view_delegates_under_its_prefix() {
    let test_data = TestData::setup();
    let dir = test_data.init_dir();
    test_data.remote.seed_file(&format!("{dir}/a.txt"), b"a");

    let view = test_data.fs.opendir(&dir).await.unwrap();
    assert_eq!(view.listdir("/").await.unwrap(), vec!["a.txt".to_owned()]);
    assert_eq!(view.readbytes("a.txt").await.unwrap(), b"a");

    view.writetext("/b.txt", "b").await.unwrap();
    assert_eq!(test_data.fs.readtext(&format!("{dir}/b.txt")).await.unwrap(), "b");

    let info = view.getinfo("/a.txt", &[Namespace::Details]).await.unwrap();
    assert_eq!(info.basic.name, "a.txt");
    assert_eq!(
        view.geturl("/a.txt", "download").unwrap(),
        format!("ssh://alice@memory:22{dir}/a.txt")
    );
}

#[tokio::test]
async fn view_cannot_escape_its_prefix() {
    let test_data = TestData::setup();
    let dir = test_data.init_dir();
    let view = test_data.fs.opendir(&dir).await.unwrap();

    assert!(matches!(
        view.listdir("../..").await,
        Err(FsError::IllegalBackReference { .. })
    ));
    assert!(test_data.remote.exec_log().is_empty());
}

#[tokio::test]
async fn nested_makedir_returns_nested_views() {
    let test_data = TestData::setup();
    let dir = test_data.init_dir();
    let view = test_data.fs.opendir(&dir).await.unwrap();

    let nested = view.makedir("inner", None, false).await.unwrap();
    nested.writebytes("leaf", b"x").await.unwrap();
    assert!(test_data.fs.isfile(&format!("{dir}/inner/leaf")).await.unwrap());
}

#[tokio::test]
async fn only_a_closing_view_closes_its_parent() {
    let test_data = TestData::setup();
    let dir = test_data.init_dir();

    let view = SubFs::new(test_data.fs.clone(), dir.clone());
    view.close().await.unwrap();
    assert!(view.isclosed());
    assert!(matches!(view.listdir("/").await, Err(FsError::FilesystemClosed)));
    assert!(!test_data.fs.isclosed());

    let view = SubFs::closing(test_data.fs.clone(), dir);
    view.close().await.unwrap();
    view.close().await.unwrap();
    assert!(test_data.fs.isclosed());
    assert!(test_data.remote.is_disconnected());
}
