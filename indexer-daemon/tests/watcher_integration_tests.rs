//! End-to-end: real filesystem notifications, real HTTP, fake ingestion API

mod helpers;

use helpers::{init_test_logging, test_config, wait_for, write_file, FakeApi};
use indexer_daemon::watcher::InFlightTasks;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(10);

struct Daemon {
    shutdown: CancellationToken,
    task: JoinHandle<InFlightTasks>,
}

impl Daemon {
    fn start(api: &FakeApi, root: &std::path::Path) -> Self {
        let config = test_config(api, root);
        let pipeline = indexer_daemon::build_pipeline(&config).unwrap();
        let watcher = indexer_daemon::build_watcher(&config, Arc::new(pipeline));

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(watcher.run(shutdown.clone()));
        Self { shutdown, task }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        let in_flight = self.task.await.unwrap();
        in_flight.wait().await;
    }
}

/// Canonical temp root so notification paths match what the test writes
fn music_root() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    (dir, root)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_existing_files_are_uploaded_at_startup() {
    init_test_logging();
    let api = FakeApi::start().await;
    let (_dir, root) = music_root();
    write_file(&root, "ebl/old.mp3", b"already here");
    write_file(&root, "artist/ebl/older.wav", b"also here");
    write_file(&root, "artist/notes.mp3", b"not under ebl");

    let daemon = Daemon::start(&api, &root);

    let expected = vec!["old.mp3".to_string(), "older.wav".to_string()];
    assert!(
        wait_for(WAIT, || api.uploaded_file_names() == expected).await,
        "uploaded: {:?}",
        api.uploaded_file_names()
    );

    daemon.stop().await;
    assert_eq!(api.init_file_names(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_files_are_uploaded_and_others_ignored() {
    init_test_logging();
    let api = FakeApi::start().await;
    let (_dir, root) = music_root();
    std::fs::create_dir_all(root.join("ebl")).unwrap();

    let daemon = Daemon::start(&api, &root);
    // Let the watch registration settle
    tokio::time::sleep(Duration::from_millis(200)).await;

    write_file(&root, "ebl/new.wav", b"fresh audio");
    write_file(&root, "ebl/readme.txt", b"text");
    write_file(&root, "other/skip.mp3", b"wrong folder");
    write_file(&root, "ebl/.hidden.mp3", b"hidden");

    assert!(
        wait_for(WAIT, || api.uploaded_file_names() == vec!["new.wav".to_string()]).await,
        "uploaded: {:?}",
        api.uploaded_file_names()
    );

    // Give ignored files time to (not) show up
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    daemon.stop().await;

    assert_eq!(api.init_file_names(), vec!["new.wav".to_string()]);
    assert_eq!(api.upload_attempts(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_files_in_new_directory_are_picked_up() {
    init_test_logging();
    let api = FakeApi::start().await;
    let (_dir, root) = music_root();

    let daemon = Daemon::start(&api, &root);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Built elsewhere, then moved in as a whole
    let (_staging_dir, staging) = music_root();
    write_file(&staging, "album/ebl/track.mp3", b"moved in");
    std::fs::rename(staging.join("album"), root.join("album")).unwrap_or_else(|_| {
        // Cross-device temp dirs: copy instead
        write_file(&root, "album/ebl/track.mp3", b"moved in");
    });

    assert!(
        wait_for(WAIT, || api.uploaded_file_names() == vec!["track.mp3".to_string()]).await,
        "uploaded: {:?}",
        api.uploaded_file_names()
    );

    daemon.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_registration_failure_does_not_affect_other_files() {
    init_test_logging();
    let api = FakeApi::start().await;
    api.fail_init_for("a.mp3");
    let (_dir, root) = music_root();
    std::fs::create_dir_all(root.join("ebl")).unwrap();

    let daemon = Daemon::start(&api, &root);
    tokio::time::sleep(Duration::from_millis(200)).await;

    write_file(&root, "ebl/a.mp3", b"will fail");
    write_file(&root, "ebl/b.mp3", b"will succeed");

    assert!(
        wait_for(WAIT, || {
            api.init_file_names() == vec!["a.mp3".to_string(), "b.mp3".to_string()]
                && api.uploaded_file_names() == vec!["b.mp3".to_string()]
        })
        .await,
        "inits: {:?}, uploads: {:?}",
        api.init_file_names(),
        api.uploaded_file_names()
    );

    daemon.stop().await;
    // Registration is never retried
    assert_eq!(api.inits().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_watch_dir_is_picked_up_once_created() {
    init_test_logging();
    let api = FakeApi::start().await;
    let (_dir, base) = music_root();
    let root = base.join("Music");

    let daemon = Daemon::start(&api, &root);

    // Several retry rounds go by with no root; the daemon keeps running
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!daemon.task.is_finished());
    assert!(api.inits().is_empty());

    write_file(&root, "ebl/late.mp3", b"root appeared");

    assert!(
        wait_for(WAIT, || api.uploaded_file_names() == vec!["late.mp3".to_string()]).await,
        "uploaded: {:?}",
        api.uploaded_file_names()
    );

    daemon.stop().await;
}
