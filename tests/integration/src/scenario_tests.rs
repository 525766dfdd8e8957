//! End-to-end mirror scenarios
//!
//! Each test starts a real coordinator over temporary trees. Notifications
//! are emitted by hand through `ChannelWatch`, including the echo a real
//! watcher would report after each propagated write.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mirror_core::{
    ChangeKind, ComparisonMode, Endpoint, EndpointId, FileMeta, LocalTransport, Result,
    RunningSync, SyncConfig, SyncCoordinator, SyncOptions, Timestamp, Transport,
    TransportFactory,
};
use mirror_fs::RelativePath;
use mirror_test_utils::{ChannelWatch, TestTree, eventually};
use pretty_assertions::assert_eq;

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Test Infrastructure
// =============================================================================

fn options(mode: ComparisonMode) -> SyncOptions {
    SyncOptions {
        comparison_mode: mode,
        poll_interval: Duration::from_millis(20),
        ..SyncOptions::default()
    }
}

/// A started bidirectional mirror between two fresh trees.
struct MirrorPair {
    root: TestTree,
    mirror: TestTree,
    watch: ChannelWatch,
    running: RunningSync,
}

impl MirrorPair {
    async fn start(mode: ComparisonMode) -> Self {
        Self::start_with(SyncCoordinator::new(options(mode))).await
    }

    async fn start_with(mut coordinator: SyncCoordinator) -> Self {
        let root = TestTree::new();
        let mirror = TestTree::new();
        coordinator
            .register_endpoint(Endpoint::local("root", root.root()))
            .unwrap();
        coordinator
            .register_endpoint(Endpoint::local("mirror", mirror.root()))
            .unwrap();
        coordinator
            .wire_mirror(&"root".into(), &"mirror".into())
            .unwrap();

        let watch = ChannelWatch::new();
        let running = coordinator.start(Arc::new(watch.clone())).await.unwrap();
        Self {
            root,
            mirror,
            watch,
            running,
        }
    }

    fn emit_root(&self, name: &str, kind: ChangeKind) {
        assert!(self.watch.emit_file(&self.root.root(), name, kind));
    }

    fn emit_mirror(&self, name: &str, kind: ChangeKind) {
        assert!(self.watch.emit_file(&self.mirror.root(), name, kind));
    }
}

fn id(s: &str) -> EndpointId {
    EndpointId::from(s)
}

/// Give route and worker tasks time to act on anything just emitted.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

// =============================================================================
// Echo suppression
// =============================================================================

async fn echo_of_propagated_write_is_suppressed(mode: ComparisonMode) {
    let pair = MirrorPair::start(mode).await;

    pair.root.write_at("a.txt", "hi", 1000);
    pair.emit_root("a.txt", ChangeKind::Created);
    assert!(eventually(WAIT, || pair.mirror.exists("a.txt")).await);

    pair.emit_mirror("a.txt", ChangeKind::Created);
    settle().await;

    assert_eq!(pair.running.queue(&id("root")).unwrap().len(), 0);
    let summary = pair.running.stop().await.unwrap();
    assert_eq!(summary.workers[&id("mirror")].applied, 1);
    assert_eq!(summary.workers[&id("root")].applied, 0, "echo must not propagate back");
    pair.root.assert_content("a.txt", "hi");
}

#[tokio::test(flavor = "multi_thread")]
async fn echo_is_suppressed_in_hash_mode() {
    echo_of_propagated_write_is_suppressed(ComparisonMode::Hash).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn echo_is_suppressed_in_mtime_mode() {
    echo_of_propagated_write_is_suppressed(ComparisonMode::Mtime).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn create_modify_then_echo() {
    let pair = MirrorPair::start(ComparisonMode::Hash).await;

    pair.root.write_at("a.txt", "hi", 1000);
    pair.emit_root("a.txt", ChangeKind::Created);
    assert!(eventually(WAIT, || pair.mirror.exists("a.txt")).await);
    pair.mirror.assert_content("a.txt", "hi");
    assert_eq!(pair.mirror.mtime("a.txt"), Timestamp::from_secs(1000.0));

    pair.root.write_at("a.txt", "bye", 1001);
    pair.emit_root("a.txt", ChangeKind::Modified);
    assert!(
        eventually(WAIT, || pair.mirror.exists("a.txt")
            && pair.mirror.read("a.txt") == "bye")
        .await
    );
    assert_eq!(pair.mirror.mtime("a.txt"), Timestamp::from_secs(1001.0));

    pair.emit_mirror("a.txt", ChangeKind::Modified);
    settle().await;

    let summary = pair.running.stop().await.unwrap();
    assert_eq!(summary.workers[&id("mirror")].applied, 2);
    assert_eq!(summary.workers[&id("root")].applied, 0);
    pair.root.assert_content("a.txt", "bye");
}

#[tokio::test(flavor = "multi_thread")]
async fn change_on_either_side_reaches_the_other() {
    let pair = MirrorPair::start(ComparisonMode::Hash).await;

    pair.mirror.write_at("docs/from-mirror.txt", "m", 1000);
    pair.emit_mirror("docs/from-mirror.txt", ChangeKind::Created);
    pair.root.write_at("from-root.txt", "r", 1000);
    pair.emit_root("from-root.txt", ChangeKind::Created);

    assert!(
        eventually(WAIT, || pair.root.exists("docs/from-mirror.txt")
            && pair.mirror.exists("from-root.txt"))
        .await
    );
    pair.running.stop().await.unwrap();

    assert_eq!(pair.root.files(), pair.mirror.files());
}

#[tokio::test(flavor = "multi_thread")]
async fn mtime_mode_ignores_same_second_rewrite() {
    let pair = MirrorPair::start(ComparisonMode::Mtime).await;
    pair.root.write_at("a.txt", "old", 1000);
    pair.mirror.write_at("a.txt", "new", 1000);

    pair.emit_mirror("a.txt", ChangeKind::Modified);
    settle().await;

    let summary = pair.running.stop().await.unwrap();
    assert_eq!(summary.applied(), 0);
    pair.root.assert_content("a.txt", "old");
}

// =============================================================================
// Ordering and idempotence
// =============================================================================

/// Records every mutating transport call, in order.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct RecordingTransport {
    inner: LocalTransport,
    log: Recorder,
}

impl Transport for RecordingTransport {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn verify_root(&mut self) -> Result<()> {
        self.inner.verify_root()
    }

    fn metadata(&mut self, path: &RelativePath) -> Result<Option<FileMeta>> {
        self.inner.metadata(path)
    }

    fn checksum(&mut self, path: &RelativePath) -> Result<Option<String>> {
        self.inner.checksum(path)
    }

    fn ensure_directory(&mut self, path: &RelativePath) -> Result<()> {
        self.inner.ensure_directory(path)
    }

    fn copy_in(&mut self, source: &Path, dest: &RelativePath, mtime: Timestamp) -> Result<u64> {
        self.log.0.lock().unwrap().push(format!("copy {}", dest));
        self.inner.copy_in(source, dest, mtime)
    }

    fn delete(&mut self, path: &RelativePath) -> Result<bool> {
        self.log.0.lock().unwrap().push(format!("delete {}", path));
        self.inner.delete(path)
    }
}

struct RecordingFactory(Recorder);

impl TransportFactory for RecordingFactory {
    fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>> {
        Ok(Box::new(RecordingTransport {
            inner: LocalTransport::new(&endpoint.root),
            log: self.0.clone(),
        }))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn create_modify_delete_applies_in_order() {
    let recorder = Recorder::default();
    let coordinator = SyncCoordinator::new(options(ComparisonMode::Hash))
        .with_transport_factory(RecordingFactory(recorder.clone()));
    let pair = MirrorPair::start_with(coordinator).await;

    pair.root.write_at("a.txt", "one", 1000);
    pair.emit_root("a.txt", ChangeKind::Created);
    assert!(eventually(WAIT, || pair.mirror.exists("a.txt")).await);

    pair.root.write_at("a.txt", "two!", 1001);
    pair.emit_root("a.txt", ChangeKind::Modified);
    assert!(
        eventually(WAIT, || pair.mirror.exists("a.txt")
            && pair.mirror.read("a.txt") == "two!")
        .await
    );

    pair.root.remove("a.txt");
    pair.emit_root("a.txt", ChangeKind::Deleted);
    assert!(eventually(WAIT, || !pair.mirror.exists("a.txt")).await);

    pair.running.stop().await.unwrap();
    assert_eq!(
        recorder.calls(),
        vec!["copy a.txt", "copy a.txt", "delete a.txt"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_queued_behind_modify_still_runs() {
    let pair = MirrorPair::start(ComparisonMode::Hash).await;
    pair.root.write_at("a.txt", "v1", 1000);
    pair.mirror.write_at("a.txt", "v0", 999);

    // The modify is captured, then the file disappears before it is copied.
    pair.root.write_at("a.txt", "v2", 1001);
    pair.emit_root("a.txt", ChangeKind::Modified);
    pair.root.remove("a.txt");
    pair.emit_root("a.txt", ChangeKind::Deleted);

    assert!(eventually(WAIT, || !pair.mirror.exists("a.txt")).await);
    let summary = pair.running.stop().await.unwrap();
    assert_eq!(summary.failed(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn double_delete_is_not_an_error() {
    let pair = MirrorPair::start(ComparisonMode::Hash).await;
    pair.mirror.write_at("a.txt", "x", 1000);

    pair.emit_root("a.txt", ChangeKind::Deleted);
    pair.emit_root("a.txt", ChangeKind::Deleted);
    assert!(eventually(WAIT, || !pair.mirror.exists("a.txt")).await);
    settle().await;

    let summary = pair.running.stop().await.unwrap();
    assert_eq!(summary.workers[&id("mirror")].failed, 0);
    assert_eq!(summary.workers[&id("mirror")].applied, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn directory_notifications_do_not_propagate() {
    let pair = MirrorPair::start(ComparisonMode::Hash).await;
    pair.root.subdir("empty");

    pair.emit_root("empty", ChangeKind::Created);
    settle().await;

    let summary = pair.running.stop().await.unwrap();
    assert_eq!(summary.applied(), 0);
    assert!(!pair.mirror.exists("empty"));
}

// =============================================================================
// Configuration driven
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn sync_started_from_config_file() {
    let work = TestTree::new();
    let backup = TestTree::new();
    let config_dir = TestTree::new();
    let config_path = config_dir.write(
        "sync.toml",
        &format!(
            r#"
comparison_mode = "mtime"
poll_interval_seconds = 0.05

[[endpoints]]
id = "work"
root = "{}"

[[endpoints]]
id = "backup"
root = "{}"

[[fan_out]]
source = "work"
destinations = ["backup"]
"#,
            work.root().display().to_string().replace('\\', "/"),
            backup.root().display().to_string().replace('\\', "/")
        ),
    );

    let config = SyncConfig::load(&config_path).unwrap();
    config.validate().unwrap();
    let watch = ChannelWatch::new();
    let running = config
        .to_coordinator()
        .unwrap()
        .start(Arc::new(watch.clone()))
        .await
        .unwrap();

    // One-way: the destination is not watched at all.
    assert!(watch.is_watching(&work.root()));
    assert!(!watch.is_watching(&backup.root()));

    work.write_at("report.txt", "q3", 1000);
    assert!(watch.emit_file(&work.root(), "report.txt", ChangeKind::Created));
    assert!(eventually(WAIT, || backup.exists("report.txt")).await);

    running.stop().await.unwrap();
    backup.assert_content("report.txt", "q3");
}
