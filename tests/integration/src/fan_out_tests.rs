//! Fan-out to local and remote destinations

use std::sync::Arc;
use std::time::Duration;

use mirror_core::{
    ChangeKind, ComparisonMode, Endpoint, EndpointId, RemoteConfig, RunningSync, SyncCoordinator,
    SyncOptions, Timestamp,
};
use mirror_test_utils::{ChannelWatch, MemoryRemote, MemoryTransportFactory, TestTree, eventually};
use pretty_assertions::assert_eq;

const WAIT: Duration = Duration::from_secs(5);

/// `work` fans out to the remote `offsite` and the local `usb`.
struct FanOut {
    work: TestTree,
    usb: TestTree,
    offsite: MemoryRemote,
    watch: ChannelWatch,
    running: RunningSync,
}

impl FanOut {
    async fn start(mode: ComparisonMode) -> Self {
        let work = TestTree::new();
        let usb = TestTree::new();
        let offsite = MemoryRemote::new("offsite.test");
        offsite.mkdir_all("/srv/work");

        let mut coordinator = SyncCoordinator::new(SyncOptions {
            comparison_mode: mode,
            poll_interval: Duration::from_millis(20),
            ..SyncOptions::default()
        })
        .with_transport_factory(MemoryTransportFactory::new().with_remote("offsite", offsite.clone()));
        coordinator
            .register_endpoint(Endpoint::local("work", work.root()))
            .unwrap();
        coordinator
            .register_endpoint(Endpoint::remote(
                "offsite",
                "/srv/work",
                RemoteConfig::new("offsite.test", "mirror"),
            ))
            .unwrap();
        coordinator
            .register_endpoint(Endpoint::local("usb", usb.root()))
            .unwrap();
        coordinator
            .wire_fan_out(&"work".into(), &["offsite".into(), "usb".into()])
            .unwrap();

        let watch = ChannelWatch::new();
        let running = coordinator.start(Arc::new(watch.clone())).await.unwrap();
        Self {
            work,
            usb,
            offsite,
            watch,
            running,
        }
    }

    fn emit(&self, name: &str, kind: ChangeKind) {
        assert!(self.watch.emit_file(&self.work.root(), name, kind));
    }
}

fn id(s: &str) -> EndpointId {
    EndpointId::from(s)
}

#[tokio::test(flavor = "multi_thread")]
async fn change_reaches_every_destination() {
    let f = FanOut::start(ComparisonMode::Hash).await;

    f.work.write_at("notes/a.txt", "hi", 1000);
    f.emit("notes/a.txt", ChangeKind::Created);

    assert!(eventually(WAIT, || f.usb.exists("notes/a.txt")
        && f.offsite.exists("/srv/work/notes/a.txt"))
    .await);
    f.running.stop().await.unwrap();

    f.usb.assert_content("notes/a.txt", "hi");
    let remote = f.offsite.file("/srv/work/notes/a.txt").unwrap();
    assert_eq!(remote.content, b"hi");
    assert_eq!(remote.mtime, Timestamp::from_secs(1000.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn content_and_mtime_survive_the_round_trip() {
    let f = FanOut::start(ComparisonMode::Hash).await;
    let content: String = (0..200_000u32)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect();

    f.work.write_at("big.bin", &content, 1234);
    f.emit("big.bin", ChangeKind::Created);

    assert!(eventually(WAIT, || f.usb.exists("big.bin")
        && f.offsite.exists("/srv/work/big.bin"))
    .await);
    f.running.stop().await.unwrap();

    assert_eq!(f.usb.read("big.bin"), content);
    assert_eq!(f.usb.mtime("big.bin"), Timestamp::from_secs(1234.0));
    assert_eq!(f.offsite.read("/srv/work/big.bin").unwrap(), content);
    assert_eq!(
        f.offsite.file("/srv/work/big.bin").unwrap().mtime,
        Timestamp::from_secs(1234.0)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_destination_does_not_block_the_others() {
    let f = FanOut::start(ComparisonMode::Hash).await;
    f.offsite.set_offline(true);

    f.work.write_at("a.txt", "first", 1000);
    f.emit("a.txt", ChangeKind::Created);
    assert!(eventually(WAIT, || f.usb.exists("a.txt")).await);
    assert!(eventually(WAIT, || f.offsite.rejected() > 0).await);

    // Back online: the next action reconnects and goes through.
    f.offsite.set_offline(false);
    f.work.write_at("b.txt", "second", 1001);
    f.emit("b.txt", ChangeKind::Created);
    assert!(eventually(WAIT, || f.offsite.exists("/srv/work/b.txt")).await);
    assert!(eventually(WAIT, || f.usb.exists("b.txt")).await);

    let summary = f.running.stop().await.unwrap();

    assert_eq!(summary.workers[&id("usb")].applied, 2);
    assert_eq!(summary.workers[&id("offsite")].failed, 1);
    assert_eq!(summary.workers[&id("offsite")].applied, 1);
    // No automatic retry: the change made while offline is lost on that side.
    assert!(!f.offsite.exists("/srv/work/a.txt"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unchanged_file_is_not_copied_again() {
    let f = FanOut::start(ComparisonMode::Mtime).await;
    f.work.write_at("a.txt", "hi", 1000);
    f.usb.write_at("a.txt", "hi", 1000);
    f.offsite.put_file("/srv/work/a.txt", "hi", 1000);

    f.emit("a.txt", ChangeKind::Modified);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let summary = f.running.stop().await.unwrap();
    assert_eq!(summary.applied(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn deletion_reaches_every_destination() {
    let f = FanOut::start(ComparisonMode::Hash).await;
    f.usb.write_at("old.txt", "x", 1000);
    f.offsite.put_file("/srv/work/old.txt", "x", 1000);

    f.emit("old.txt", ChangeKind::Deleted);

    assert!(eventually(WAIT, || !f.usb.exists("old.txt")
        && !f.offsite.exists("/srv/work/old.txt"))
    .await);
    let summary = f.running.stop().await.unwrap();
    assert_eq!(summary.failed(), 0);
}
