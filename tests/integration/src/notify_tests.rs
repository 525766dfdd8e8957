//! Mirror driven by real filesystem notifications
//!
//! Unlike the other suites nothing is emitted by hand: every change, and
//! every echo of a propagated write, comes from `NotifyWatchService`.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use mirror_core::{
    ComparisonMode, Endpoint, EndpointId, NotifyWatchService, SyncCoordinator, SyncOptions,
};
use mirror_test_utils::{TestTree, eventually};
use pretty_assertions::assert_eq;

const WAIT: Duration = Duration::from_secs(10);
const SETTLE: Duration = Duration::from_millis(300);

fn has_content(tree: &TestTree, relative: &str, expected: &str) -> bool {
    fs::read_to_string(tree.path(relative)).is_ok_and(|content| content == expected)
}

fn id(s: &str) -> EndpointId {
    EndpointId::from(s)
}

#[tokio::test(flavor = "multi_thread")]
async fn real_watcher_mirror_converges_without_echo_loop() {
    let a = TestTree::new();
    let b = TestTree::new();
    // Directories created before the watch starts are watched from the outset.
    a.subdir("nested/deep");
    b.subdir("nested/deep");

    let mut coordinator = SyncCoordinator::new(SyncOptions {
        comparison_mode: ComparisonMode::Hash,
        poll_interval: Duration::from_millis(20),
        ..SyncOptions::default()
    });
    coordinator.register_endpoint(Endpoint::local("a", a.root())).unwrap();
    coordinator.register_endpoint(Endpoint::local("b", b.root())).unwrap();
    coordinator.wire_mirror(&id("a"), &id("b")).unwrap();
    let running = coordinator.start(Arc::new(NotifyWatchService)).await.unwrap();

    // Write on one side, rewrite on the other.
    a.write("nested/deep/f.txt", "one");
    assert!(eventually(WAIT, || has_content(&b, "nested/deep/f.txt", "one")).await);
    tokio::time::sleep(SETTLE).await;

    b.write("nested/deep/f.txt", "two");
    assert!(eventually(WAIT, || has_content(&a, "nested/deep/f.txt", "two")).await);
    tokio::time::sleep(SETTLE).await;

    // A rename arrives as a delete of the old name and a create of the new one.
    fs::rename(a.path("nested/deep/f.txt"), a.path("nested/deep/g.txt")).unwrap();
    assert!(eventually(WAIT, || {
        !b.exists("nested/deep/f.txt") && has_content(&b, "nested/deep/g.txt", "two")
    })
    .await);
    tokio::time::sleep(SETTLE).await;

    b.remove("nested/deep/g.txt");
    assert!(eventually(WAIT, || !a.exists("nested/deep/g.txt")).await);

    // Quiet period: an echo loop would keep the queues busy.
    tokio::time::sleep(SETTLE).await;
    assert!(eventually(WAIT, || running.pending() == 0).await);
    let before = (a.files(), b.files());
    tokio::time::sleep(SETTLE).await;
    assert_eq!((a.files(), b.files()), before);

    let summary = running.stop().await.unwrap();

    assert_eq!(a.files(), Vec::<String>::new());
    assert_eq!(b.files(), Vec::<String>::new());
    assert_eq!(summary.failed(), 0);
    for destination in [id("a"), id("b")] {
        let report = &summary.workers[&destination];
        assert!(report.applied >= 1, "{}: {:?}", destination, report);
        assert!(report.applied <= 12, "{} kept propagating: {:?}", destination, report);
    }
}
