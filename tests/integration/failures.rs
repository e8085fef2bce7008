use std::time::Duration;

use swiper_services::MemoryNetwork;
use tokio_util::sync::CancellationToken;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Transport Failures & Cancellation
// ══════════════════════════════════════════════════════════════════════════════

/// Announcer whose first open fails ends right away and never retries,
/// even after the window rotates.
#[tokio::test(start_paused = true)]
async fn test_announcer_open_failure_terminates() {
    let network = MemoryNetwork::new();
    let node = spawn_node(&network, "announcer", noon_plus(0));
    node.transport.fail_next_opens(1);
    let cancel = CancellationToken::new();

    let task = node.swiper.announce(RESOURCE, SEED, &cancel);
    settle().await;
    assert!(task.is_finished());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(node.transport.open_count(), 1);
    assert!(network.active_channels().is_empty());
}

/// A watcher whose join fails in the first window still finds the
/// announcer in the second.
#[tokio::test(start_paused = true)]
async fn test_watcher_recovers_from_open_failure() {
    let network = MemoryNetwork::new();
    let watcher = spawn_node(&network, "watcher", noon_plus(20));
    let announcer = spawn_node(&network, "announcer", noon_plus(20));
    watcher.transport.fail_next_opens(1);
    let cancel = CancellationToken::new();

    let mut watch = watcher.swiper.watch(RESOURCE, SEED, &cancel);
    let _announce = announcer.swiper.announce(RESOURCE, SEED, &cancel);

    let found = watch.peers.recv().await.unwrap();
    assert_eq!(found.id, announcer.id());
    // Found only after rotating at 12:01:00.
    assert!(watcher.swiper.current_window().start >= noon_plus(60));
    assert_eq!(watcher.transport.open_count(), 2);

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_watcher_retries_after_relay_refused() {
    let network = MemoryNetwork::new();
    let watcher = spawn_node(&network, "watcher", noon_plus(30));
    watcher.transport.fail_relay(true);
    let cancel = CancellationToken::new();

    let watch = watcher.swiper.watch(RESOURCE, SEED, &cancel);
    settle().await;
    assert!(watcher.swiper.registry().is_empty());
    assert!(network.active_channels().is_empty());

    watcher.transport.fail_relay(false);
    tokio::time::sleep(Duration::from_secs(31)).await;
    let h2 = watcher.swiper.rendezvous_point(RESOURCE, SEED);
    assert!(watcher.transport.is_relaying(&h2));
    assert!(!watch.task.is_finished());

    watch.task.shutdown().await;
}

/// Cancelling a watcher mid-wait completes promptly, and nothing is emitted
/// after completion.
#[tokio::test(start_paused = true)]
async fn test_cancel_mid_wait_is_prompt() {
    let network = MemoryNetwork::new();
    let watcher = spawn_node(&network, "watcher", noon_plus(1));
    let announcer = spawn_node(&network, "announcer", noon_plus(1));
    let cancel = CancellationToken::new();

    let mut watch = watcher.swiper.watch(RESOURCE, SEED, &cancel);
    tokio::time::sleep(Duration::from_secs(20)).await;

    cancel.cancel();
    tokio::time::timeout(Duration::from_millis(100), watch.task.wait())
        .await
        .expect("completion within bounded delay");

    let _announce = announcer.swiper.announce(RESOURCE, SEED, &CancellationToken::new());
    settle().await;
    assert_eq!(watch.peers.recv().await, None);
    assert!(watcher.swiper.registry().is_empty());
}
