use std::time::Duration;

use swiper_core::{generate_rendezvous_point_for_period, round_time_period, Window};
use swiper_services::MemoryNetwork;
use tokio_util::sync::CancellationToken;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Scheduling
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_window_scenario_conv_42() {
    let start_1 = round_time_period(noon_plus(30), MINUTE);
    assert_eq!(start_1, noon_plus(0));
    let h1 = generate_rendezvous_point_for_period(RESOURCE, SEED, start_1);

    let start_2 = round_time_period(noon_plus(70), MINUTE);
    assert_eq!(start_2, noon_plus(60));
    let h2 = generate_rendezvous_point_for_period(RESOURCE, SEED, start_2);

    assert_ne!(h1, h2);
    assert_eq!(Window::containing(noon_plus(59), MINUTE).rendezvous_point(RESOURCE, SEED), h1);
}

#[tokio::test(start_paused = true)]
async fn test_watcher_joins_h1_then_rotates_to_h2() {
    let network = MemoryNetwork::new();
    let node = spawn_node(&network, "watcher", noon_plus(45));
    let h1 = Window::containing(noon_plus(0), MINUTE).rendezvous_point(RESOURCE, SEED);
    let h2 = Window::containing(noon_plus(60), MINUTE).rendezvous_point(RESOURCE, SEED);

    let cancel = CancellationToken::new();
    let watch = node.swiper.watch(RESOURCE, SEED, &cancel);
    settle().await;
    assert_eq!(node.swiper.registry().open_channels(), vec![h1]);

    // 12:00:45 → 12:01:05
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(node.swiper.registry().open_channels(), vec![h2]);
    assert!(!node.transport.is_member(&h1));

    watch.task.shutdown().await;
}

// ══════════════════════════════════════════════════════════════════════════════
//  Convergence
// ══════════════════════════════════════════════════════════════════════════════

/// Watcher and announcer never talk to each other, yet land on the same
/// channel and the watcher sees the announcer arrive.
#[tokio::test(start_paused = true)]
async fn test_watcher_discovers_announcer() {
    let network = MemoryNetwork::new();
    let watcher = spawn_node(&network, "watcher", noon_plus(10));
    let announcer = spawn_node(&network, "announcer", noon_plus(10));
    let cancel = CancellationToken::new();

    let mut watch = watcher.swiper.watch(RESOURCE, SEED, &cancel);
    let announce = announcer.swiper.announce(RESOURCE, SEED, &cancel);
    settle().await;

    assert_eq!(
        watcher.swiper.registry().open_channels(),
        announcer.swiper.registry().open_channels()
    );

    let found = watch.peers.recv().await.expect("announcer discovered");
    assert_eq!(found.id, announcer.id());

    cancel.cancel();
    watch.task.wait().await;
    announce.wait().await;
    assert!(network.active_channels().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_announcer_started_late_in_window_is_found() {
    let network = MemoryNetwork::new();
    let watcher = spawn_node(&network, "watcher", noon_plus(5));
    let announcer = spawn_node(&network, "announcer", noon_plus(5));
    let cancel = CancellationToken::new();

    let mut watch = watcher.swiper.watch(RESOURCE, SEED, &cancel);
    tokio::time::sleep(Duration::from_secs(40)).await;
    let _announce = announcer.swiper.announce(RESOURCE, SEED, &cancel);

    let found = tokio::time::timeout(Duration::from_secs(5), watch.peers.recv())
        .await
        .expect("discovered within the window")
        .expect("stream open");
    assert_eq!(found.id, announcer.id());

    cancel.cancel();
}

/// Both sides rotate in lockstep; the watcher sees the announcer again on
/// the next window's channel.
#[tokio::test(start_paused = true)]
async fn test_rediscovery_after_rotation() {
    let network = MemoryNetwork::new();
    let watcher = spawn_node(&network, "watcher", noon_plus(50));
    let announcer = spawn_node(&network, "announcer", noon_plus(50));
    let cancel = CancellationToken::new();

    let mut watch = watcher.swiper.watch(RESOURCE, SEED, &cancel);
    let _announce = announcer.swiper.announce(RESOURCE, SEED, &cancel);

    let first = watch.peers.recv().await.unwrap();
    let second = watch.peers.recv().await.unwrap();
    assert_eq!(first.id, announcer.id());
    assert_eq!(second.id, announcer.id());

    let h2 = Window::containing(noon_plus(60), MINUTE).rendezvous_point(RESOURCE, SEED);
    assert!(announcer.transport.is_member(&h2));
    assert!(watcher.transport.is_member(&h2));

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_different_seed_does_not_converge() {
    let network = MemoryNetwork::new();
    let watcher = spawn_node(&network, "watcher", noon_plus(10));
    let announcer = spawn_node(&network, "announcer", noon_plus(10));
    let cancel = CancellationToken::new();

    let mut watch = watcher.swiper.watch(RESOURCE, SEED, &cancel);
    let _announce = announcer.swiper.announce(RESOURCE, b"another-seed", &cancel);
    settle().await;

    assert_ne!(
        watcher.swiper.registry().open_channels(),
        announcer.swiper.registry().open_channels()
    );
    let result = tokio::time::timeout(Duration::from_secs(30), watch.peers.recv()).await;
    assert!(result.is_err(), "no peer expected across seeds");

    cancel.cancel();
}

/// A peer that joins and leaves yields exactly one discovered peer.
#[tokio::test(start_paused = true)]
async fn test_join_then_leave_emits_once() {
    use swiper_services::Transport;

    let network = MemoryNetwork::new();
    let watcher = spawn_node(&network, "watcher", noon_plus(10));
    let remote = network.node(swiper_core::PeerId::from_label("remote"));
    let cancel = CancellationToken::new();

    let mut watch = watcher.swiper.watch(RESOURCE, SEED, &cancel);
    settle().await;

    let channel = watcher.swiper.rendezvous_point(RESOURCE, SEED);
    let topic = remote.open(&channel).await.unwrap();
    topic.close().await.unwrap();
    settle().await;

    assert_eq!(watch.peers.recv().await.unwrap().id, remote.id());
    assert!(watch.peers.try_recv().is_err());

    cancel.cancel();
}

/// Cancelling a shared parent stops every watcher and announcer under it.
#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_stops_all_roles() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network, "a", noon_plus(0));
    let b = spawn_node(&network, "b", noon_plus(0));
    let parent = CancellationToken::new();

    let announces = vec![
        a.swiper.announce(RESOURCE, SEED, &parent),
        b.swiper.announce(RESOURCE, SEED, &parent),
    ];
    let watches = vec![
        a.swiper.watch(RESOURCE, SEED, &parent),
        b.swiper.watch(RESOURCE, SEED, &parent),
    ];
    settle().await;
    assert!(!network.active_channels().is_empty());

    parent.cancel();
    for task in announces {
        task.wait().await;
    }
    for watch in watches {
        watch.task.wait().await;
    }
    assert!(network.active_channels().is_empty());
    assert!(a.swiper.registry().is_empty());
    assert!(b.swiper.registry().is_empty());
}
