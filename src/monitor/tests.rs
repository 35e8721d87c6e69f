//! Unit tests for the fleet status check.

use std::time::Duration;

use rstest::rstest;

use super::FleetMonitor;
use crate::model::ServerId;
use crate::reaper::{Reaper, ReaperConfig};
use crate::status::StatusCache;
use crate::test_support::{
    MemoryRepository, RecordingProvisioner, ScriptedConnect, peer_fixture, server_fixture,
};

fn monitor(
    repository: &MemoryRepository,
    cache: &StatusCache,
) -> FleetMonitor<MemoryRepository, RecordingProvisioner, ScriptedConnect> {
    let reaper = Reaper::new(
        repository.clone(),
        RecordingProvisioner::new(),
        ScriptedConnect::new(),
        ReaperConfig::default(),
    );
    FleetMonitor::new(reaper, repository.clone(), cache.clone())
}

#[rstest]
#[tokio::test]
async fn check_reaps_then_snapshots_the_survivors() {
    let repository = MemoryRepository::new();
    // Old and peerless: reaped during the check.
    repository.add_server(server_fixture(1, "10.0.0.1", Duration::from_secs(2 * 60 * 60)));
    // Fresh server with peers: skipped by the reaper, listed in the
    // snapshot.
    repository.add_server(server_fixture(2, "10.0.0.2", Duration::from_secs(60)));
    repository.add_peer(peer_fixture(
        1,
        ServerId(2),
        "hd-coral7",
        "pk:a",
        Duration::from_secs(60),
    ));
    let cache = StatusCache::new();

    let snapshot = monitor(&repository, &cache)
        .check()
        .await
        .expect("check should succeed");

    assert_eq!(snapshot.server_count, 1);
    assert_eq!(snapshot.active_peers, 1);
    assert_eq!(snapshot.servers.len(), 1);
    assert_eq!(
        snapshot.servers.first().map(|status| status.ip_address.as_str()),
        Some("10.0.0.2")
    );
    assert!(snapshot.error.is_none());
    assert_eq!(cache.latest(), Some(snapshot));
}

#[rstest]
#[tokio::test]
async fn per_server_counts_are_reported() {
    let repository = MemoryRepository::new();
    repository.add_server(server_fixture(1, "10.0.0.1", Duration::from_secs(60)));
    repository.add_server(server_fixture(2, "10.0.0.2", Duration::from_secs(60)));
    repository.add_peer(peer_fixture(
        1,
        ServerId(1),
        "hd-coral7",
        "pk:a",
        Duration::from_secs(60),
    ));
    repository.add_peer(peer_fixture(
        2,
        ServerId(1),
        "hd-kelp9",
        "pk:b",
        Duration::from_secs(60),
    ));
    repository.add_peer(peer_fixture(
        3,
        ServerId(2),
        "hd-moss3",
        "pk:c",
        Duration::from_secs(60),
    ));
    let cache = StatusCache::new();

    let snapshot = monitor(&repository, &cache)
        .check()
        .await
        .expect("check should succeed");

    assert_eq!(snapshot.active_peers, 3);
    let counts: Vec<usize> = snapshot.servers.iter().map(|status| status.peer_count).collect();
    assert_eq!(counts, vec![2, 1]);
}

#[rstest]
#[tokio::test]
async fn failed_check_caches_an_error_snapshot_and_propagates() {
    let repository = MemoryRepository::new();
    repository.fail_listing();
    let cache = StatusCache::new();

    let result = monitor(&repository, &cache).check().await;

    assert!(result.is_err(), "the scheduler must not record a success");
    let cached = cache.latest().expect("error snapshot should be cached");
    assert!(cached.error.is_some());
    assert_eq!(cached.active_peers, 0);
    assert_eq!(cached.server_count, 0);
}
