//! Unit tests for the status cache.

use chrono::Utc;
use rstest::rstest;

use super::{ServerStatus, StatusCache, StatusSnapshot};

fn snapshot(active_peers: usize) -> StatusSnapshot {
    StatusSnapshot {
        checked_at: Utc::now(),
        active_peers,
        server_count: 1,
        servers: vec![ServerStatus {
            location: String::from("fra"),
            ip_address: String::from("10.0.0.1"),
            peer_count: active_peers,
        }],
        error: None,
    }
}

#[rstest]
fn cache_starts_empty() {
    assert!(StatusCache::new().latest().is_none());
}

#[rstest]
fn update_replaces_the_snapshot_wholesale() {
    let cache = StatusCache::new();
    cache.update(snapshot(1));
    cache.update(snapshot(7));

    let latest = cache.latest().expect("snapshot should be cached");
    assert_eq!(latest.active_peers, 7);
    assert_eq!(latest.servers.len(), 1);
}

#[rstest]
fn clones_share_the_same_snapshot() {
    let cache = StatusCache::new();
    let reader = cache.clone();
    cache.update(snapshot(3));

    assert_eq!(
        reader.latest().map(|latest| latest.active_peers),
        Some(3)
    );
}

#[rstest]
fn error_snapshot_carries_zeroed_counts() {
    let snapshot = StatusSnapshot::for_error(Utc::now(), "backing store unavailable");
    assert_eq!(snapshot.active_peers, 0);
    assert_eq!(snapshot.server_count, 0);
    assert!(snapshot.servers.is_empty());
    assert_eq!(
        snapshot.error.as_deref(),
        Some("backing store unavailable")
    );
}
