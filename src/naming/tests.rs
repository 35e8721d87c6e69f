//! Unit tests for name generation.

use rstest::rstest;

use super::{PEER_NAME_MAX, peer_name, project_name};

#[rstest]
fn project_name_has_two_words() {
    let name = project_name();
    assert_eq!(name.split('-').count(), 2, "unexpected name: {name}");
}

#[rstest]
#[case("happy-dolphin", "hd")]
#[case("bold-coral-crab", "bcc")]
#[case("solo", "s")]
fn peer_name_starts_with_project_initials(#[case] project: &str, #[case] prefix: &str) {
    let name = peer_name(project);
    assert!(
        name.starts_with(&format!("{prefix}-")),
        "expected prefix {prefix} in {name}"
    );
}

#[rstest]
fn peer_name_fits_remote_limit() {
    for _ in 0..64 {
        let name = peer_name("happy-dolphin");
        assert!(
            name.len() <= PEER_NAME_MAX,
            "name exceeds {PEER_NAME_MAX} chars: {name}"
        );
    }
}

#[rstest]
fn peer_names_vary() {
    let first = peer_name("happy-dolphin");
    let distinct = (0..16).any(|_| peer_name("happy-dolphin") != first);
    assert!(distinct, "expected random variation in peer names");
}
