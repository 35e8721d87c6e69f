//! Unit tests for fleet-level peer operations.

use std::time::Duration;

use rstest::rstest;

use super::{FleetError, FleetManager};
use crate::model::{PeerId, ServerId};
use crate::repository::RepositoryError;
use crate::test_support::{
    MemoryRepository, RecordingProvisioner, ScriptedConnect, ScriptedConsole, ScriptedTransport,
    StubKeys, peer_fixture, server_fixture,
};
use crate::wireguard::{WG_CONF_PATH, WgError, profile_path};

const PROFILE: &str = "\
[Interface]\n\
PrivateKey = cHJpdmF0ZQ==\n\
Address = 10.7.0.2/24\n";

fn conf_with_peers(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| format!("# BEGIN_PEER {name}\n[Peer]\n# END_PEER {name}\n"))
        .collect()
}

fn add_console(name: &str) -> ScriptedConsole {
    let console = ScriptedConsole::new();
    console.push_chunk("Option: ");
    console.push_chunk("Name: ");
    console.push_chunk("DNS server [1]: ");
    console.push_chunk("Press any key to continue... ");
    console.push_chunk(format!("{name} added.\n"));
    console
}

fn remove_console(name: &str) -> ScriptedConsole {
    let console = ScriptedConsole::new();
    console.push_chunk("Option: ");
    console.push_chunk("Client: ");
    console.push_chunk(format!("Confirm {name} removal? [y/N]: "));
    console.push_chunk("Press any key to continue... ");
    console.push_chunk(format!("{name} removed!\n"));
    console
}

fn fleet(
    repository: &MemoryRepository,
    provisioner: &RecordingProvisioner,
    connector: &ScriptedConnect,
) -> FleetManager<MemoryRepository, RecordingProvisioner, StubKeys, ScriptedConnect> {
    FleetManager::new(
        repository.clone(),
        provisioner.clone(),
        StubKeys,
        connector.clone(),
    )
}

#[rstest]
fn create_peer_drives_menu_and_persists_record() {
    let repository = MemoryRepository::new();
    repository.add_server(server_fixture(1, "10.0.0.1", Duration::from_secs(60)));
    let provisioner = RecordingProvisioner::new();

    let transport = ScriptedTransport::new();
    transport.put_file(WG_CONF_PATH, conf_with_peers(&["hd-coral7"]));
    transport.push_console(add_console("hd-newt2"));
    transport.put_file(profile_path("hd-newt2"), PROFILE);
    let connector = ScriptedConnect::new();
    connector.push_transport(transport.clone());

    let peer = fleet(&repository, &provisioner, &connector)
        .create_peer_named(ServerId(1), "hd-newt2")
        .expect("creation should succeed");

    assert_eq!(peer.name, "hd-newt2");
    assert_eq!(peer.public_key, "pk:cHJpdmF0ZQ==");
    assert_eq!(peer.config, PROFILE);
    assert_eq!(repository.peers().len(), 1);
    assert!(transport.is_closed(), "session must be released after the operation");
}

#[rstest]
fn overlong_name_never_opens_a_session() {
    let repository = MemoryRepository::new();
    repository.add_server(server_fixture(1, "10.0.0.1", Duration::from_secs(60)));
    let provisioner = RecordingProvisioner::new();
    let connector = ScriptedConnect::new();

    let err = fleet(&repository, &provisioner, &connector)
        .create_peer_named(ServerId(1), "a-name-well-beyond-limit")
        .expect_err("name must be rejected");

    assert!(matches!(
        err,
        FleetError::Lifecycle(WgError::NameTooLong { .. })
    ));
    assert!(
        connector.requests().is_empty(),
        "validation must happen before any connection attempt"
    );
    assert!(repository.peers().is_empty());
}

#[rstest]
fn duplicate_name_surfaces_a_conflict() {
    let repository = MemoryRepository::new();
    repository.add_server(server_fixture(1, "10.0.0.1", Duration::from_secs(60)));
    repository.add_peer(peer_fixture(
        7,
        ServerId(1),
        "hd-newt2",
        "pk:old",
        Duration::from_secs(60),
    ));
    let provisioner = RecordingProvisioner::new();

    let transport = ScriptedTransport::new();
    transport.put_file(WG_CONF_PATH, conf_with_peers(&["hd-newt2"]));
    transport.push_console(add_console("hd-newt2"));
    transport.put_file(profile_path("hd-newt2"), PROFILE);
    let connector = ScriptedConnect::new();
    connector.push_transport(transport);

    let err = fleet(&repository, &provisioner, &connector)
        .create_peer_named(ServerId(1), "hd-newt2")
        .expect_err("duplicate name must fail");

    assert!(matches!(
        err,
        FleetError::Repository(RepositoryError::Conflict { .. })
    ));
}

#[rstest]
fn unknown_server_is_reported_before_connecting() {
    let repository = MemoryRepository::new();
    let provisioner = RecordingProvisioner::new();
    let connector = ScriptedConnect::new();

    let err = fleet(&repository, &provisioner, &connector)
        .create_peer_named(ServerId(42), "hd-newt2")
        .expect_err("unknown server must fail");

    assert!(matches!(
        err,
        FleetError::Repository(RepositoryError::NotFound { .. })
    ));
    assert!(connector.requests().is_empty());
}

#[rstest]
#[tokio::test]
async fn removing_the_last_peer_destroys_the_server() {
    let repository = MemoryRepository::new();
    repository.add_server(server_fixture(1, "10.0.0.1", Duration::from_secs(60)));
    repository.add_peer(peer_fixture(
        1,
        ServerId(1),
        "hd-coral7",
        "pk:a",
        Duration::from_secs(60),
    ));
    let provisioner = RecordingProvisioner::new();

    let transport = ScriptedTransport::new();
    transport.put_file(WG_CONF_PATH, conf_with_peers(&["hd-coral7"]));
    transport.push_console(remove_console("hd-coral7"));
    let connector = ScriptedConnect::new();
    connector.push_transport(transport);

    fleet(&repository, &provisioner, &connector)
        .remove_peer(PeerId(1))
        .await
        .expect("removal should succeed");

    assert!(repository.peers().is_empty());
    assert!(repository.servers().is_empty());
    assert_eq!(provisioner.destroyed(), vec![String::from("10.0.0.1")]);
}

#[rstest]
#[tokio::test]
async fn removing_one_of_many_peers_keeps_the_server() {
    let repository = MemoryRepository::new();
    repository.add_server(server_fixture(1, "10.0.0.1", Duration::from_secs(60)));
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
    let provisioner = RecordingProvisioner::new();

    let transport = ScriptedTransport::new();
    transport.put_file(WG_CONF_PATH, conf_with_peers(&["hd-coral7", "hd-kelp9"]));
    transport.push_console(remove_console("hd-coral7"));
    let connector = ScriptedConnect::new();
    connector.push_transport(transport);

    fleet(&repository, &provisioner, &connector)
        .remove_peer(PeerId(1))
        .await
        .expect("removal should succeed");

    assert_eq!(repository.peers().len(), 1);
    assert_eq!(repository.servers().len(), 1);
    assert!(provisioner.destroyed().is_empty());
}

#[rstest]
#[tokio::test]
async fn peer_missing_on_host_still_deletes_the_record() {
    let repository = MemoryRepository::new();
    repository.add_server(server_fixture(1, "10.0.0.1", Duration::from_secs(60)));
    repository.add_peer(peer_fixture(
        1,
        ServerId(1),
        "hd-ghost1",
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
    let provisioner = RecordingProvisioner::new();

    // Config only knows the other peer: removal is a warned no-op on
    // the host, but the stale record still goes away.
    let transport = ScriptedTransport::new();
    transport.put_file(WG_CONF_PATH, conf_with_peers(&["hd-kelp9"]));
    let connector = ScriptedConnect::new();
    connector.push_transport(transport);

    fleet(&repository, &provisioner, &connector)
        .remove_peer(PeerId(1))
        .await
        .expect("stale record removal should succeed");

    assert_eq!(repository.peers().len(), 1);
    assert_eq!(repository.servers().len(), 1);
}
