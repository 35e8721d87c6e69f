//! Unit tests for peer lifecycle operations and handshake parsing.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use rstest::rstest;

use super::probe::{self, HANDSHAKE_COMMAND, Handshake, ProbeError, parse_handshakes};
use super::{
    RemovalOutcome, WG_CONF_PATH, WgError, WgManager, extract_private_key, parse_peer_names,
    profile_path,
};
use crate::remote::SessionError;
use crate::test_support::{ScriptedConsole, ScriptedTransport};

const FAST_POLL: Duration = Duration::from_millis(1);
const SHORT_TIMEOUT: Duration = Duration::from_millis(40);

const WG_CONF: &str = "\
[Interface]\n\
PrivateKey = c2VydmVy\n\
Address = 10.7.0.1/24\n\
# BEGIN_PEER hd-coral7\n\
[Peer]\n\
PublicKey = aaa=\n\
# END_PEER hd-coral7\n\
# BEGIN_PEER hd-kelp9\n\
[Peer]\n\
PublicKey = bbb=\n\
# END_PEER hd-kelp9\n\
# BEGIN_PEER hd-moss3\n\
[Peer]\n\
PublicKey = ccc=\n\
# END_PEER hd-moss3\n";

const PROFILE: &str = "\
[Interface]\n\
PrivateKey = cHJpdmF0ZQ==\n\
Address = 10.7.0.2/24\n";

fn manager(transport: ScriptedTransport) -> WgManager<ScriptedTransport> {
    WgManager::new(transport).with_poll_interval(FAST_POLL)
}

fn install_console() -> ScriptedConsole {
    let console = ScriptedConsole::new();
    console.push_chunk("Port [51820]: ");
    console.push_chunk("Name [client]: ");
    console.push_chunk("DNS server [1]: ");
    console.push_chunk("Press any key to continue... ");
    console.push_chunk("Finished!\n");
    console
}

#[rstest]
fn add_peer_installs_service_on_first_use() {
    let transport = ScriptedTransport::new();
    let console = install_console();
    transport.push_console(console.clone());
    transport.put_file(profile_path("tester"), PROFILE);

    let profile = manager(transport.clone())
        .add_peer("tester")
        .expect("install should succeed");

    assert_eq!(profile.private_key, "cHJpdmF0ZQ==");
    assert_eq!(profile.config, PROFILE);
    let sent = console.sent();
    assert_eq!(
        sent.first().map(String::as_str),
        Some("wget https://git.io/wireguard -O wireguard-install.sh && bash wireguard-install.sh\n"),
        "uninitialised host must run the installer"
    );
    assert_eq!(
        sent,
        vec![
            String::from(
                "wget https://git.io/wireguard -O wireguard-install.sh && bash wireguard-install.sh\n"
            ),
            String::from("\n"),
            String::from("tester\n"),
            String::from("3\n"),
            String::from("\n"),
        ]
    );
}

#[rstest]
fn add_peer_uses_menu_when_already_installed() {
    let transport = ScriptedTransport::new();
    transport.put_file(WG_CONF_PATH, WG_CONF);
    let console = ScriptedConsole::new();
    console.push_chunk("Option: ");
    console.push_chunk("Name: ");
    console.push_chunk("DNS server [1]: ");
    console.push_chunk("Press any key to continue... ");
    console.push_chunk("hd-newt2 added.\n");
    transport.push_console(console.clone());
    transport.put_file(profile_path("hd-newt2"), PROFILE);

    let profile = manager(transport)
        .add_peer("hd-newt2")
        .expect("add should succeed");

    assert_eq!(profile.private_key, "cHJpdmF0ZQ==");
    assert_eq!(
        console.sent(),
        vec![
            String::from("bash wireguard-install.sh\n"),
            String::from("1\n"),
            String::from("hd-newt2\n"),
            String::from("3\n"),
            String::from("\n"),
        ]
    );
}

#[rstest]
fn overlong_name_is_rejected_before_any_remote_call() {
    let transport = ScriptedTransport::new();

    let err = manager(transport.clone())
        .add_peer("a-name-well-beyond-limit")
        .expect_err("name must be rejected");

    assert!(matches!(err, WgError::NameTooLong { .. }));
    assert_eq!(transport.consoles_opened(), 0, "no session interaction expected");
    assert!(transport.exec_commands().is_empty());
}

#[rstest]
fn stalled_installer_surfaces_a_timeout_error() {
    let transport = ScriptedTransport::new();
    transport.push_console(ScriptedConsole::new());

    let err = manager(transport)
        .with_timeouts(SHORT_TIMEOUT, SHORT_TIMEOUT)
        .add_peer("tester")
        .expect_err("stalled installer must fail");

    assert!(matches!(
        err,
        WgError::ExchangeTimeout {
            operation: "install",
            ..
        }
    ));
}

#[rstest]
fn profile_without_private_key_is_malformed() {
    let transport = ScriptedTransport::new();
    transport.push_console(install_console());
    transport.put_file(profile_path("tester"), "[Interface]\nAddress = 10.7.0.2/24\n");

    let err = manager(transport)
        .add_peer("tester")
        .expect_err("profile without key must fail");

    assert!(matches!(err, WgError::MalformedProfile { .. }));
}

#[rstest]
fn list_peers_reads_config_markers_in_order() {
    let transport = ScriptedTransport::new();
    transport.put_file(WG_CONF_PATH, WG_CONF);

    let peers = manager(transport).list_peers().expect("listing should succeed");

    assert_eq!(peers, vec!["hd-coral7", "hd-kelp9", "hd-moss3"]);
}

#[rstest]
fn list_peers_treats_missing_config_as_empty() {
    let transport = ScriptedTransport::new();

    let peers = manager(transport.clone())
        .list_peers()
        .expect("missing config is not an error");

    assert!(peers.is_empty());
    assert_eq!(transport.consoles_opened(), 0);
}

#[rstest]
fn remove_peer_uses_its_current_position() {
    let transport = ScriptedTransport::new();
    transport.put_file(WG_CONF_PATH, WG_CONF);
    let console = ScriptedConsole::new();
    console.push_chunk("Option: ");
    console.push_chunk("Client: ");
    console.push_chunk("Confirm hd-kelp9 removal? [y/N]: ");
    console.push_chunk("Press any key to continue... ");
    console.push_chunk("hd-kelp9 removed!\n");
    transport.push_console(console.clone());

    let outcome = manager(transport)
        .remove_peer("hd-kelp9")
        .expect("removal should succeed");

    assert_eq!(outcome, RemovalOutcome::Removed);
    assert_eq!(
        console.sent(),
        vec![
            String::from("bash wireguard-install.sh\n"),
            String::from("2\n"),
            String::from("2\n"),
            String::from("y\n"),
            String::from("\n"),
        ],
        "second menu option, then the peer's 1-based position"
    );
}

#[rstest]
fn remove_unknown_peer_is_a_noop() {
    let transport = ScriptedTransport::new();
    transport.put_file(WG_CONF_PATH, WG_CONF);

    let outcome = manager(transport.clone())
        .remove_peer("hd-ghost1")
        .expect("unknown peer is not an error");

    assert_eq!(outcome, RemovalOutcome::NotFound);
    assert_eq!(transport.consoles_opened(), 0);
}

#[rstest]
fn remove_without_config_is_a_noop() {
    let transport = ScriptedTransport::new();

    let outcome = manager(transport.clone())
        .remove_peer("hd-coral7")
        .expect("missing config is not an error");

    assert_eq!(outcome, RemovalOutcome::NoConfig);
    assert_eq!(transport.consoles_opened(), 0);
}

#[rstest]
#[case("PrivateKey = cHJpdmF0ZQ==", Some("cHJpdmF0ZQ=="))]
#[case("PrivateKey=abc123", Some("abc123"))]
#[case("  PrivateKey   =   spaced==  ", Some("spaced=="))]
#[case("PublicKey = notme", None)]
#[case("PrivateKey =", None)]
#[case("", None)]
fn private_key_extraction(#[case] config: &str, #[case] expected: Option<&str>) {
    assert_eq!(
        extract_private_key(config),
        expected.map(ToOwned::to_owned)
    );
}

#[rstest]
fn peer_name_parsing_skips_unrelated_lines() {
    let names = parse_peer_names("# BEGIN_PEER one\njunk\n#BEGIN_PEER nospace\n# BEGIN_PEER two extra\n");
    assert_eq!(names, vec!["one", "two"]);
}

mod handshake_parsing {
    use super::*;

    #[rstest]
    fn documented_scenario_parses_to_never_and_utc() {
        let map = parse_handshakes("wg0 abc123= 0\nwg0 def456= 1700000000\n");

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("abc123="), Some(&Handshake::Never));
        let expected = Utc.timestamp_opt(1_700_000_000, 0).single().expect("valid epoch");
        assert_eq!(map.get("def456="), Some(&Handshake::At(expected)));
    }

    #[rstest]
    #[case("wg0 key= extra fields here\n")]
    #[case("wg0 onlytwo\n")]
    #[case("\n\n")]
    fn malformed_rows_are_skipped_without_failing(#[case] output: &str) {
        assert!(parse_handshakes(output).is_empty());
    }

    #[rstest]
    fn non_numeric_epoch_means_never_contacted() {
        let map = parse_handshakes("wg0 abc123= not-a-number\n");
        assert_eq!(map.get("abc123="), Some(&Handshake::Never));
    }

    #[rstest]
    fn mixed_output_keeps_good_rows() {
        let map = parse_handshakes("garbage\nwg0 good= 1700000000\nwg0 bad= x y\n");
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("good="));
    }
}

mod handshake_probe {
    use super::*;

    #[rstest]
    fn probe_runs_the_status_command_once() {
        let transport = ScriptedTransport::new();
        transport.push_exec("wg0 abc123= 0\n", "");
        let mut session = transport.clone();

        let map = probe::latest_handshakes(&mut session).expect("probe should succeed");

        assert_eq!(map.len(), 1);
        assert_eq!(transport.exec_commands(), vec![String::from(HANDSHAKE_COMMAND)]);
    }

    #[rstest]
    fn stderr_output_is_a_probe_error_not_an_empty_map() {
        let transport = ScriptedTransport::new();
        transport.push_exec("", "Unable to access interface");
        let mut session = transport.clone();

        let err = probe::latest_handshakes(&mut session).expect_err("stderr must fail the probe");

        assert!(matches!(err, ProbeError::Remote { .. }));
    }

    #[rstest]
    fn command_failure_is_a_probe_error() {
        let transport = ScriptedTransport::new();
        transport.push_exec_error(SessionError::Closed);
        let mut session = transport.clone();

        let err = probe::latest_handshakes(&mut session).expect_err("exec failure must fail");

        assert!(matches!(err, ProbeError::Command(_)));
    }
}
