//! Peer lifecycle operations against the remote WireGuard installer.
//!
//! The installer is an interactive script, not an API: installation and
//! peer management are driven by scripted prompt/response exchanges, and
//! generated secrets are pulled back out of the files it writes. Whether
//! a server is initialised is tracked implicitly by the presence of the
//! service config file on the host.

use std::time::Duration;

use thiserror::Error;

use crate::naming::PEER_NAME_MAX;
use crate::remote::{Dialogue, DialogueOutcome, Exchange, SessionError, Transport};

pub mod probe;

/// Remote path of the WireGuard service configuration.
pub const WG_CONF_PATH: &str = "/etc/wireguard/wg0.conf";

const INSTALL_COMMAND: &str =
    "wget https://git.io/wireguard -O wireguard-install.sh && bash wireguard-install.sh";
const MENU_COMMAND: &str = "bash wireguard-install.sh";

const INSTALL_TIMEOUT: Duration = Duration::from_secs(900);
const MENU_TIMEOUT: Duration = Duration::from_secs(600);

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors raised by peer lifecycle operations.
#[derive(Debug, Error)]
pub enum WgError {
    /// Raised before any remote interaction when a peer name exceeds the
    /// tool's limit.
    #[error("peer name {name:?} exceeds {max} characters")]
    NameTooLong {
        /// Offending name.
        name: String,
        /// Maximum accepted length.
        max: usize,
    },
    /// Raised when a scripted exchange did not reach its completion
    /// marker in time. Not retried automatically.
    #[error("remote tool did not complete {operation} within {timeout:?}")]
    ExchangeTimeout {
        /// Operation that timed out (`install`, `add`, `remove`).
        operation: &'static str,
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// Raised when a generated profile has no `PrivateKey` entry.
    #[error("generated profile at {path} has no PrivateKey entry")]
    MalformedProfile {
        /// Remote path of the malformed profile.
        path: String,
    },
    /// Raised when the underlying session fails.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// A freshly generated client profile.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PeerProfile {
    /// Full profile text handed to the user.
    pub config: String,
    /// Private key extracted from the profile. Returned once, never
    /// persisted by this subsystem.
    pub private_key: String,
}

/// Result of a peer removal attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RemovalOutcome {
    /// The peer was removed on the remote host.
    Removed,
    /// The peer name was not present in the service configuration; the
    /// operation was a warned no-op.
    NotFound,
    /// The service configuration file is absent (nothing installed); the
    /// operation was a warned no-op.
    NoConfig,
}

/// Drives install, add, remove, and enumerate operations over one
/// transport.
///
/// Peer removal works on positional indices recomputed from the current
/// config file order, so callers must serialize peer mutations per
/// server; concurrent mutation of the same server invalidates positions
/// mid-flight.
#[derive(Debug)]
pub struct WgManager<T: Transport> {
    transport: T,
    poll_interval: Duration,
    install_timeout: Duration,
    menu_timeout: Duration,
}

impl<T: Transport> WgManager<T> {
    /// Wraps a connected transport.
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            poll_interval: DEFAULT_POLL_INTERVAL,
            install_timeout: INSTALL_TIMEOUT,
            menu_timeout: MENU_TIMEOUT,
        }
    }

    /// Overrides the dialogue poll interval.
    ///
    /// This is primarily used by tests to keep scripted runs fast.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Overrides the install and menu operation timeouts.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_timeouts(mut self, install: Duration, menu: Duration) -> Self {
        self.install_timeout = install;
        self.menu_timeout = menu;
        self
    }

    /// Consumes the manager and returns the transport.
    #[must_use]
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Returns whether the WireGuard service is installed on the host.
    ///
    /// # Errors
    ///
    /// Returns [`WgError::Session`] when the session fails.
    pub fn is_installed(&mut self) -> Result<bool, WgError> {
        Ok(self.transport.file_exists(WG_CONF_PATH)?)
    }

    /// Adds a peer, installing the service first when the host is
    /// uninitialised. Returns the generated profile.
    ///
    /// # Errors
    ///
    /// Returns [`WgError::NameTooLong`] before any remote interaction,
    /// [`WgError::ExchangeTimeout`] when the installer stalls, and
    /// [`WgError::MalformedProfile`] when the generated profile carries
    /// no private key.
    pub fn add_peer(&mut self, name: &str) -> Result<PeerProfile, WgError> {
        validate_peer_name(name)?;

        let outcome = if self.is_installed()? {
            tracing::info!(peer = name, "adding peer via installer menu");
            self.run_script("add", MENU_COMMAND, add_exchanges(name)?, &format!("{name} added."), self.menu_timeout)?
        } else {
            tracing::info!(peer = name, "service not installed, running installer");
            self.run_script(
                "install",
                INSTALL_COMMAND,
                install_exchanges(name)?,
                "Finished!",
                self.install_timeout,
            )?
        };
        tracing::trace!(bytes = outcome.transcript.len(), "installer transcript captured");

        self.read_profile(name)
    }

    /// Lists peer names recorded in the service configuration.
    ///
    /// A missing configuration file means nothing is installed and is
    /// reported as an empty list rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`WgError::Session`] when the config file exists but
    /// cannot be read.
    pub fn list_peers(&mut self) -> Result<Vec<String>, WgError> {
        if !self.is_installed()? {
            tracing::warn!(path = WG_CONF_PATH, "service configuration not found");
            return Ok(Vec::new());
        }
        let conf = self.transport.read_file(WG_CONF_PATH)?;
        Ok(parse_peer_names(&conf))
    }

    /// Removes a peer by name.
    ///
    /// The peer's menu position is recomputed from the current config
    /// file order on every call; positions are never persisted.
    ///
    /// # Errors
    ///
    /// Returns [`WgError::ExchangeTimeout`] when the installer stalls and
    /// [`WgError::Session`] when the session fails. An absent config file
    /// or unknown name is a warned no-op, reported via
    /// [`RemovalOutcome`].
    pub fn remove_peer(&mut self, name: &str) -> Result<RemovalOutcome, WgError> {
        if !self.is_installed()? {
            tracing::warn!(peer = name, "nothing to remove, service not installed");
            return Ok(RemovalOutcome::NoConfig);
        }
        let conf = self.transport.read_file(WG_CONF_PATH)?;
        let peers = parse_peer_names(&conf);
        let Some(index) = peers.iter().position(|peer| peer == name) else {
            tracing::warn!(peer = name, "peer not present in service configuration");
            return Ok(RemovalOutcome::NotFound);
        };
        let position = index + 1;

        tracing::info!(peer = name, position, "removing peer");
        self.run_script(
            "remove",
            MENU_COMMAND,
            remove_exchanges(position)?,
            &format!("{name} removed!"),
            self.menu_timeout,
        )?;
        Ok(RemovalOutcome::Removed)
    }

    fn run_script(
        &mut self,
        operation: &'static str,
        command: &str,
        exchanges: Vec<Exchange>,
        completion_marker: &str,
        timeout: Duration,
    ) -> Result<DialogueOutcome, WgError> {
        let dialogue = Dialogue::new(exchanges, completion_marker, timeout)
            .with_poll_interval(self.poll_interval);
        let mut console = self.transport.open_console()?;
        let outcome = dialogue.run(&mut console, command)?;
        if !outcome.completed {
            return Err(WgError::ExchangeTimeout { operation, timeout });
        }
        Ok(outcome)
    }

    fn read_profile(&mut self, name: &str) -> Result<PeerProfile, WgError> {
        let path = profile_path(name);
        let config = self.transport.read_file(&path)?;
        let private_key =
            extract_private_key(&config).ok_or(WgError::MalformedProfile { path })?;
        Ok(PeerProfile {
            config,
            private_key,
        })
    }
}

/// Remote path of the generated profile for `name`.
#[must_use]
pub fn profile_path(name: &str) -> String {
    format!("/root/{name}.conf")
}

/// Rejects peer names the remote tool would not accept.
///
/// Callers validate before opening any session so an invalid name never
/// causes remote interaction.
///
/// # Errors
///
/// Returns [`WgError::NameTooLong`] when `name` exceeds
/// [`PEER_NAME_MAX`] characters.
pub fn validate_peer_name(name: &str) -> Result<(), WgError> {
    if name.chars().count() > PEER_NAME_MAX {
        return Err(WgError::NameTooLong {
            name: name.to_owned(),
            max: PEER_NAME_MAX,
        });
    }
    Ok(())
}

fn install_exchanges(name: &str) -> Result<Vec<Exchange>, SessionError> {
    Ok(vec![
        Exchange::new(r"Port \[51820\]:\s*$", "\n")?,
        Exchange::new(r"Name \[client\]:\s*$", format!("{name}\n"))?,
        Exchange::new(r"DNS server \[1\]:\s*$", "3\n")?,
        Exchange::new(r"Press any key to continue\.\.\.\s*$", "\n")?,
    ])
}

fn add_exchanges(name: &str) -> Result<Vec<Exchange>, SessionError> {
    Ok(vec![
        Exchange::new(r"Option:\s*$", "1\n")?,
        Exchange::new(r"Name:\s*$", format!("{name}\n"))?,
        Exchange::new(r"DNS server \[1\]:\s*$", "3\n")?,
        Exchange::new(r"Press any key to continue\.\.\.\s*$", "\n")?,
    ])
}

fn remove_exchanges(position: usize) -> Result<Vec<Exchange>, SessionError> {
    Ok(vec![
        Exchange::new(r"Option:\s*$", "2\n")?,
        Exchange::new(r"Client:\s*$", format!("{position}\n"))?,
        Exchange::new(r"Confirm .* removal\? \[y/N\]:\s*$", "y\n")?,
        Exchange::new(r"Press any key to continue\.\.\.\s*$", "\n")?,
    ])
}

/// Extracts peer names from `# BEGIN_PEER <name>` markers in the service
/// configuration, in file order.
#[must_use]
pub fn parse_peer_names(conf: &str) -> Vec<String> {
    conf.lines()
        .filter_map(|line| line.trim_start().strip_prefix("# BEGIN_PEER "))
        .filter_map(|rest| rest.split_whitespace().next())
        .map(ToOwned::to_owned)
        .collect()
}

/// Extracts the `PrivateKey = <value>` entry from a profile, `None` when
/// absent.
#[must_use]
pub fn extract_private_key(config: &str) -> Option<String> {
    config.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        if key.trim() != "PrivateKey" {
            return None;
        }
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    })
}

#[cfg(test)]
mod tests;
