//! Domain records shared across the lifecycle subsystem.
//!
//! Persistence of these records is owned by the external [`crate::repository::Repository`]
//! collaborator; this crate only holds them for the duration of an
//! operation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Opaque identifier assigned to a server by the repository.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ServerId(pub i64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ServerId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Opaque identifier assigned to a peer by the repository.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PeerId(pub i64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PeerId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A provisioned exit node.
///
/// The address is unique across the fleet; the SSH credential is the PEM
/// text of the key pair the server was provisioned with.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Server {
    /// Repository identifier.
    pub id: ServerId,
    /// Cloud provider the server runs on (for example `vultr`).
    pub provider: String,
    /// Project name the server was provisioned under.
    pub project_name: String,
    /// Public address used for SSH and VPN traffic.
    pub ip_address: String,
    /// SSH login user.
    pub username: String,
    /// PEM-encoded SSH private key.
    #[serde(skip_serializing)]
    pub ssh_private_key: String,
    /// Provider region identifier.
    pub location: String,
    /// Creation time in UTC.
    pub created_at: DateTime<Utc>,
}

/// A VPN client profile issued against one server.
///
/// The peer's WireGuard private key is returned once inside the profile
/// text at creation and never stored; only the derived public key is
/// persisted.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Peer {
    /// Repository identifier.
    pub id: PeerId,
    /// Server the peer belongs to. Deleting the server deletes its peers.
    pub server_id: ServerId,
    /// Peer name, unique per server, at most
    /// [`crate::naming::PEER_NAME_MAX`] characters.
    pub name: String,
    /// WireGuard public key, used to correlate handshake telemetry.
    pub public_key: String,
    /// Full client profile text handed to the user.
    pub config: String,
    /// Creation time in UTC.
    pub created_at: DateTime<Utc>,
}
