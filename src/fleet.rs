//! On-demand peer lifecycle composed over the external collaborators.
//!
//! Creating a peer drives the remote installer, derives the public key
//! from the extracted private key, and persists the record; removing the
//! last peer of a server also tears the server down. Callers must
//! serialize mutations per server id — peer removal works on positional
//! menu indices that concurrent mutation would invalidate.

use thiserror::Error;

use crate::keys::{KeyDerivation, KeyError};
use crate::model::{Peer, PeerId, Server, ServerId};
use crate::naming;
use crate::provision::{ProvisionError, Provisioner};
use crate::remote::{Connect, SessionError, Transport};
use crate::repository::{Repository, RepositoryError};
use crate::wireguard::{PeerProfile, RemovalOutcome, WgError, WgManager, validate_peer_name};

/// Errors raised by fleet-level peer operations.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Raised when persistence fails, including duplicate-name
    /// conflicts.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    /// Raised when the remote lifecycle operation fails.
    #[error(transparent)]
    Lifecycle(#[from] WgError),
    /// Raised when the host cannot be reached.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Raised when the public key cannot be derived.
    #[error(transparent)]
    Keys(#[from] KeyError),
    /// Raised when server teardown fails.
    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

/// Creates and removes peers across the fleet.
#[derive(Clone, Debug)]
pub struct FleetManager<R, P, K, C> {
    repository: R,
    provisioner: P,
    keys: K,
    connector: C,
}

impl<R, P, K, C> FleetManager<R, P, K, C>
where
    R: Repository,
    P: Provisioner,
    K: KeyDerivation,
    C: Connect,
{
    /// Creates a fleet manager over the given collaborators.
    #[must_use]
    pub const fn new(repository: R, provisioner: P, keys: K, connector: C) -> Self {
        Self {
            repository,
            provisioner,
            keys,
            connector,
        }
    }

    /// Creates a peer with a generated name on the given server.
    ///
    /// # Errors
    ///
    /// See [`FleetManager::create_peer_named`].
    pub fn create_peer(&self, server: ServerId) -> Result<Peer, FleetError> {
        let project = self.repository.get_server(server)?.project_name;
        self.create_peer_named(server, &naming::peer_name(&project))
    }

    /// Creates a peer with an explicit name on the given server.
    ///
    /// The name is validated before any session is opened. The remote
    /// installer generates the key material; the private key leaves this
    /// method only inside the returned config blob.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Lifecycle`] for invalid names and remote
    /// tool failures, [`FleetError::Session`] when the host is
    /// unreachable, and [`FleetError::Repository`] when the name is
    /// already in use.
    pub fn create_peer_named(&self, server: ServerId, name: &str) -> Result<Peer, FleetError> {
        validate_peer_name(name)?;
        let record = self.repository.get_server(server)?;

        let profile = self.drive_add(&record, name)?;
        let public_key = self.keys.derive_public_key(&profile.private_key)?;

        let peer = self
            .repository
            .create_peer(record.id, name, &public_key, &profile.config)?;
        tracing::info!(peer = name, server = %record.ip_address, "created peer");
        Ok(peer)
    }

    /// Removes a peer; when it was the server's last peer, the server is
    /// destroyed as well.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Session`] when the host is unreachable,
    /// [`FleetError::Lifecycle`] when the remote tool fails, and
    /// [`FleetError::Provision`] when the follow-up teardown fails.
    pub async fn remove_peer(&self, peer: PeerId) -> Result<(), FleetError> {
        let record = self.repository.get_peer(peer)?;
        let server = self.repository.get_server(record.server_id)?;

        let outcome = self.drive_remove(&server, &record.name)?;
        if outcome != RemovalOutcome::Removed {
            tracing::warn!(peer = %record.name, ?outcome, "peer was not present on the host");
        }

        self.repository.delete_peer(record.id)?;

        let remaining = self.repository.peers_for(server.id)?;
        if remaining.is_empty() {
            tracing::info!(server = %server.ip_address, "last peer removed, destroying server");
            self.provisioner.destroy(&server).await?;
            self.repository.delete_server(server.id)?;
        }
        Ok(())
    }

    fn drive_add(&self, server: &Server, name: &str) -> Result<PeerProfile, FleetError> {
        let transport = self.connector.connect(server)?;
        let mut manager = WgManager::new(transport);
        let result = manager.add_peer(name);
        let mut released = manager.into_transport();
        released.close();
        Ok(result?)
    }

    fn drive_remove(&self, server: &Server, name: &str) -> Result<RemovalOutcome, FleetError> {
        let transport = self.connector.connect(server)?;
        let mut manager = WgManager::new(transport);
        let result = manager.remove_peer(name);
        let mut released = manager.into_transport();
        released.close();
        Ok(result?)
    }
}

#[cfg(test)]
mod tests;
