//! Repository collaborator interface.
//!
//! The relational persistence of servers, peers, and settings lives
//! outside this crate. The lifecycle subsystem consumes it through the
//! [`Repository`] trait so tests can drive an in-memory fake.

use std::time::Duration;

use thiserror::Error;

use crate::model::{Peer, PeerId, Server, ServerId};

/// Settings key holding the reaper's inactivity threshold as a duration.
pub const INACTIVITY_THRESHOLD_KEY: &str = "inactivity_threshold";

/// Errors surfaced by repository implementations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RepositoryError {
    /// Raised when a uniqueness constraint is violated, for example a
    /// duplicate peer name on a server or a duplicate server address.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflicting record.
        message: String,
    },
    /// Raised when a referenced record does not exist.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing record.
        what: String,
    },
    /// Raised for any other storage-level failure.
    #[error("storage failure: {message}")]
    Storage {
        /// Human-readable error message.
        message: String,
    },
}

/// Abstract persistence of servers, peers, and typed settings.
pub trait Repository {
    /// Lists every server in the fleet.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Storage`] when the backing store fails.
    fn list_servers(&self) -> Result<Vec<Server>, RepositoryError>;

    /// Lists every peer across all servers.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Storage`] when the backing store fails.
    fn list_peers(&self) -> Result<Vec<Peer>, RepositoryError>;

    /// Lists the peers attached to one server.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Storage`] when the backing store fails.
    fn peers_for(&self, server: ServerId) -> Result<Vec<Peer>, RepositoryError> {
        Ok(self
            .list_peers()?
            .into_iter()
            .filter(|peer| peer.server_id == server)
            .collect())
    }

    /// Fetches a single peer by id.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when the peer does not exist.
    fn get_peer(&self, peer: PeerId) -> Result<Peer, RepositoryError>;

    /// Fetches a single server by id.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when the server does not
    /// exist.
    fn get_server(&self, server: ServerId) -> Result<Server, RepositoryError>;

    /// Persists a freshly created peer and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Conflict`] when the `(server, name)`
    /// pair already exists.
    fn create_peer(
        &self,
        server: ServerId,
        name: &str,
        public_key: &str,
        config: &str,
    ) -> Result<Peer, RepositoryError>;

    /// Deletes a single peer.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when the peer does not exist.
    fn delete_peer(&self, peer: PeerId) -> Result<(), RepositoryError>;

    /// Deletes a server and, by cascade, all of its peers.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when the server does not
    /// exist.
    fn delete_server(&self, server: ServerId) -> Result<(), RepositoryError>;

    /// Reads a duration-typed setting, `None` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Storage`] when the backing store fails.
    fn get_duration_setting(&self, key: &str) -> Result<Option<Duration>, RepositoryError>;

    /// Writes a duration-typed setting.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Storage`] when the backing store fails.
    fn set_duration_setting(&self, key: &str, value: Duration) -> Result<(), RepositoryError>;
}
