//! Provisioner collaborator interface.
//!
//! Creating and destroying the underlying compute resource is delegated
//! to an external infrastructure engine. Only teardown is consumed here;
//! the reaper and fleet manager never create servers.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::model::Server;

/// Errors surfaced while tearing down a compute resource.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// Raised when the provider rejects or fails the teardown.
    #[error("failed to destroy server {address}: {message}")]
    Destroy {
        /// Address of the server that could not be destroyed.
        address: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Future returned by provisioner operations.
pub type ProvisionFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ProvisionError>> + Send + 'a>>;

/// Minimal interface implemented by provisioning engines.
pub trait Provisioner: Send + Sync {
    /// Destroys the remote compute resource backing `server`.
    ///
    /// Repository state is not touched; callers delete the record
    /// separately once teardown succeeds.
    fn destroy<'a>(&'a self, server: &'a Server) -> ProvisionFuture<'a>;
}
