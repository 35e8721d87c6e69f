//! Fleet status check: reap, summarise, cache.
//!
//! One check runs a reaper sweep, then snapshots the surviving fleet for
//! the status cache. The check implements [`Task`] so a
//! [`crate::schedule::PeriodicTask`] can drive it in the background.

use chrono::Utc;
use thiserror::Error;

use crate::provision::Provisioner;
use crate::reaper::{Reaper, ReaperError};
use crate::remote::Connect;
use crate::repository::{Repository, RepositoryError};
use crate::schedule::{Task, TaskFuture};
use crate::status::{ServerStatus, StatusCache, StatusSnapshot};

/// Errors raised by a fleet status check.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Raised when the reaper sweep cannot run at all.
    #[error(transparent)]
    Reaper(#[from] ReaperError),
    /// Raised when the post-sweep fleet listing fails.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Periodically checked view of the fleet.
#[derive(Clone, Debug)]
pub struct FleetMonitor<R, P, C> {
    reaper: Reaper<R, P, C>,
    repository: R,
    cache: StatusCache,
}

impl<R, P, C> FleetMonitor<R, P, C>
where
    R: Repository,
    P: Provisioner,
    C: Connect,
{
    /// Creates a monitor that sweeps with `reaper` and snapshots through
    /// `repository` into `cache`.
    #[must_use]
    pub const fn new(reaper: Reaper<R, P, C>, repository: R, cache: StatusCache) -> Self {
        Self {
            reaper,
            repository,
            cache,
        }
    }

    /// Runs one check: sweep, snapshot, cache update.
    ///
    /// A failed check still caches an error snapshot so observability
    /// surfaces see the failure, and then propagates the error so
    /// schedulers do not record a successful run.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] when the sweep or the fleet listing
    /// fails.
    pub async fn check(&self) -> Result<StatusSnapshot, MonitorError> {
        match self.run_check().await {
            Ok(snapshot) => {
                tracing::info!(
                    active_peers = snapshot.active_peers,
                    servers = snapshot.server_count,
                    "fleet status updated"
                );
                self.cache.update(snapshot.clone());
                Ok(snapshot)
            }
            Err(err) => {
                tracing::error!(%err, "fleet status check failed");
                self.cache
                    .update(StatusSnapshot::for_error(Utc::now(), err.to_string()));
                Err(err)
            }
        }
    }

    async fn run_check(&self) -> Result<StatusSnapshot, MonitorError> {
        let summary = self.reaper.sweep().await?;
        tracing::debug!(?summary, "reaper sweep finished");

        let servers = self.repository.list_servers()?;
        let peers = self.repository.list_peers()?;

        let mut server_statuses = Vec::with_capacity(servers.len());
        let mut active_peers = 0_usize;
        for server in &servers {
            let peer_count = peers
                .iter()
                .filter(|peer| peer.server_id == server.id)
                .count();
            active_peers += peer_count;
            server_statuses.push(ServerStatus {
                location: server.location.clone(),
                ip_address: server.ip_address.clone(),
                peer_count,
            });
        }

        Ok(StatusSnapshot {
            checked_at: Utc::now(),
            active_peers,
            server_count: servers.len(),
            servers: server_statuses,
            error: None,
        })
    }
}

impl<R, P, C> Task for FleetMonitor<R, P, C>
where
    R: Repository + Send + Sync + 'static,
    P: Provisioner + 'static,
    C: Connect + Send + Sync + 'static,
{
    fn run(&self) -> TaskFuture<'_> {
        Box::pin(async move {
            self.check().await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests;
