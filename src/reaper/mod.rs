//! Inactivity reaper: destroys servers whose peers have gone quiet.
//!
//! Liveness is inferred from WireGuard handshake telemetry. One active
//! peer vetoes destruction for the whole server; a transient measurement
//! failure is treated as "no information" and the server is left alone
//! until the next cycle.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::Peer;
use crate::provision::Provisioner;
use crate::remote::{Connect, Transport};
use crate::repository::{INACTIVITY_THRESHOLD_KEY, Repository, RepositoryError};
use crate::wireguard::probe::{self, Handshake, HandshakeMap};

/// Default minimum age before a server may be considered for
/// destruction. Protects just-created servers whose peers are still
/// being attached.
pub const DEFAULT_MINIMUM_SERVER_AGE: Duration = Duration::from_secs(15 * 60);

/// Default inactivity threshold when the repository carries no setting.
pub const DEFAULT_INACTIVITY_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// Tunables for the reaper's decision procedure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReaperConfig {
    /// Servers younger than this are never reaped.
    pub minimum_server_age: Duration,
    /// Inactivity threshold used when the repository setting is absent.
    pub default_inactivity_threshold: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            minimum_server_age: DEFAULT_MINIMUM_SERVER_AGE,
            default_inactivity_threshold: DEFAULT_INACTIVITY_THRESHOLD,
        }
    }
}

impl ReaperConfig {
    /// Overrides the minimum server age.
    #[must_use]
    pub const fn with_minimum_server_age(mut self, age: Duration) -> Self {
        self.minimum_server_age = age;
        self
    }

    /// Overrides the fallback inactivity threshold.
    #[must_use]
    pub const fn with_default_inactivity_threshold(mut self, threshold: Duration) -> Self {
        self.default_inactivity_threshold = threshold;
        self
    }
}

/// Summary of one reaper sweep.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SweepSummary {
    /// Servers examined during the sweep.
    pub examined: usize,
    /// Servers destroyed for inactivity.
    pub destroyed: usize,
    /// Servers skipped for being younger than the minimum age.
    pub skipped_young: usize,
    /// Servers whose processing failed and was deferred to a later
    /// cycle.
    pub failed: usize,
}

/// Errors that abort a whole sweep.
///
/// Per-server failures never abort the sweep; they are logged and
/// counted in [`SweepSummary::failed`].
#[derive(Debug, Error)]
pub enum ReaperError {
    /// Raised when the fleet listing itself cannot be read.
    #[error("failed to list fleet state: {0}")]
    Repository(#[from] RepositoryError),
}

/// Destroys servers with no recent peer activity.
#[derive(Clone, Debug)]
pub struct Reaper<R, P, C> {
    repository: R,
    provisioner: P,
    connector: C,
    config: ReaperConfig,
}

impl<R, P, C> Reaper<R, P, C>
where
    R: Repository,
    P: Provisioner,
    C: Connect,
{
    /// Creates a reaper over the given collaborators.
    #[must_use]
    pub const fn new(repository: R, provisioner: P, connector: C, config: ReaperConfig) -> Self {
        Self {
            repository,
            provisioner,
            connector,
            config,
        }
    }

    /// Returns the effective inactivity threshold: the repository
    /// setting when present, the configured default otherwise.
    #[must_use]
    pub fn inactivity_threshold(&self) -> Duration {
        match self.repository.get_duration_setting(INACTIVITY_THRESHOLD_KEY) {
            Ok(Some(threshold)) => threshold,
            Ok(None) => self.config.default_inactivity_threshold,
            Err(err) => {
                tracing::warn!(%err, "could not read inactivity threshold, using default");
                self.config.default_inactivity_threshold
            }
        }
    }

    /// Sweeps the fleet once, destroying every eligible server.
    ///
    /// Each server's processing is isolated: connection, probe,
    /// teardown, and repository failures are logged, counted, and leave
    /// the server intact for the next cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ReaperError::Repository`] only when the initial fleet
    /// listing fails.
    pub async fn sweep(&self) -> Result<SweepSummary, ReaperError> {
        let servers = self.repository.list_servers()?;
        let now = Utc::now();
        let threshold = self.inactivity_threshold();

        let Some(activity_cutoff) = cutoff(now, threshold) else {
            tracing::warn!(?threshold, "unrepresentable inactivity threshold, skipping sweep");
            return Ok(SweepSummary::default());
        };
        let Some(age_cutoff) = cutoff(now, self.config.minimum_server_age) else {
            tracing::warn!("unrepresentable minimum server age, skipping sweep");
            return Ok(SweepSummary::default());
        };

        let mut summary = SweepSummary::default();
        for server in servers {
            summary.examined += 1;

            if server.created_at > age_cutoff {
                tracing::debug!(server = %server.ip_address, "skipping server, too young");
                summary.skipped_young += 1;
                continue;
            }

            let peers = match self.repository.peers_for(server.id) {
                Ok(peers) => peers,
                Err(err) => {
                    tracing::error!(server = %server.ip_address, %err, "failed to list peers");
                    summary.failed += 1;
                    continue;
                }
            };

            let idle = if peers.is_empty() {
                // Nothing can ever hand-shake against a peerless server.
                true
            } else {
                let probed = match self.connector.connect(&server) {
                    Ok(mut transport) => {
                        let result = probe::latest_handshakes(&mut transport);
                        transport.close();
                        result
                    }
                    Err(err) => {
                        tracing::error!(server = %server.ip_address, %err, "could not open session");
                        summary.failed += 1;
                        continue;
                    }
                };
                match probed {
                    Ok(handshakes) => all_peers_inactive(&peers, &handshakes, activity_cutoff),
                    Err(err) => {
                        // No information is not the same as confirmed
                        // idle; leave the server for the next cycle.
                        tracing::warn!(server = %server.ip_address, %err, "probe failed, skipping server this cycle");
                        summary.failed += 1;
                        continue;
                    }
                }
            };

            if !idle {
                tracing::debug!(server = %server.ip_address, "server has recent activity");
                continue;
            }

            if let Err(err) = self.provisioner.destroy(&server).await {
                tracing::error!(server = %server.ip_address, %err, "teardown failed, leaving server intact");
                summary.failed += 1;
                continue;
            }
            if let Err(err) = self.repository.delete_server(server.id) {
                tracing::error!(server = %server.ip_address, %err, "failed to delete server record");
                summary.failed += 1;
                continue;
            }

            tracing::info!(server = %server.ip_address, peers = peers.len(), "destroyed idle server");
            summary.destroyed += 1;
        }

        Ok(summary)
    }
}

/// Returns `now - duration`, `None` when the subtraction is not
/// representable.
fn cutoff(now: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
}

/// Returns whether every peer fails the activity test against `cutoff`.
///
/// A peer with a recorded handshake is compared on that handshake; a
/// peer that never handshook (or is missing from the map) falls back to
/// its creation time. Contact at or after the cutoff vetoes destruction.
fn all_peers_inactive(peers: &[Peer], handshakes: &HandshakeMap, cutoff: DateTime<Utc>) -> bool {
    peers.iter().all(|peer| {
        let last_contact = match handshakes.get(&peer.public_key) {
            Some(Handshake::At(time)) => *time,
            Some(Handshake::Never) | None => peer.created_at,
        };
        last_contact < cutoff
    })
}
