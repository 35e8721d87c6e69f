//! Process-wide last-known-status cache.
//!
//! Observability surfaces read the most recent check result instead of
//! re-running it. The cache is an explicitly constructed handle passed to
//! its consumers; clones share the same snapshot. Writers replace the
//! snapshot wholesale, so readers never observe a partial update.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-server summary inside a [`StatusSnapshot`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ServerStatus {
    /// Provider region identifier.
    pub location: String,
    /// Public address of the server.
    pub ip_address: String,
    /// Number of peers attached to the server.
    pub peer_count: usize,
}

/// Aggregate result of one fleet check.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// When the check ran, in UTC.
    pub checked_at: DateTime<Utc>,
    /// Total peers across the fleet.
    pub active_peers: usize,
    /// Number of servers in the fleet.
    pub server_count: usize,
    /// Per-server summaries.
    pub servers: Vec<ServerStatus>,
    /// Error description when the check itself failed.
    pub error: Option<String>,
}

impl StatusSnapshot {
    /// Builds an error snapshot with zeroed counts.
    #[must_use]
    pub fn for_error(checked_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            checked_at,
            active_peers: 0,
            server_count: 0,
            servers: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Shared holder of the most recent [`StatusSnapshot`].
#[derive(Clone, Debug, Default)]
pub struct StatusCache {
    inner: Arc<Mutex<Option<StatusSnapshot>>>,
}

impl StatusCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<StatusSnapshot>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replaces the cached snapshot wholesale.
    pub fn update(&self, snapshot: StatusSnapshot) {
        *self.lock() = Some(snapshot);
    }

    /// Returns a copy of the most recent snapshot, `None` before the
    /// first check.
    #[must_use]
    pub fn latest(&self) -> Option<StatusSnapshot> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests;
