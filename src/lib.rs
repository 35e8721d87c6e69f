//! Core library for the Skiff exit-node lifecycle automation.
//!
//! The crate drives the full lifecycle of throwaway WireGuard servers:
//! resilient SSH sessions to freshly booted hosts, scripted automation of
//! the interactive installer, handshake-based activity monitoring, and a
//! background reaper that destroys servers nobody is using. Cloud
//! provisioning, persistence, and key derivation are consumed through
//! collaborator traits.

pub mod fleet;
pub mod keys;
pub mod model;
pub mod monitor;
pub mod naming;
pub mod provision;
pub mod reaper;
pub mod remote;
pub mod repository;
pub mod schedule;
pub mod status;
pub mod test_support;
pub mod wireguard;

pub use fleet::{FleetError, FleetManager};
pub use keys::{KeyDerivation, KeyError};
pub use model::{Peer, PeerId, Server, ServerId};
pub use monitor::{FleetMonitor, MonitorError};
pub use provision::{ProvisionError, ProvisionFuture, Provisioner};
pub use reaper::{Reaper, ReaperConfig, ReaperError, SweepSummary};
pub use remote::{
    Connect, Console, Dialogue, DialogueOutcome, Exchange, ExecOutput, RetryPolicy, SessionError,
    ShellConsole, SshConnect, SshTransport, Transport,
};
pub use repository::{INACTIVITY_THRESHOLD_KEY, Repository, RepositoryError};
pub use schedule::{PeriodicTask, Task, TaskError, TaskFuture};
pub use status::{ServerStatus, StatusCache, StatusSnapshot};
pub use wireguard::probe::{Handshake, HandshakeMap, ProbeError};
pub use wireguard::{PeerProfile, RemovalOutcome, WgError, WgManager};
