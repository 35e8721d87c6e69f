//! Handshake telemetry: one status command, parsed into per-peer
//! last-contact times.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use crate::remote::{SessionError, Transport};

/// Remote command reporting the latest handshake per peer.
pub const HANDSHAKE_COMMAND: &str = "wg show all latest-handshakes";

/// Last observed contact for one peer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Handshake {
    /// The peer has never completed a handshake.
    Never,
    /// The peer's cryptographic session was last refreshed at this UTC
    /// time.
    At(DateTime<Utc>),
}

/// Probe result: public key to last contact, valid for one probe call.
pub type HandshakeMap = BTreeMap<String, Handshake>;

/// Errors raised by the handshake probe.
///
/// A probe error means "no information", which callers must keep
/// distinct from "confirmed idle".
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Raised when the status command could not be executed.
    #[error("handshake probe failed: {0}")]
    Command(#[from] SessionError),
    /// Raised when the status command wrote to its error stream.
    #[error("handshake probe reported an error: {stderr}")]
    Remote {
        /// Captured standard error.
        stderr: String,
    },
}

/// Runs the status command once and parses its output.
///
/// # Errors
///
/// Returns [`ProbeError`] when the command fails or reports an error;
/// parsing itself never fails.
pub fn latest_handshakes<T: Transport>(transport: &mut T) -> Result<HandshakeMap, ProbeError> {
    let output = transport.exec(HANDSHAKE_COMMAND)?;
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return Err(ProbeError::Remote {
            stderr: stderr.to_owned(),
        });
    }
    Ok(parse_handshakes(&output.stdout))
}

/// Parses newline-delimited rows of `<interface> <public_key>
/// <epoch_seconds>`.
///
/// Parsing is total: rows without exactly three whitespace-separated
/// fields are skipped, a zero epoch means the peer has never been
/// contacted, and a non-numeric or unrepresentable epoch is also treated
/// as never contacted.
#[must_use]
pub fn parse_handshakes(output: &str) -> HandshakeMap {
    let mut handshakes = BTreeMap::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [_interface, public_key, epoch] = fields.as_slice() else {
            continue;
        };
        let contact = epoch
            .parse::<i64>()
            .ok()
            .filter(|seconds| *seconds != 0)
            .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
            .map_or(Handshake::Never, Handshake::At);
        handshakes.insert((*public_key).to_owned(), contact);
    }
    handshakes
}
