//! Resilient remote sessions and scripted automation of interactive
//! tools.
//!
//! Freshly provisioned hosts take an unpredictable amount of time to
//! accept SSH connections, and the tool being automated has no structured
//! API — only a text menu. This module owns both problems: a transport
//! that retries until the host is reachable, and a dialogue driver that
//! walks an ordered script of prompt/response exchanges. Everything above
//! it consumes the [`Transport`] and [`Console`] traits so tests run
//! against scripted fakes.

use std::time::Duration;

use thiserror::Error;

use crate::model::Server;

mod dialogue;
mod ssh;

pub use dialogue::{Dialogue, DialogueOutcome, Exchange};
pub use ssh::{ShellConsole, SshTransport};

/// Default number of connection attempts before giving up on a host.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;

/// Default pause between connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default TCP connect timeout per attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while opening or using a remote session.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Raised when every connection attempt to a host has failed.
    #[error("could not reach {host} after {attempts} attempts: {message}")]
    ConnectionExhausted {
        /// Host that never became reachable.
        host: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last failure observed.
        message: String,
    },
    /// Raised when the host address cannot be resolved at all.
    #[error("invalid address {host}: {message}")]
    InvalidAddress {
        /// Address that failed to resolve.
        host: String,
        /// Resolver error message.
        message: String,
    },
    /// Raised when the local SSH machinery cannot be initialised.
    #[error("session setup failed: {message}")]
    Setup {
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the file-transfer channel cannot be opened after the
    /// transport authenticated. The transport is closed before this is
    /// returned.
    #[error("failed to open file-transfer channel: {message}")]
    Sftp {
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a command or shell channel cannot be opened.
    #[error("failed to open channel: {message}")]
    Channel {
        /// Human-readable error message.
        message: String,
    },
    /// Raised when reading from or writing to a live channel fails.
    #[error("remote i/o failed: {message}")]
    Io {
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a remote file cannot be read or written.
    #[error("failed to access remote file {path}: {message}")]
    RemoteFile {
        /// Remote path that could not be accessed.
        path: String,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a scripted prompt pattern is not a valid regex.
    #[error("invalid prompt pattern {pattern}: {message}")]
    Pattern {
        /// Offending pattern source.
        pattern: String,
        /// Regex compiler message.
        message: String,
    },
    /// Raised when an operation is attempted on a closed session.
    #[error("session is closed")]
    Closed,
}

/// Retry behaviour for opening a session to a possibly-not-yet-ready
/// host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of connection attempts.
    pub max_attempts: u32,
    /// Pause between failed attempts.
    pub retry_delay: Duration,
    /// TCP connect timeout per attempt.
    pub connect_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Overrides the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Overrides the pause between attempts.
    ///
    /// This is primarily used by tests to keep failure scenarios fast.
    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Overrides the per-attempt TCP connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

/// Output captured from a one-shot remote command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code reported by the remote shell, if available.
    pub exit_code: Option<i32>,
}

impl ExecOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// An interactive shell attached to a remote session.
///
/// Reads are non-blocking: [`Console::recv_available`] returns whatever
/// output has accumulated since the previous call, or an empty string.
pub trait Console {
    /// Returns output accumulated since the last call, empty when none.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] when the channel fails.
    fn recv_available(&mut self) -> Result<String, SessionError>;

    /// Sends raw input to the remote shell.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] when the channel fails.
    fn send(&mut self, input: &str) -> Result<(), SessionError>;
}

/// Abstraction over a live remote session: interactive console, one-shot
/// commands, and small text file access.
pub trait Transport {
    /// Console type produced by [`Transport::open_console`].
    type Console: Console;

    /// Opens an interactive shell on the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Channel`] when the shell cannot be opened.
    fn open_console(&mut self) -> Result<Self::Console, SessionError>;

    /// Runs one command to completion and captures its output.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the channel fails; a non-zero remote
    /// exit status is reported through [`ExecOutput`], not as an error.
    fn exec(&mut self, command: &str) -> Result<ExecOutput, SessionError>;

    /// Returns whether `path` exists on the remote host.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when the session has been closed.
    fn file_exists(&mut self, path: &str) -> Result<bool, SessionError>;

    /// Reads a small text file from the remote host.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RemoteFile`] when the file cannot be read.
    fn read_file(&mut self, path: &str) -> Result<String, SessionError>;

    /// Writes a small text file on the remote host.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RemoteFile`] when the file cannot be
    /// written.
    fn write_file(&mut self, path: &str, contents: &str) -> Result<(), SessionError>;

    /// Releases the session. Idempotent.
    fn close(&mut self);
}

/// Opens transports to servers; the seam that lets the reaper and fleet
/// manager run against fakes.
pub trait Connect {
    /// Transport type produced on a successful connection.
    type Transport: Transport;

    /// Opens a transport to `server`, retrying per the implementation's
    /// policy.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConnectionExhausted`] when the host never
    /// became reachable.
    fn connect(&self, server: &Server) -> Result<Self::Transport, SessionError>;
}

/// [`Connect`] implementation backed by [`SshTransport`].
#[derive(Clone, Debug, Default)]
pub struct SshConnect {
    policy: RetryPolicy,
}

impl SshConnect {
    /// Creates a connector with the given retry policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl Connect for SshConnect {
    type Transport = SshTransport;

    fn connect(&self, server: &Server) -> Result<SshTransport, SessionError> {
        SshTransport::open(
            &server.ip_address,
            &server.username,
            &server.ssh_private_key,
            &self.policy,
        )
    }
}
