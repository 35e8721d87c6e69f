//! ssh2-backed transport: retrying connection establishment, interactive
//! shell console, and SFTP file access.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::thread;
use std::time::Duration;

use ssh2::{Channel, Session, Sftp};

use super::{Console, ExecOutput, RetryPolicy, SessionError, Transport};

const SSH_PORT: u16 = 22;
const KEEPALIVE_INTERVAL_SECS: u32 = 30;
const SHELL_SETTLE: Duration = Duration::from_secs(1);
const READ_CHUNK: usize = 4096;

/// Outcome of a single connection attempt.
enum AttemptError {
    /// Transport, handshake, and authentication failures: the host may
    /// simply not be ready yet.
    Retryable(String),
    /// Anything else aborts the retry loop immediately.
    Fatal(SessionError),
}

/// A live SSH session with an attached SFTP channel.
///
/// Host identities are accepted without verification: the fleet consists
/// of throwaway hosts whose keys are generated at boot, so there is
/// nothing to pin against.
pub struct SshTransport {
    session: Session,
    sftp: Option<Sftp>,
    host: String,
    closed: bool,
}

impl SshTransport {
    /// Opens a session to `host`, retrying until it becomes reachable or
    /// the policy's attempt budget is exhausted.
    ///
    /// TCP, handshake, and authentication failures are uniformly
    /// retryable — cloud-init may still be installing the public key when
    /// the first attempts land. Address resolution failures and local
    /// session setup failures are fatal immediately. After the transport
    /// authenticates, the SFTP channel is opened; failure to open it
    /// closes the transport and is fatal.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConnectionExhausted`] when retries are
    /// used up, [`SessionError::InvalidAddress`] or
    /// [`SessionError::Setup`] on fatal setup failures, and
    /// [`SessionError::Sftp`] when the file-transfer channel cannot be
    /// opened.
    pub fn open(
        host: &str,
        username: &str,
        private_key_pem: &str,
        policy: &RetryPolicy,
    ) -> Result<Self, SessionError> {
        let addr = resolve(host)?;
        let mut last_failure = String::from("no attempts made");

        for attempt in 1..=policy.max_attempts {
            tracing::debug!(host, attempt, max = policy.max_attempts, "connecting");
            match Self::attempt(addr, username, private_key_pem, policy) {
                Ok(session) => {
                    tracing::debug!(host, attempt, "ssh connection established");
                    return Self::finish_open(session, host);
                }
                Err(AttemptError::Retryable(message)) => {
                    tracing::debug!(host, attempt, %message, "connection attempt failed");
                    last_failure = message;
                    if attempt < policy.max_attempts {
                        thread::sleep(policy.retry_delay);
                    }
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
            }
        }

        Err(SessionError::ConnectionExhausted {
            host: host.to_owned(),
            attempts: policy.max_attempts,
            message: last_failure,
        })
    }

    fn attempt(
        addr: SocketAddr,
        username: &str,
        private_key_pem: &str,
        policy: &RetryPolicy,
    ) -> Result<Session, AttemptError> {
        let tcp = TcpStream::connect_timeout(&addr, policy.connect_timeout)
            .map_err(|err| AttemptError::Retryable(err.to_string()))?;
        tcp.set_read_timeout(Some(policy.connect_timeout)).ok();
        tcp.set_write_timeout(Some(policy.connect_timeout)).ok();

        let mut session = Session::new().map_err(|err| {
            AttemptError::Fatal(SessionError::Setup {
                message: err.to_string(),
            })
        })?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|err| AttemptError::Retryable(err.to_string()))?;

        session
            .userauth_pubkey_memory(username, None, private_key_pem, None)
            .map_err(|err| AttemptError::Retryable(err.to_string()))?;
        if !session.authenticated() {
            return Err(AttemptError::Retryable(String::from(
                "authentication was not accepted",
            )));
        }

        session.set_keepalive(true, KEEPALIVE_INTERVAL_SECS);
        Ok(session)
    }

    fn finish_open(session: Session, host: &str) -> Result<Self, SessionError> {
        match session.sftp() {
            Ok(sftp) => Ok(Self {
                session,
                sftp: Some(sftp),
                host: host.to_owned(),
                closed: false,
            }),
            Err(err) => {
                session.disconnect(None, "sftp unavailable", None).ok();
                Err(SessionError::Sftp {
                    message: err.to_string(),
                })
            }
        }
    }

    /// Returns the host this transport is connected to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn sftp(&self) -> Result<&Sftp, SessionError> {
        self.sftp.as_ref().ok_or(SessionError::Closed)
    }
}

impl Transport for SshTransport {
    type Console = ShellConsole;

    fn open_console(&mut self) -> Result<ShellConsole, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let mut channel = self
            .session
            .channel_session()
            .map_err(|err| SessionError::Channel {
                message: err.to_string(),
            })?;
        channel
            .request_pty("xterm", None, None)
            .map_err(|err| SessionError::Channel {
                message: err.to_string(),
            })?;
        channel.shell().map_err(|err| SessionError::Channel {
            message: err.to_string(),
        })?;

        let mut console = ShellConsole {
            session: self.session.clone(),
            channel,
        };

        // Let the shell print its banner, then discard it so stale motd
        // text never reaches the prompt matcher.
        thread::sleep(SHELL_SETTLE);
        let banner = console.recv_available()?;
        if !banner.is_empty() {
            tracing::trace!(host = %self.host, bytes = banner.len(), "discarded shell banner");
        }
        Ok(console)
    }

    fn exec(&mut self, command: &str) -> Result<ExecOutput, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.session.set_blocking(true);
        let mut channel = self
            .session
            .channel_session()
            .map_err(|err| SessionError::Channel {
                message: err.to_string(),
            })?;
        channel.exec(command).map_err(|err| SessionError::Channel {
            message: err.to_string(),
        })?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|err| SessionError::Io {
                message: err.to_string(),
            })?;
        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|err| SessionError::Io {
                message: err.to_string(),
            })?;
        channel.wait_close().ok();
        let exit_code = channel.exit_status().ok();

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    fn file_exists(&mut self, path: &str) -> Result<bool, SessionError> {
        self.session.set_blocking(true);
        let sftp = self.sftp()?;
        Ok(sftp.stat(Path::new(path)).is_ok())
    }

    fn read_file(&mut self, path: &str) -> Result<String, SessionError> {
        self.session.set_blocking(true);
        let sftp = self.sftp()?;
        let mut file = sftp
            .open(Path::new(path))
            .map_err(|err| SessionError::RemoteFile {
                path: path.to_owned(),
                message: err.to_string(),
            })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|err| SessionError::RemoteFile {
                path: path.to_owned(),
                message: err.to_string(),
            })?;
        Ok(contents)
    }

    fn write_file(&mut self, path: &str, contents: &str) -> Result<(), SessionError> {
        self.session.set_blocking(true);
        let sftp = self.sftp()?;
        let mut file = sftp
            .create(Path::new(path))
            .map_err(|err| SessionError::RemoteFile {
                path: path.to_owned(),
                message: err.to_string(),
            })?;
        file.write_all(contents.as_bytes())
            .map_err(|err| SessionError::RemoteFile {
                path: path.to_owned(),
                message: err.to_string(),
            })
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.sftp = None;
        self.session.disconnect(None, "closing", None).ok();
        self.closed = true;
        tracing::debug!(host = %self.host, "ssh session closed");
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Interactive shell channel attached to an [`SshTransport`].
pub struct ShellConsole {
    session: Session,
    channel: Channel,
}

impl ShellConsole {
    fn drain(channel: &mut Channel) -> Result<Vec<u8>, SessionError> {
        let mut out = Vec::new();
        let mut buf = [0_u8; READ_CHUNK];
        loop {
            match channel.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if let Some(chunk) = buf.get(..n) {
                        out.extend_from_slice(chunk);
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    return Err(SessionError::Io {
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(out)
    }
}

impl Console for ShellConsole {
    fn recv_available(&mut self) -> Result<String, SessionError> {
        self.session.set_blocking(false);
        let drained = Self::drain(&mut self.channel);
        self.session.set_blocking(true);
        let bytes = drained?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn send(&mut self, input: &str) -> Result<(), SessionError> {
        self.channel
            .write_all(input.as_bytes())
            .and_then(|()| self.channel.flush())
            .map_err(|err| SessionError::Io {
                message: err.to_string(),
            })
    }
}

fn resolve(host: &str) -> Result<SocketAddr, SessionError> {
    let mut addrs = (host, SSH_PORT)
        .to_socket_addrs()
        .map_err(|err| SessionError::InvalidAddress {
            host: host.to_owned(),
            message: err.to_string(),
        })?;
    addrs.next().ok_or_else(|| SessionError::InvalidAddress {
        host: host.to_owned(),
        message: String::from("no addresses resolved"),
    })
}
