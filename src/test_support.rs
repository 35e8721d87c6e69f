//! Test support utilities shared across unit and integration tests.
//!
//! The fakes mirror the production trait seams: scripted consoles and
//! transports stand in for live SSH sessions, and the in-memory
//! repository and recording provisioner stand in for the external
//! collaborators. All of them share state across clones so tests keep a
//! handle for assertions after ownership moves into the code under test.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;

use crate::keys::{KeyDerivation, KeyError};
use crate::model::{Peer, PeerId, Server, ServerId};
use crate::provision::{ProvisionError, ProvisionFuture, Provisioner};
use crate::remote::{Connect, Console, ExecOutput, SessionError, Transport};
use crate::repository::{Repository, RepositoryError};

/// Scripted console returning pre-seeded output chunks in FIFO order and
/// recording everything sent to it.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConsole {
    inner: Rc<RefCell<ConsoleState>>,
}

#[derive(Debug, Default)]
struct ConsoleState {
    chunks: VecDeque<String>,
    sent: Vec<String>,
}

impl ScriptedConsole {
    /// Creates a console with no queued output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a chunk of remote output for a later
    /// [`Console::recv_available`] call.
    pub fn push_chunk(&self, chunk: impl Into<String>) {
        self.inner.borrow_mut().chunks.push_back(chunk.into());
    }

    /// Returns everything sent through the console so far.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.inner.borrow().sent.clone()
    }
}

impl Console for ScriptedConsole {
    fn recv_available(&mut self) -> Result<String, SessionError> {
        Ok(self.inner.borrow_mut().chunks.pop_front().unwrap_or_default())
    }

    fn send(&mut self, input: &str) -> Result<(), SessionError> {
        self.inner.borrow_mut().sent.push(input.to_owned());
        Ok(())
    }
}

/// Scripted transport: a remote filesystem map plus FIFO queues of exec
/// results and consoles.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    inner: Rc<RefCell<TransportState>>,
}

#[derive(Debug, Default)]
struct TransportState {
    files: BTreeMap<String, String>,
    exec_results: VecDeque<Result<ExecOutput, SessionError>>,
    consoles: VecDeque<ScriptedConsole>,
    exec_commands: Vec<String>,
    consoles_opened: usize,
    closed: bool,
}

impl ScriptedTransport {
    /// Creates a transport with an empty remote filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a remote file.
    pub fn put_file(&self, path: impl Into<String>, contents: impl Into<String>) {
        self.inner
            .borrow_mut()
            .files
            .insert(path.into(), contents.into());
    }

    /// Queues a successful exec result.
    pub fn push_exec(&self, stdout: impl Into<String>, stderr: impl Into<String>) {
        self.inner
            .borrow_mut()
            .exec_results
            .push_back(Ok(ExecOutput {
                stdout: stdout.into(),
                stderr: stderr.into(),
                exit_code: Some(0),
            }));
    }

    /// Queues an exec failure.
    pub fn push_exec_error(&self, error: SessionError) {
        self.inner.borrow_mut().exec_results.push_back(Err(error));
    }

    /// Queues a console for the next [`Transport::open_console`] call.
    pub fn push_console(&self, console: ScriptedConsole) {
        self.inner.borrow_mut().consoles.push_back(console);
    }

    /// Returns every command executed so far.
    #[must_use]
    pub fn exec_commands(&self) -> Vec<String> {
        self.inner.borrow().exec_commands.clone()
    }

    /// Returns how many consoles were opened.
    #[must_use]
    pub fn consoles_opened(&self) -> usize {
        self.inner.borrow().consoles_opened
    }

    /// Returns whether [`Transport::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }
}

impl Transport for ScriptedTransport {
    type Console = ScriptedConsole;

    fn open_console(&mut self) -> Result<ScriptedConsole, SessionError> {
        let mut state = self.inner.borrow_mut();
        state.consoles_opened += 1;
        state
            .consoles
            .pop_front()
            .ok_or_else(|| SessionError::Channel {
                message: String::from("no scripted console available"),
            })
    }

    fn exec(&mut self, command: &str) -> Result<ExecOutput, SessionError> {
        let mut state = self.inner.borrow_mut();
        state.exec_commands.push(command.to_owned());
        state.exec_results.pop_front().unwrap_or_else(|| {
            Err(SessionError::Channel {
                message: String::from("no scripted exec result available"),
            })
        })
    }

    fn file_exists(&mut self, path: &str) -> Result<bool, SessionError> {
        Ok(self.inner.borrow().files.contains_key(path))
    }

    fn read_file(&mut self, path: &str) -> Result<String, SessionError> {
        self.inner
            .borrow()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| SessionError::RemoteFile {
                path: path.to_owned(),
                message: String::from("no such file"),
            })
    }

    fn write_file(&mut self, path: &str, contents: &str) -> Result<(), SessionError> {
        self.inner
            .borrow_mut()
            .files
            .insert(path.to_owned(), contents.to_owned());
        Ok(())
    }

    fn close(&mut self) {
        self.inner.borrow_mut().closed = true;
    }
}

/// Connector handing out scripted transports (or failures) in FIFO
/// order, one per connection request.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConnect {
    inner: Rc<RefCell<ConnectState>>,
}

#[derive(Debug, Default)]
struct ConnectState {
    results: VecDeque<Result<ScriptedTransport, SessionError>>,
    requests: Vec<String>,
}

impl ScriptedConnect {
    /// Creates a connector with no queued transports.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a transport for the next connection request.
    pub fn push_transport(&self, transport: ScriptedTransport) {
        self.inner.borrow_mut().results.push_back(Ok(transport));
    }

    /// Queues a connection failure.
    pub fn push_failure(&self, error: SessionError) {
        self.inner.borrow_mut().results.push_back(Err(error));
    }

    /// Returns the hosts connections were requested for, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.inner.borrow().requests.clone()
    }
}

impl Connect for ScriptedConnect {
    type Transport = ScriptedTransport;

    fn connect(&self, server: &Server) -> Result<ScriptedTransport, SessionError> {
        let mut state = self.inner.borrow_mut();
        state.requests.push(server.ip_address.clone());
        state.results.pop_front().unwrap_or_else(|| {
            Err(SessionError::ConnectionExhausted {
                host: server.ip_address.clone(),
                attempts: 0,
                message: String::from("no scripted transport available"),
            })
        })
    }
}

/// In-memory repository with shared state across clones.
#[derive(Clone, Debug, Default)]
pub struct MemoryRepository {
    inner: Arc<Mutex<RepoState>>,
}

#[derive(Debug, Default)]
struct RepoState {
    servers: Vec<Server>,
    peers: Vec<Peer>,
    settings: BTreeMap<String, Duration>,
    next_peer_id: i64,
    fail_listing: bool,
}

impl MemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RepoState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Seeds a server record.
    pub fn add_server(&self, server: Server) {
        self.lock().servers.push(server);
    }

    /// Seeds a peer record.
    pub fn add_peer(&self, peer: Peer) {
        let mut state = self.lock();
        state.next_peer_id = state.next_peer_id.max(peer.id.0);
        state.peers.push(peer);
    }

    /// Makes every listing call fail with a storage error.
    pub fn fail_listing(&self) {
        self.lock().fail_listing = true;
    }

    /// Returns the stored servers.
    #[must_use]
    pub fn servers(&self) -> Vec<Server> {
        self.lock().servers.clone()
    }

    /// Returns the stored peers.
    #[must_use]
    pub fn peers(&self) -> Vec<Peer> {
        self.lock().peers.clone()
    }
}

impl Repository for MemoryRepository {
    fn list_servers(&self) -> Result<Vec<Server>, RepositoryError> {
        let state = self.lock();
        if state.fail_listing {
            return Err(RepositoryError::Storage {
                message: String::from("simulated storage failure"),
            });
        }
        Ok(state.servers.clone())
    }

    fn list_peers(&self) -> Result<Vec<Peer>, RepositoryError> {
        let state = self.lock();
        if state.fail_listing {
            return Err(RepositoryError::Storage {
                message: String::from("simulated storage failure"),
            });
        }
        Ok(state.peers.clone())
    }

    fn get_peer(&self, peer: PeerId) -> Result<Peer, RepositoryError> {
        self.lock()
            .peers
            .iter()
            .find(|candidate| candidate.id == peer)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound {
                what: format!("peer {peer}"),
            })
    }

    fn get_server(&self, server: ServerId) -> Result<Server, RepositoryError> {
        self.lock()
            .servers
            .iter()
            .find(|candidate| candidate.id == server)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound {
                what: format!("server {server}"),
            })
    }

    fn create_peer(
        &self,
        server: ServerId,
        name: &str,
        public_key: &str,
        config: &str,
    ) -> Result<Peer, RepositoryError> {
        let mut state = self.lock();
        if state
            .peers
            .iter()
            .any(|peer| peer.server_id == server && peer.name == name)
        {
            return Err(RepositoryError::Conflict {
                message: format!("peer {name:?} already exists on server {server}"),
            });
        }
        state.next_peer_id += 1;
        let peer = Peer {
            id: PeerId(state.next_peer_id),
            server_id: server,
            name: name.to_owned(),
            public_key: public_key.to_owned(),
            config: config.to_owned(),
            created_at: Utc::now(),
        };
        state.peers.push(peer.clone());
        Ok(peer)
    }

    fn delete_peer(&self, peer: PeerId) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let before = state.peers.len();
        state.peers.retain(|candidate| candidate.id != peer);
        if state.peers.len() == before {
            return Err(RepositoryError::NotFound {
                what: format!("peer {peer}"),
            });
        }
        Ok(())
    }

    fn delete_server(&self, server: ServerId) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let before = state.servers.len();
        state.servers.retain(|candidate| candidate.id != server);
        if state.servers.len() == before {
            return Err(RepositoryError::NotFound {
                what: format!("server {server}"),
            });
        }
        state.peers.retain(|peer| peer.server_id != server);
        Ok(())
    }

    fn get_duration_setting(&self, key: &str) -> Result<Option<Duration>, RepositoryError> {
        Ok(self.lock().settings.get(key).copied())
    }

    fn set_duration_setting(&self, key: &str, value: Duration) -> Result<(), RepositoryError> {
        self.lock().settings.insert(key.to_owned(), value);
        Ok(())
    }
}

/// Provisioner recording which servers were destroyed, with optional
/// per-address failures.
#[derive(Clone, Debug, Default)]
pub struct RecordingProvisioner {
    inner: Arc<Mutex<ProvisionState>>,
}

#[derive(Debug, Default)]
struct ProvisionState {
    destroyed: Vec<String>,
    fail_for: BTreeSet<String>,
}

impl RecordingProvisioner {
    /// Creates a provisioner that succeeds for every address.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProvisionState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Makes teardown fail for `address`.
    pub fn fail_for(&self, address: impl Into<String>) {
        self.lock().fail_for.insert(address.into());
    }

    /// Returns the addresses destroyed so far, in order.
    #[must_use]
    pub fn destroyed(&self) -> Vec<String> {
        self.lock().destroyed.clone()
    }
}

impl Provisioner for RecordingProvisioner {
    fn destroy<'a>(&'a self, server: &'a Server) -> ProvisionFuture<'a> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.fail_for.contains(&server.ip_address) {
                return Err(ProvisionError::Destroy {
                    address: server.ip_address.clone(),
                    message: String::from("simulated provider failure"),
                });
            }
            state.destroyed.push(server.ip_address.clone());
            Ok(())
        })
    }
}

/// Key derivation fake mapping a private key to `pk:<private>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StubKeys;

impl KeyDerivation for StubKeys {
    fn derive_public_key(&self, private_key: &str) -> Result<String, KeyError> {
        if private_key.is_empty() {
            return Err(KeyError::InvalidMaterial {
                message: String::from("empty private key"),
            });
        }
        Ok(format!("pk:{private_key}"))
    }
}

/// Builds a server record aged by `age` for tests.
#[must_use]
pub fn server_fixture(id: i64, ip_address: &str, age: Duration) -> Server {
    Server {
        id: ServerId(id),
        provider: String::from("vultr"),
        project_name: String::from("happy-dolphin"),
        ip_address: ip_address.to_owned(),
        username: String::from("root"),
        ssh_private_key: String::from("-----BEGIN TEST KEY-----"),
        location: String::from("fra"),
        created_at: Utc::now() - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero()),
    }
}

/// Builds a peer record aged by `age` for tests.
#[must_use]
pub fn peer_fixture(
    id: i64,
    server: ServerId,
    name: &str,
    public_key: &str,
    age: Duration,
) -> Peer {
    Peer {
        id: PeerId(id),
        server_id: server,
        name: name.to_owned(),
        public_key: public_key.to_owned(),
        config: format!("[Interface]\nPrivateKey = priv-{name}\n"),
        created_at: Utc::now() - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero()),
    }
}
