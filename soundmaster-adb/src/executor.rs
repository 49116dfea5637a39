use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};

use soundmaster_core::{CommandHandle, CommandReply, CommandResult, ConnectionState, ControlError, ControlPlane, PreferenceStore};

use crate::auth::adb_key::AdbKey;
use crate::auth::key_store::KeyStore;
use crate::config::AdbConfig;
use crate::connection::AdbConnection;
use crate::discovery::{DaemonDiscovery, DiscoveryHandle, ServiceBrowser};
use crate::error::AdbError;
use crate::protocol::shell_v2::CommandOutput;

/// Set once a private key has been imported.
pub const ADB_IMPORTED_PREF: &str = "adb_imported";

/// Set once the device has accepted our key.
pub const ADB_PAIRED_PREF: &str = "adb_paired";

enum Job {
    Command {
        text: String,
        reply: CommandReply,
    },
    Connect {
        port: u16,
        /// Keep a live connection if this attempt fails.
        keep_on_failure: bool,
        reply: Option<mpsc::Sender<bool>>,
    },
    Shutdown,
}

struct Inner {
    config: AdbConfig,
    prefs: Arc<dyn PreferenceStore>,
    key_store: KeyStore,
    key: RwLock<AdbKey>,
    connection: Mutex<Option<AdbConnection>>,
    state: AtomicU8,
    discovery: DaemonDiscovery,
}

impl Inner {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.swap(state as u8, Ordering::SeqCst);
        if previous != state as u8 {
            log::debug!("ADB connection: {:?} -> {:?}", ConnectionState::from_u8(previous), state);
        }
    }

    fn open(&self, port: u16) -> Result<AdbConnection, AdbError> {
        let key = self.key.read().clone();
        AdbConnection::connect(&self.config.host, port, &key, &self.config)
    }

    fn connect(&self, port: u16, keep_on_failure: bool) -> bool {
        if port == 0 {
            log::error!("Invalid port: {}", port);
            return false;
        }

        let mut connection = self.connection.lock();
        let had_live = connection.as_ref().is_some_and(AdbConnection::is_connected);
        self.set_state(ConnectionState::Connecting);

        match self.open(port) {
            Ok(conn) => {
                *connection = Some(conn);
                self.discovery.remember_port(port);
                self.set_state(ConnectionState::Connected);
                true
            }
            Err(e) => {
                log::error!("Connection to port {} failed: {}", port, e);
                if keep_on_failure && had_live {
                    self.set_state(ConnectionState::Connected);
                } else {
                    *connection = None;
                    self.set_state(ConnectionState::Disconnected);
                }
                false
            }
        }
    }

    fn run_command(&self, text: &str) -> CommandResult {
        let mut connection = self.connection.lock();

        if !connection.as_ref().is_some_and(AdbConnection::is_connected) {
            *connection = None;
            self.set_state(ConnectionState::Disconnected);

            let Some(port) = self.discovery.cached_port() else {
                log::warn!("No daemon port known; cannot run {:?}", text);
                return Err(ControlError::NotConnected);
            };
            log::info!("Reconnecting on cached port {}", port);
            self.set_state(ConnectionState::Connecting);
            match self.open(port) {
                Ok(conn) => {
                    *connection = Some(conn);
                    self.set_state(ConnectionState::Connected);
                }
                Err(e) => {
                    log::warn!("Reconnect on port {} failed: {}", port, e);
                    self.set_state(ConnectionState::Disconnected);
                    return Err(ControlError::NotConnected);
                }
            }
        }

        let Some(conn) = connection.as_mut() else {
            return Err(ControlError::NotConnected);
        };
        match conn.run_command(text).and_then(CommandOutput::into_result) {
            Ok(output) => Ok(output),
            Err(e) => {
                log::error!("Command failed: {:?}: {}", text, e);
                if e.is_transport() {
                    *connection = None;
                    self.set_state(ConnectionState::Disconnected);
                }
                Err(e.into())
            }
        }
    }

    fn disconnect(&self) {
        if let Some(mut conn) = self.connection.lock().take() {
            log::info!("Disconnecting from adbd");
            conn.close();
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

/// Runs shell commands on the device over an authenticated ADB connection.
///
/// All connects, reconnects and commands run one at a time on a single
/// worker thread, in submission order. Callers only ever see `bool`,
/// [`ControlError`] or [`CommandHandle`] results; a transport failure drops
/// the connection so the next command reconnects on the cached port.
pub struct ShellExecutor {
    inner: Arc<Inner>,
    jobs: mpsc::Sender<Job>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ShellExecutor {
    /// Load (or generate) the client key and start the worker thread.
    pub fn new(
        config: AdbConfig,
        prefs: Arc<dyn PreferenceStore>,
        browser: Arc<dyn ServiceBrowser>,
    ) -> Result<Self, AdbError> {
        config
            .validate()
            .map_err(|e| AdbError::Connect(format!("invalid configuration: {}", e)))?;

        let key_store = KeyStore::new(Arc::clone(&prefs));
        let key = AdbKey::generate_or_load(&key_store, &config.identity)?;
        let discovery = DaemonDiscovery::new(browser, Arc::clone(&prefs), &config.service_type);

        let inner = Arc::new(Inner {
            config,
            prefs,
            key_store,
            key: RwLock::new(key),
            connection: Mutex::new(None),
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            discovery,
        });

        let (jobs, rx) = mpsc::channel();
        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name("adb-shell".into())
            .spawn(move || run_worker(worker_inner, rx))
            .map_err(|e| AdbError::Io(format!("failed to spawn shell worker: {}", e)))?;

        Ok(Self {
            inner,
            jobs,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Report daemon ports to `callback`; see [`DaemonDiscovery::discover`].
    pub fn discover_port<F>(&self, callback: F) -> Result<DiscoveryHandle, AdbError>
    where
        F: Fn(u16) + Send + 'static,
    {
        self.inner.discovery.discover(callback)
    }

    /// Connect to the daemon on `port`, replacing any current connection.
    ///
    /// Blocks until the attempt finishes. On failure nothing is kept.
    pub fn connect(&self, port: u16) -> bool {
        let (tx, rx) = mpsc::channel();
        let job = Job::Connect {
            port,
            keep_on_failure: false,
            reply: Some(tx),
        };
        if self.jobs.send(job).is_err() {
            log::error!("Shell worker is gone; cannot connect");
            return false;
        }
        rx.recv().unwrap_or(false)
    }

    /// Discover the daemon and try every candidate port in the background.
    ///
    /// A failed candidate never replaces a live connection; the last
    /// successful connect wins.
    pub fn auto_connect(&self) -> Result<DiscoveryHandle, AdbError> {
        let jobs = self.jobs.clone();
        self.inner.discovery.discover(move |port| {
            let job = Job::Connect {
                port,
                keep_on_failure: true,
                reply: None,
            };
            if jobs.send(job).is_err() {
                log::debug!("Shell worker is gone; ignoring port {}", port);
            }
        })
    }

    /// Run `command` and block for its output.
    pub fn execute(&self, command: &str) -> Result<String, ControlError> {
        self.submit(command).wait()
    }

    /// Replace the client key, drop any connection and remember the import.
    ///
    /// On failure the previous key stays in place.
    pub fn import_key(&self, bytes: &[u8]) -> Result<(), AdbError> {
        let key = AdbKey::import(&self.inner.key_store, bytes, &self.inner.config.identity)?;
        *self.inner.key.write() = key;
        self.inner.disconnect();
        self.inner
            .prefs
            .set_bool(ADB_IMPORTED_PREF, true)
            .map_err(|e| AdbError::Io(e.to_string()))
    }

    /// Whether a key has been paired or imported.
    pub fn is_set_up(&self) -> bool {
        self.inner.prefs.get_bool(ADB_PAIRED_PREF) || self.inner.prefs.get_bool(ADB_IMPORTED_PREF)
    }

    pub fn cached_port(&self) -> Option<u16> {
        self.inner.discovery.cached_port()
    }

    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    pub fn mark_as_paired(&self) -> Result<(), AdbError> {
        self.inner
            .prefs
            .set_bool(ADB_PAIRED_PREF, true)
            .map_err(|e| AdbError::Io(e.to_string()))
    }

    /// Forget the pairing and the cached port, and disconnect.
    pub fn clear_pairing(&self) -> Result<(), AdbError> {
        self.inner
            .prefs
            .remove(ADB_PAIRED_PREF)
            .map_err(|e| AdbError::Io(e.to_string()))?;
        self.inner.discovery.forget_port();
        self.inner.disconnect();
        Ok(())
    }

    /// SHA-256 fingerprint of the current public key.
    pub fn fingerprint(&self) -> String {
        self.inner.key.read().fingerprint()
    }

    /// `AUTH(RSAPUBLICKEY)` payload of the current key, without the NUL.
    pub fn public_key_text(&self) -> String {
        let payload = self.inner.key.read().public_key_payload();
        String::from_utf8_lossy(&payload).trim_end_matches('\0').to_string()
    }

    /// Stop the worker after the jobs already queued.
    pub fn shutdown(&self) {
        if let Some(handle) = self.worker.lock().take() {
            // The worker may already be gone; join regardless.
            let _ = self.jobs.send(Job::Shutdown);
            if handle.join().is_err() {
                log::error!("Shell worker panicked");
            }
        }
    }
}

impl ControlPlane for ShellExecutor {
    fn submit(&self, command: &str) -> CommandHandle {
        let (reply, handle) = CommandHandle::channel();
        let job = Job::Command {
            text: command.to_string(),
            reply,
        };
        // A dropped job drops its reply, which resolves the handle as unavailable.
        if self.jobs.send(job).is_err() {
            log::warn!("Shell worker is gone; dropping {:?}", command);
        }
        handle
    }

    fn is_connected(&self) -> bool {
        self.inner.state() == ConnectionState::Connected
    }
}

impl Drop for ShellExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(inner: Arc<Inner>, rx: mpsc::Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        match job {
            Job::Command { text, reply } => reply.send(inner.run_command(&text)),
            Job::Connect {
                port,
                keep_on_failure,
                reply,
            } => {
                let connected = inner.connect(port, keep_on_failure);
                if let Some(reply) = reply {
                    let _ = reply.send(connected);
                }
            }
            Job::Shutdown => break,
        }
    }
    inner.disconnect();
    log::debug!("Shell worker stopped");
}
