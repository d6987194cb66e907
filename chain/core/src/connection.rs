//! Connection Lifecycle
//!
//! [`ConnectionManager`] owns the daemon socket and tracks where the
//! connection is in its lifecycle:
//!
//! ```text
//!            socket path missing
//!   start ─────────────────────────────► NoDaemon (ready)
//!     │
//!     └─► Connecting ──connect ok──► Connected ──EOF / IO error──► Crashed (ready)
//!              │                                                      │
//!              └───────connect failed──────────────────────────────────┘
//!                                                 restart_if_crashed ──► start
//! ```
//!
//! Independently of the state, a [`ReadinessLatch`] records whether the
//! host may proceed. It flips when bootstrap completes, and is forced on
//! when the daemon is absent or the connection crashes so that nobody
//! waits forever.

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::sync::watch;

use crate::config::{ListenerConfig, ReadyOverride};
use crate::transport::FramedSocket;

/// Callback released when the readiness latch flips
pub type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle of the daemon connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket; the daemon was absent or we never started
    NoDaemon,
    /// Socket connect in progress
    Connecting,
    /// Socket open
    Connected,
    /// Socket lost; waiting for an explicit restart
    Crashed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDaemon => write!(f, "no-daemon"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Crashed => write!(f, "crashed"),
        }
    }
}

/// One-way readiness flag with callbacks released exactly once
///
/// The current value is mirrored on a `watch` channel so handles outside
/// the listener task can observe it.
pub struct ReadinessLatch {
    ready: bool,
    waiters: Vec<ReadyCallback>,
    tx: watch::Sender<bool>,
}

impl fmt::Debug for ReadinessLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessLatch")
            .field("ready", &self.ready)
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

impl Default for ReadinessLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessLatch {
    /// Create an unset latch
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            ready: false,
            waiters: Vec::new(),
            tx,
        }
    }

    /// Whether the latch has flipped
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.ready
    }

    /// Run `callback` now if set, otherwise when the latch flips
    pub fn wait(&mut self, callback: ReadyCallback) {
        if self.ready {
            callback();
        } else {
            self.waiters.push(callback);
        }
    }

    /// Flip the latch and release waiters
    ///
    /// Returns `false` if it was already set.
    pub fn set(&mut self) -> bool {
        if self.ready {
            return false;
        }
        self.ready = true;
        self.tx.send_replace(true);
        for callback in std::mem::take(&mut self.waiters) {
            callback();
        }
        true
    }

    /// Start a new readiness cycle for a fresh connection attempt
    ///
    /// Pending waiters are kept and released by the next [`set`](Self::set).
    pub fn rearm(&mut self) {
        self.ready = false;
        self.tx.send_replace(false);
    }

    /// Observe the latch from another task
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Result of [`ConnectionManager::open`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Socket path does not exist; running without hardware
    DaemonAbsent,
    /// Socket connected
    Connected,
    /// Path exists but connecting failed; state is now `Crashed`
    Failed,
}

/// Owns the socket, the lifecycle state and the readiness latch
#[derive(Debug)]
pub struct ConnectionManager {
    socket_path: PathBuf,
    max_frame_size: usize,
    read_buffer_size: usize,
    ready_override: Option<ReadyOverride>,
    socket: Option<FramedSocket>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    latch: ReadinessLatch,
}

impl ConnectionManager {
    /// Create a manager for the socket described by `config`
    #[must_use]
    pub fn new(config: &ListenerConfig) -> Self {
        let (state_tx, _rx) = watch::channel(ConnectionState::NoDaemon);
        Self {
            socket_path: config.socket_path.clone(),
            max_frame_size: config.max_frame_size,
            read_buffer_size: config.read_buffer_size,
            ready_override: config.ready_override.clone(),
            socket: None,
            state: ConnectionState::NoDaemon,
            state_tx,
            latch: ReadinessLatch::new(),
        }
    }

    /// Path of the daemon socket
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a socket is open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Whether the readiness latch has flipped
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.latch.is_set()
    }

    /// The open socket, if any
    pub fn socket_mut(&mut self) -> Option<&mut FramedSocket> {
        self.socket.as_mut()
    }

    /// Observe readiness from another task
    #[must_use]
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.latch.subscribe()
    }

    /// Observe lifecycle state from another task
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Run `callback` once the connection is ready
    pub fn wait_initialized(&mut self, callback: ReadyCallback) {
        self.latch.wait(callback);
    }

    /// Flip the readiness latch
    pub fn set_initialized(&mut self) {
        if self.latch.set() {
            tracing::info!(state = %self.state, "Control chain initialized");
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    /// Try to open the daemon socket
    ///
    /// A missing socket path is not an error: the manager becomes ready
    /// immediately and stays without hardware.
    pub async fn open(&mut self) -> OpenOutcome {
        if !path_exists(&self.socket_path).await {
            tracing::info!(
                path = %self.socket_path.display(),
                "Control chain socket missing, running without hardware"
            );
            self.socket = None;
            self.set_state(ConnectionState::NoDaemon);
            self.set_initialized();
            return OpenOutcome::DaemonAbsent;
        }

        self.latch.rearm();
        self.set_state(ConnectionState::Connecting);

        match FramedSocket::connect(&self.socket_path, self.max_frame_size, self.read_buffer_size)
            .await
        {
            Ok(socket) => {
                self.socket = Some(socket);
                self.set_state(ConnectionState::Connected);
                tracing::info!(path = %self.socket_path.display(), "Connected to control chain");
                self.apply_ready_override().await;
                OpenOutcome::Connected
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %self.socket_path.display(),
                    "Failed to connect to control chain"
                );
                self.mark_crashed();
                OpenOutcome::Failed
            }
        }
    }

    /// Flip readiness early when the configured marker exists but the
    /// device node it announces does not
    async fn apply_ready_override(&mut self) {
        let Some(ready_override) = self.ready_override.clone() else {
            return;
        };
        if path_exists(&ready_override.marker).await && !path_exists(&ready_override.device).await
        {
            tracing::info!(
                marker = %ready_override.marker.display(),
                device = %ready_override.device.display(),
                "Device node missing, not waiting for bootstrap"
            );
            self.set_initialized();
        }
    }

    /// Record loss of the connection
    ///
    /// Releases the socket and forces readiness so waiters never hang.
    pub fn mark_crashed(&mut self) {
        if self.socket.take().is_some() {
            tracing::warn!("Control chain connection closed");
        }
        self.set_state(ConnectionState::Crashed);
        self.set_initialized();
    }

    /// Leave the `Crashed` state ahead of a restart
    ///
    /// Returns `false` (and changes nothing) unless the connection crashed.
    pub fn clear_crash(&mut self) -> bool {
        if self.state != ConnectionState::Crashed {
            return false;
        }
        self.set_state(ConnectionState::NoDaemon);
        true
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::net::UnixListener;

    fn counter_callback(counter: &Arc<AtomicUsize>) -> ReadyCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn config_for(path: PathBuf) -> ListenerConfig {
        ListenerConfig::default().with_socket_path(path)
    }

    #[test]
    fn test_latch_releases_waiters_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut latch = ReadinessLatch::new();

        latch.wait(counter_callback(&calls));
        latch.wait(counter_callback(&calls));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(latch.set());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(!latch.set());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_latch_runs_late_waiter_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut latch = ReadinessLatch::new();
        latch.set();

        latch.wait(counter_callback(&calls));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_latch_mirrors_on_watch() {
        let mut latch = ReadinessLatch::new();
        let rx = latch.subscribe();
        assert!(!*rx.borrow());

        latch.set();
        assert!(*rx.borrow());

        latch.rearm();
        assert!(!*rx.borrow());
        assert!(!latch.is_set());
    }

    #[tokio::test]
    async fn test_open_without_daemon_is_ready() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = ConnectionManager::new(&config_for(temp_dir.path().join("cc.sock")));

        assert_eq!(manager.open().await, OpenOutcome::DaemonAbsent);
        assert_eq!(manager.state(), ConnectionState::NoDaemon);
        assert!(manager.is_initialized());
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_open_connects_and_waits_for_bootstrap() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cc.sock");
        let _listener = UnixListener::bind(&path).unwrap();
        let mut manager = ConnectionManager::new(&config_for(path));

        assert_eq!(manager.open().await, OpenOutcome::Connected);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(!manager.is_initialized());
    }

    #[tokio::test]
    async fn test_connect_failure_counts_as_crash() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cc.sock");
        // A regular file at the path exists but refuses connections
        std::fs::write(&path, b"").unwrap();
        let mut manager = ConnectionManager::new(&config_for(path));

        assert_eq!(manager.open().await, OpenOutcome::Failed);
        assert_eq!(manager.state(), ConnectionState::Crashed);
        assert!(manager.is_initialized());
    }

    #[tokio::test]
    async fn test_crash_forces_ready_and_clear_crash() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cc.sock");
        let _listener = UnixListener::bind(&path).unwrap();
        let mut manager = ConnectionManager::new(&config_for(path));
        let calls = Arc::new(AtomicUsize::new(0));

        manager.open().await;
        manager.wait_initialized(counter_callback(&calls));
        assert!(!manager.clear_crash());

        manager.mark_crashed();
        assert_eq!(manager.state(), ConnectionState::Crashed);
        assert!(!manager.is_connected());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(manager.clear_crash());
        assert_eq!(manager.state(), ConnectionState::NoDaemon);
    }

    #[tokio::test]
    async fn test_ready_override_flips_on_connect() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cc.sock");
        let marker = temp_dir.path().join("60-arduino.rules");
        std::fs::write(&marker, b"").unwrap();
        let _listener = UnixListener::bind(&path).unwrap();

        let mut config = config_for(path);
        config.ready_override = Some(ReadyOverride {
            marker,
            device: temp_dir.path().join("arduino"),
        });
        let mut manager = ConnectionManager::new(&config);

        assert_eq!(manager.open().await, OpenOutcome::Connected);
        assert!(manager.is_initialized());
    }
}
