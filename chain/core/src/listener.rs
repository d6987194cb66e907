//! Listener Engine
//!
//! [`ChainListener`] owns the socket, the request queue, the event channel
//! and the known-devices map. It runs as a single task; hosts talk to it
//! through a cloneable [`ListenerHandle`].
//!
//! # Bootstrap
//!
//! ```text
//! start ─► device_list ─► device_descriptor (each id, in order) ─► device_status {"enable": 1}
//!                                                                    │
//!                                               initialized ◄────────┘ (reply arms the event channel)
//! ```
//!
//! # Reads
//!
//! Only one read is ever pending on the socket. While a request is in flight
//! the next frame is its reply. Between requests a read stays pending on any
//! open socket so a peer close is noticed; those frames are events once the
//! channel is armed and dropped before that. A connect event fetches the new
//! device's descriptor before the next event is read.

use std::collections::VecDeque;
use std::fmt;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ListenerConfig;
use crate::connection::{ConnectionManager, ConnectionState, OpenOutcome, ReadyCallback};
use crate::devices::DeviceRegistry;
use crate::error::ChainError;
use crate::events::{DeviceStatusChange, EventChannel};
use crate::ingest::DescriptorIngestor;
use crate::observer::HardwareObserver;
use crate::protocol::{DeviceId, Reply, Request};
use crate::queue::{Completion, DescriptorOrigin, PendingRequest, RequestQueue};

/// Commands accepted by a running listener
pub enum ListenerCommand {
    /// Queue a request; the reply goes to `reply` if given
    Request {
        /// Request to send
        request: Request,
        /// Receives the reply payload
        reply: Option<oneshot::Sender<Reply>>,
    },
    /// Reconnect if the connection crashed
    RestartIfCrashed,
    /// Run a callback once ready
    WaitInitialized(ReadyCallback),
    /// Stop the listener task
    Shutdown,
}

impl fmt::Debug for ListenerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request { request, reply } => f
                .debug_struct("Request")
                .field("request", request)
                .field("has_reply", &reply.is_some())
                .finish(),
            Self::RestartIfCrashed => write!(f, "RestartIfCrashed"),
            Self::WaitInitialized(_) => write!(f, "WaitInitialized"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Where the bootstrap sequence stands
#[derive(Debug, PartialEq, Eq)]
enum Bootstrap {
    /// Not running (no connection, or crashed)
    Idle,
    /// Waiting for the `device_list` reply
    Enumerating,
    /// Fetching descriptors one at a time
    Describing { remaining: VecDeque<DeviceId> },
    /// Enumeration finished for this connection
    Done,
}

/// Outcome of one turn of the run loop
enum Step {
    Command(Option<ListenerCommand>),
    Frame(Result<Vec<u8>, ChainError>),
}

/// The Control Chain client engine
pub struct ChainListener<O> {
    connection: ConnectionManager,
    queue: RequestQueue,
    events: EventChannel,
    ingestor: DescriptorIngestor,
    bootstrap: Bootstrap,
    observer: O,
}

impl<O> fmt::Debug for ChainListener<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainListener")
            .field("connection", &self.connection)
            .field("queued", &self.queue.len())
            .field("events_armed", &self.events.is_armed())
            .field("devices", &self.ingestor.registry().len())
            .field("bootstrap", &self.bootstrap)
            .finish()
    }
}

impl<O: HardwareObserver> ChainListener<O> {
    /// Create a listener; nothing happens until [`start`](Self::start)
    #[must_use]
    pub fn new(config: &ListenerConfig, observer: O) -> Self {
        Self {
            connection: ConnectionManager::new(config),
            queue: RequestQueue::new(),
            events: EventChannel::new(),
            ingestor: DescriptorIngestor::new(),
            bootstrap: Bootstrap::Idle,
            observer,
        }
    }

    /// Lifecycle state of the daemon connection
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Whether the readiness latch has flipped
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.connection.is_initialized()
    }

    /// Devices known on the current connection
    #[must_use]
    pub fn devices(&self) -> &DeviceRegistry {
        self.ingestor.registry()
    }

    /// The host observer
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Run `callback` now if ready, otherwise once the latch flips
    pub fn wait_initialized(&mut self, callback: ReadyCallback) {
        self.connection.wait_initialized(callback);
    }

    /// Connect and run the bootstrap sequence
    ///
    /// Returns once the queue has drained. A missing socket leaves the
    /// listener initialized without hardware.
    pub async fn start(&mut self) {
        self.ingestor.reset();
        self.events.disarm();
        self.bootstrap = Bootstrap::Enumerating;

        // device_list goes out first on the new connection
        self.queue_request(Request::DeviceList, Some(Completion::DeviceList));

        match self.connection.open().await {
            OpenOutcome::Connected => {}
            OpenOutcome::DaemonAbsent | OpenOutcome::Failed => self.bootstrap = Bootstrap::Idle,
        }

        self.drain().await;
    }

    /// Start again if, and only if, the connection crashed
    pub async fn restart_if_crashed(&mut self) -> bool {
        if !self.connection.clear_crash() {
            return false;
        }
        tracing::info!("Restarting control chain listener");
        self.start().await;
        true
    }

    /// Queue a host request
    ///
    /// The reply payload is sent to `reply`. If the reply is unusable or
    /// the connection is gone, `reply` is dropped instead.
    pub async fn enqueue(&mut self, request: Request, reply: Option<oneshot::Sender<Reply>>) {
        self.submit(request, reply.map(Completion::Caller)).await;
    }

    async fn submit(&mut self, request: Request, completion: Option<Completion>) {
        self.queue_request(request, completion);
        if self.queue.is_idle() {
            self.drain().await;
        }
    }

    fn queue_request(&mut self, request: Request, completion: Option<Completion>) {
        match PendingRequest::new(request, completion) {
            Ok(pending) => self.queue.push(pending),
            Err(e) => tracing::error!(error = %e, "Failed to encode request"),
        }
    }

    /// Service queued requests one at a time until the queue is empty
    async fn drain(&mut self) {
        self.queue.set_idle(false);

        while let Some(pending) = self.queue.pop() {
            let Some(socket) = self.connection.socket_mut() else {
                tracing::debug!(request = pending.name(), "Not connected, dropping request");
                continue;
            };

            match pending.transact(socket).await {
                Ok(reply) => {
                    if let Some(completion) = pending.completion {
                        self.complete(completion, reply);
                    }
                }
                Err(e) if e.is_connection_loss() => {
                    tracing::warn!(request = pending.name(), error = %e, "Connection lost mid-request");
                    self.handle_disconnect();
                }
                Err(e) => {
                    tracing::warn!(request = pending.name(), error = %e, "Dropping reply");
                    if let Some(completion) = pending.completion {
                        self.reply_dropped(completion);
                    }
                }
            }
        }

        self.queue.set_idle(true);
    }

    /// Act on a usable reply
    fn complete(&mut self, completion: Completion, reply: Reply) {
        match (completion, reply) {
            (Completion::Caller(tx), reply) => {
                if tx.send(reply).is_err() {
                    tracing::debug!("Request caller went away before the reply");
                }
            }
            (Completion::DeviceList, Reply::DeviceList(ids)) => self.begin_describing(ids),
            (Completion::Descriptor { device_id, origin }, Reply::DeviceDescriptor(descriptor)) => {
                self.ingestor
                    .ingest(&mut self.observer, device_id, &descriptor);
                if origin == DescriptorOrigin::Bootstrap {
                    self.advance_bootstrap();
                }
            }
            (Completion::ArmEvents, Reply::DeviceStatus(_)) => self.events.arm(),
            (completion, reply) => {
                tracing::warn!(reply = reply.name(), "Reply does not fit its request");
                self.reply_dropped(completion);
            }
        }
    }

    /// Keep bootstrap moving when a reply had to be dropped
    fn reply_dropped(&mut self, completion: Completion) {
        match completion {
            Completion::Caller(_) => {}
            Completion::DeviceList => self.begin_describing(Vec::new()),
            Completion::Descriptor {
                origin: DescriptorOrigin::Bootstrap,
                ..
            } => self.advance_bootstrap(),
            Completion::Descriptor {
                origin: DescriptorOrigin::Event,
                ..
            } => {}
            Completion::ArmEvents => self.events.arm(),
        }
    }

    fn begin_describing(&mut self, ids: Vec<DeviceId>) {
        tracing::info!(devices = ids.len(), "Enumerated control chain devices");
        self.bootstrap = Bootstrap::Describing {
            remaining: ids.into(),
        };
        self.advance_bootstrap();
    }

    fn advance_bootstrap(&mut self) {
        let Bootstrap::Describing { remaining } = &mut self.bootstrap else {
            return;
        };

        match remaining.pop_front() {
            Some(device_id) => self.queue_request(
                Request::DeviceDescriptor { device_id },
                Some(Completion::Descriptor {
                    device_id,
                    origin: DescriptorOrigin::Bootstrap,
                }),
            ),
            None => self.finish_bootstrap(),
        }
    }

    fn finish_bootstrap(&mut self) {
        self.bootstrap = Bootstrap::Done;
        if !self.connection.is_initialized() {
            self.queue_request(
                Request::DeviceStatus { enable: true },
                Some(Completion::ArmEvents),
            );
        }
        self.connection.set_initialized();
    }

    /// Drop everything tied to the lost connection
    fn handle_disconnect(&mut self) {
        self.connection.mark_crashed();
        self.events.disarm();
        self.bootstrap = Bootstrap::Idle;

        let dropped = self.queue.clear();
        if dropped > 0 {
            tracing::info!(dropped, "Discarded queued requests after connection loss");
        }
    }

    /// Whether the socket is free for the between-requests read
    fn socket_readable(&self) -> bool {
        self.queue.is_idle() && self.connection.is_connected()
    }

    async fn dispatch_event(&mut self, payload: &[u8]) {
        match self.events.interpret(payload) {
            Ok(DeviceStatusChange::Connected(device_id)) => {
                tracing::info!(device_id = %device_id, "Device connected");
                self.submit(
                    Request::DeviceDescriptor { device_id },
                    Some(Completion::Descriptor {
                        device_id,
                        origin: DescriptorOrigin::Event,
                    }),
                )
                .await;
            }
            Ok(DeviceStatusChange::Disconnected(device_id)) => {
                tracing::info!(device_id = %device_id, "Device disconnected");
                self.ingestor.remove(&mut self.observer, device_id);
            }
            Err(e) => tracing::warn!(error = %e, "Dropping event frame"),
        }
    }

    async fn handle_command(&mut self, command: ListenerCommand) {
        match command {
            ListenerCommand::Request { request, reply } => self.enqueue(request, reply).await,
            ListenerCommand::RestartIfCrashed => {
                self.restart_if_crashed().await;
            }
            ListenerCommand::WaitInitialized(callback) => self.wait_initialized(callback),
            // Handled by the run loop
            ListenerCommand::Shutdown => {}
        }
    }

    /// Start, then serve commands and events until shut down
    ///
    /// Ends on [`ListenerCommand::Shutdown`] or when every handle is gone.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ListenerCommand>) {
        self.start().await;

        loop {
            let readable = self.socket_readable();
            let step = tokio::select! {
                command = commands.recv() => Step::Command(command),
                frame = next_event_frame(&mut self.connection), if readable => Step::Frame(frame),
            };

            match step {
                Step::Command(None | Some(ListenerCommand::Shutdown)) => break,
                Step::Command(Some(command)) => self.handle_command(command).await,
                Step::Frame(Ok(payload)) => self.dispatch_event(&payload).await,
                Step::Frame(Err(e)) if e.is_connection_loss() => {
                    tracing::warn!(error = %e, "Event stream ended");
                    self.handle_disconnect();
                }
                Step::Frame(Err(e)) => tracing::warn!(error = %e, "Dropping event frame"),
            }
        }

        tracing::info!("Control chain listener stopped");
    }
}

async fn next_event_frame(connection: &mut ConnectionManager) -> Result<Vec<u8>, ChainError> {
    match connection.socket_mut() {
        Some(socket) => socket.read_frame().await,
        None => Err(ChainError::NotConnected),
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle to a spawned listener
#[derive(Clone, Debug)]
pub struct ListenerHandle {
    commands: mpsc::Sender<ListenerCommand>,
    ready: watch::Receiver<bool>,
    state: watch::Receiver<ConnectionState>,
}

impl ListenerHandle {
    /// Whether the readiness latch has flipped
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        *self.ready.borrow()
    }

    /// Lifecycle state of the daemon connection
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe lifecycle changes
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the readiness latch is set
    ///
    /// # Errors
    ///
    /// Returns `ChainError::ListenerStopped` if the listener ended first.
    pub async fn initialized(&self) -> Result<(), ChainError> {
        let mut ready = self.ready.clone();
        ready
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| ChainError::ListenerStopped)
    }

    /// Run `callback` on the listener task once ready
    ///
    /// # Errors
    ///
    /// Returns `ChainError::ListenerStopped` if the listener is gone.
    pub async fn wait_initialized(&self, callback: ReadyCallback) -> Result<(), ChainError> {
        self.command(ListenerCommand::WaitInitialized(callback)).await
    }

    /// Ask the listener to reconnect if it crashed
    ///
    /// # Errors
    ///
    /// Returns `ChainError::ListenerStopped` if the listener is gone.
    pub async fn restart_if_crashed(&self) -> Result<(), ChainError> {
        self.command(ListenerCommand::RestartIfCrashed).await
    }

    /// Send a request and wait for its reply
    ///
    /// # Errors
    ///
    /// - `ChainError::ListenerStopped` if the listener is gone
    /// - `ChainError::RequestDropped` if the reply was unusable or the
    ///   connection was lost
    pub async fn request(&self, request: Request) -> Result<Reply, ChainError> {
        let name = request.name();
        let (tx, rx) = oneshot::channel();
        self.command(ListenerCommand::Request {
            request,
            reply: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| ChainError::RequestDropped(name))
    }

    /// Send a request without waiting for the reply
    ///
    /// # Errors
    ///
    /// Returns `ChainError::ListenerStopped` if the listener is gone.
    pub async fn send(&self, request: Request) -> Result<(), ChainError> {
        self.command(ListenerCommand::Request {
            request,
            reply: None,
        })
        .await
    }

    /// Stop the listener
    ///
    /// # Errors
    ///
    /// Returns `ChainError::ListenerStopped` if it already stopped.
    pub async fn shutdown(&self) -> Result<(), ChainError> {
        self.command(ListenerCommand::Shutdown).await
    }

    async fn command(&self, command: ListenerCommand) -> Result<(), ChainError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ChainError::ListenerStopped)
    }
}

/// Spawn a listener task for `config`, reporting to `observer`
///
/// The task starts connecting immediately.
pub fn spawn<O>(config: &ListenerConfig, observer: O) -> (ListenerHandle, JoinHandle<()>)
where
    O: HardwareObserver + 'static,
{
    let listener = ChainListener::new(config, observer);
    let (tx, rx) = mpsc::channel(config.command_capacity);
    let handle = ListenerHandle {
        commands: tx,
        ready: listener.connection.subscribe_ready(),
        state: listener.connection.subscribe_state(),
    };
    let task = tokio::spawn(listener.run(rx));
    (handle, task)
}
