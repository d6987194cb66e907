//! Outbound Request Queue
//!
//! Requests are serviced strictly in FIFO order with at most one on the
//! wire. Each [`PendingRequest`] carries an optional [`Completion`] saying
//! what to do with its reply. Completions are plain data rather than
//! closures so the listener can dispatch them with full access to its own
//! state.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::error::{ChainError, ProtocolError};
use crate::protocol::{DeviceId, Envelope, Reply, Request};
use crate::transport::FramedSocket;

/// Why a descriptor was requested
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorOrigin {
    /// Part of the bootstrap walk over `device_list`
    Bootstrap,
    /// A `device_status` event announced the device
    Event,
}

/// What to do with a reply
#[derive(Debug)]
pub enum Completion {
    /// Hand the reply to a host caller
    Caller(oneshot::Sender<Reply>),
    /// Bootstrap enumeration
    DeviceList,
    /// Ingest a device descriptor
    Descriptor {
        /// Device the descriptor belongs to
        device_id: DeviceId,
        /// Who asked for it
        origin: DescriptorOrigin,
    },
    /// Start the event stream once the daemon acknowledges
    ArmEvents,
}

/// One queued request
#[derive(Debug)]
pub struct PendingRequest {
    /// Request as issued
    pub request: Request,
    frame: Vec<u8>,
    /// Reply handling; `None` means the reply is read and discarded
    pub completion: Option<Completion>,
}

impl PendingRequest {
    /// Encode `request` up front so the queue only holds sendable frames
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Serialization` if the request cannot be encoded.
    pub fn new(request: Request, completion: Option<Completion>) -> Result<Self, ProtocolError> {
        let frame = request.encode()?;
        Ok(Self {
            request,
            frame,
            completion,
        })
    }

    /// Wire name of the request
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.request.name()
    }

    /// Encoded frame, terminator included
    #[must_use]
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// Write the request and read the frame that answers it
    ///
    /// The next frame on the socket is taken as the reply. An event or a
    /// reply with another name spoils this request only.
    ///
    /// # Errors
    ///
    /// - Transport errors (`is_connection_loss()`) when the socket is gone
    /// - `ProtocolError::UnexpectedEvent` / `ReplyMismatch` / `Malformed`
    ///   when the frame does not answer this request
    pub async fn transact(&self, socket: &mut FramedSocket) -> Result<Reply, ChainError> {
        socket.write_frame(&self.frame).await?;
        let payload = socket.read_frame().await?;

        let expected = self.name();
        match Envelope::parse(&payload)? {
            Envelope::Event { name, .. } => Err(ProtocolError::UnexpectedEvent {
                expected: expected.to_string(),
                event: name,
            }
            .into()),
            Envelope::Reply { name, .. } if name != expected => {
                Err(ProtocolError::ReplyMismatch {
                    expected: expected.to_string(),
                    actual: name,
                }
                .into())
            }
            Envelope::Reply { name, data } => Ok(Reply::decode(&name, data)?),
        }
    }
}

/// FIFO of requests waiting for the wire
#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: VecDeque<PendingRequest>,
    idle: bool,
}

impl RequestQueue {
    /// Create an empty, busy queue
    ///
    /// The queue stays busy until the first drain so that requests queued
    /// before the connection comes up wait for it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request
    pub fn push(&mut self, request: PendingRequest) {
        tracing::trace!(request = request.name(), queued = self.pending.len(), "Request queued");
        self.pending.push_back(request);
    }

    /// Take the oldest request
    pub fn pop(&mut self) -> Option<PendingRequest> {
        self.pending.pop_front()
    }

    /// Number of queued requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Nothing queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether nothing is being drained, so a new request must start a drain
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Mark the drain as running or finished
    pub fn set_idle(&mut self, idle: bool) {
        self.idle = idle;
    }

    /// Drop every queued request without completing it
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
