//! Chain Core - Client Engine for the Control Chain Hardware Daemon
//!
//! This crate connects to the Control Chain daemon over its local Unix
//! socket, discovers attached control hardware and the actuators on it,
//! and reports the inventory to a host application.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        Host application                        │
//! │     hardware_added / actuator_added / actuator_removed         │
//! └──────────────────────────────▲─────────────────────────────────┘
//!                                │ HardwareObserver
//! ┌──────────────────────────────┼─────────────────────────────────┐
//! │                        ChainListener                           │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │ RequestQueue │  │ EventChannel │  │ DescriptorIngestor   │  │
//! │  │ (one in      │  │ (device_     │  │ (devices, actuators, │  │
//! │  │  flight)     │  │  status)     │  │  metadata)           │  │
//! │  └──────┬───────┘  └──────┬───────┘  └──────────────────────┘  │
//! │         └────────┬────────┘                                    │
//! │          ConnectionManager (socket, state, readiness latch)    │
//! └──────────────────┼─────────────────────────────────────────────┘
//!                    │ NUL-terminated JSON frames
//!           /tmp/control-chain.sock
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use chain_core::{spawn, ChannelObserver, ListenerConfig};
//!
//! # async fn run() -> Result<(), chain_core::ChainError> {
//! let (observer, mut hardware) = ChannelObserver::new();
//! let (handle, _task) = spawn(&ListenerConfig::default(), observer);
//!
//! handle.initialized().await?;
//! while let Some(event) = hardware.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Module Overview
//!
//! - [`transport`]: NUL-terminated framing over the daemon socket
//! - [`protocol`]: Request, reply and event vocabulary
//! - [`model`]: Devices, actuators and the metadata handed to the host
//! - [`connection`]: Socket lifecycle and the readiness latch
//! - [`queue`]: FIFO request queue with one request in flight
//! - [`events`]: Unsolicited `device_status` events
//! - [`ingest`]: Descriptor to device/actuator pipeline
//! - [`listener`]: The engine task and its handle
//! - [`config`]: TOML / environment configuration

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connection;
pub mod devices;
pub mod error;
pub mod events;
pub mod ingest;
pub mod listener;
pub mod model;
pub mod observer;
pub mod protocol;
pub mod queue;
pub mod transport;

// Re-exports for convenience
pub use connection::{ConnectionState, ReadyCallback};
pub use devices::DeviceRegistry;
pub use error::{ChainError, ProtocolError};
pub use events::DeviceStatusChange;
pub use ingest::{DescriptorIngestor, IngestOutcome};
pub use listener::{spawn, ChainListener, ListenerCommand, ListenerHandle};
pub use model::{Actuator, ActuatorMetadata, ActuatorModes, Device};
pub use observer::{ChannelObserver, HardwareEvent, HardwareObserver};
pub use protocol::{DeviceDescriptor, DeviceId, Reply, Request};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, ListenerConfig, ReadyOverride,
};
