//! Rotel Amplifier Client
//!
//! Async control of a Rotel network amplifier over its TCP ASCII protocol.
//!
//! # Architecture
//!
//! ```text
//!  AmplifierHandle ──DeviceCommand──▶ device actor ──bytes──▶ I/O task ──▶ socket
//!                                      │    ▲                   │
//!                                      │    └─ConnectionEvent───┘
//!                                      ▼
//!                                 DeviceEvent stream
//! ```
//!
//! - The **I/O task** owns the socket. It forwards each read and writes
//!   queued commands.
//! - The **device actor** owns the [`Device`] (frame decoder, source map,
//!   [`DeviceState`]). Each read is decoded into frames and applied in order,
//!   then observers get one [`DeviceEvent::StateChanged`].
//! - Ambiguous `power`/`mute` values trigger a bounded self-healing re-query.
//! - Writes are fire-and-forget; with no live connection they are dropped
//!   and logged. The client never reconnects on its own.
//!
//! # Example
//!
//! ```rust,no_run
//! use rotel_client::{AmplifierHandle, DeviceConfig, DeviceEvent};
//!
//! # async fn example() -> Result<(), rotel_client::ClientError> {
//! let config = DeviceConfig::new("192.168.1.40");
//! let (amp, mut events) = AmplifierHandle::connect(&config).await?;
//!
//! amp.turn_on();
//! amp.select_source("CD");
//! amp.set_volume_level(0.35);
//!
//! while let Some(event) = events.recv().await {
//!     if let DeviceEvent::StateChanged(snapshot) = event {
//!         println!("{:?} at {:?}", snapshot.power, snapshot.volume_level);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod events;
pub mod handle;
pub mod state;

pub use actor::{run_device_actor, DeviceCommand};
pub use config::{DeviceConfig, RequeryPolicy, DEFAULT_NAME};
pub use connection::{CloseCause, ConnectionEvent, ConnectionManager, ConnectionState};
pub use device::{BatchOutcome, Device, DeviceSnapshot, Intent};
pub use error::ClientError;
pub use events::DeviceEvent;
pub use handle::AmplifierHandle;
pub use state::{ApplyOutcome, DeviceState};
