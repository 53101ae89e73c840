//! Device Actor
//!
//! One task owns everything mutable about an amplifier session: the
//! [`Device`] (decoder, source map, state) and the [`ConnectionManager`].
//! It processes two inputs strictly in order:
//!
//! - [`DeviceCommand`]s from [`AmplifierHandle`](crate::AmplifierHandle)s
//! - [`ConnectionEvent`]s from the socket I/O task
//!
//! and reports through a single [`DeviceEvent`] channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use rotel_client::actor::{run_device_actor, DeviceCommand};
//! use tokio::sync::mpsc;
//!
//! let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
//! let (event_tx, mut event_rx) = mpsc::channel(256);
//!
//! tokio::spawn(run_device_actor(device, conn, conn_rx, cmd_rx, event_tx));
//! ```

use rotel_protocol::{Command, EncodeCommand, Query};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::connection::{CloseCause, ConnectionEvent, ConnectionManager};
use crate::device::{Device, DeviceSnapshot, Intent};
use crate::events::DeviceEvent;

/// Commands sent to the device actor
#[derive(Debug)]
pub enum DeviceCommand {
    /// Encode and send a user intent
    Intent(Intent),

    /// Send a single query
    Query(Query),

    /// Fetch the current snapshot
    GetSnapshot {
        /// Channel to send the snapshot back on
        response: oneshot::Sender<DeviceSnapshot>,
    },

    /// Close the connection but keep the actor (and state) alive
    Close,

    /// Close the connection and stop the actor
    Shutdown,
}

struct DeviceActor {
    device: Device,
    conn: ConnectionManager,
    event_tx: mpsc::Sender<DeviceEvent>,
}

impl DeviceActor {
    /// Never waits on observers; a full channel drops the event
    fn emit(&self, event: DeviceEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) if event.is_traffic() => {
                debug!("Event channel full, dropping traffic event");
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Event channel full, dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Fire-and-forget send; a missing transport only logs
    fn send(&self, cmd: &Command) {
        let data = cmd.encode();
        match self.conn.try_write(&data) {
            Ok(()) => {
                debug!("Sent {:?}", String::from_utf8_lossy(&data));
                self.emit(DeviceEvent::DataOut { data });
            }
            Err(e) => {
                warn!(
                    "{}: dropping {:?}",
                    e,
                    String::from_utf8_lossy(&data)
                );
            }
        }
    }

    fn on_start(&self) {
        if self.conn.is_open() {
            info!(
                "{} connected at {}, sending handshake",
                self.device.name(),
                self.conn.addr()
            );
            self.emit(DeviceEvent::Connected {
                addr: self.conn.addr().to_string(),
            });
            self.send(&Command::Handshake);
        }
    }

    fn handle_intent(&self, intent: Intent) {
        match self.device.command_for(&intent) {
            Ok(cmd) => self.send(&cmd),
            Err(e) => {
                error!("Cannot encode {:?}: {}", intent, e);
                self.emit(DeviceEvent::Error {
                    source: self.device.name().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    fn handle_data(&mut self, data: Vec<u8>) {
        debug!("Received {:?}", String::from_utf8_lossy(&data));
        let outcome = self.device.receive(&data);
        self.emit(DeviceEvent::DataIn { data });

        for query in &outcome.requeries {
            self.send(&Command::Query(*query));
        }

        if outcome.should_notify() {
            let snapshot = self.device.snapshot(self.conn.state());
            self.emit(DeviceEvent::StateChanged(snapshot));
        }
    }

    fn handle_closed(&mut self, cause: CloseCause) {
        self.conn.handle_closed(&cause);
        match cause {
            CloseCause::Local => info!("{}: connection closed", self.device.name()),
            _ => warn!("{}: connection lost ({})", self.device.name(), cause),
        }
        self.emit(DeviceEvent::ConnectionLost { cause });
    }
}

/// Run the device actor until shut down or all handles are dropped
///
/// `conn` is expected to be connected already (or attached); its I/O task
/// reports on `conn_rx`. The handshake is sent on start if the connection
/// is open.
pub async fn run_device_actor(
    device: Device,
    conn: ConnectionManager,
    mut conn_rx: mpsc::Receiver<ConnectionEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<DeviceCommand>,
    event_tx: mpsc::Sender<DeviceEvent>,
) {
    let mut actor = DeviceActor {
        device,
        conn,
        event_tx,
    };

    info!("Device actor starting for {}", actor.device.name());
    actor.on_start();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(DeviceCommand::Intent(intent)) => actor.handle_intent(intent),
                    Some(DeviceCommand::Query(query)) => actor.send(&Command::Query(query)),
                    Some(DeviceCommand::GetSnapshot { response }) => {
                        let _ = response.send(actor.device.snapshot(actor.conn.state()));
                    }
                    Some(DeviceCommand::Close) => actor.conn.close(),
                    Some(DeviceCommand::Shutdown) | None => {
                        actor.conn.close();
                        break;
                    }
                }
            }

            Some(event) = conn_rx.recv() => {
                match event {
                    ConnectionEvent::Data(data) => actor.handle_data(data),
                    ConnectionEvent::Closed(cause) => actor.handle_closed(cause),
                }
            }
        }
    }

    info!("Device actor shutting down for {}", actor.device.name());
}
