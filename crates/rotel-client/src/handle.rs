//! AmplifierHandle - public API for a connected amplifier
//!
//! Wraps the device actor's command channel. Control methods are
//! fire-and-forget like the protocol itself: they return immediately and the
//! amplifier's answer shows up later as a [`DeviceEvent::StateChanged`].

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use rotel_protocol::Query;

use crate::actor::{run_device_actor, DeviceCommand};
use crate::config::DeviceConfig;
use crate::connection::ConnectionManager;
use crate::device::{Device, DeviceSnapshot, Intent};
use crate::error::ClientError;
use crate::events::DeviceEvent;

/// Capacity of the event channel returned to callers
const EVENT_CHANNEL_SIZE: usize = 256;

/// Capacity of the channel from the I/O task to the actor
const CONNECTION_CHANNEL_SIZE: usize = 64;

/// Handle for controlling one amplifier
///
/// Cheap to clone. The actor stops once every handle is dropped or
/// [`shutdown`](Self::shutdown) is called.
#[derive(Clone, Debug)]
pub struct AmplifierHandle {
    cmd_tx: mpsc::UnboundedSender<DeviceCommand>,
}

impl AmplifierHandle {
    /// Connect over TCP and start the device actor
    ///
    /// Suspends until the socket is up (or the connect fails). The startup
    /// handshake is sent as soon as the actor runs.
    pub async fn connect(
        config: &DeviceConfig,
    ) -> Result<(Self, mpsc::Receiver<DeviceEvent>), ClientError> {
        let device = Device::from_config(config)?;
        let (conn_tx, conn_rx) = mpsc::channel(CONNECTION_CHANNEL_SIZE);

        let mut conn = ConnectionManager::new(config.addr());
        conn.connect(config.connect_timeout(), conn_tx).await?;

        Ok(Self::spawn(device, conn, conn_rx))
    }

    /// Start the device actor on an existing stream instead of dialling
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach<T>(
        config: &DeviceConfig,
        io: T,
    ) -> Result<(Self, mpsc::Receiver<DeviceEvent>), ClientError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let device = Device::from_config(config)?;
        let (conn_tx, conn_rx) = mpsc::channel(CONNECTION_CHANNEL_SIZE);

        let mut conn = ConnectionManager::new(config.addr());
        conn.attach(io, conn_tx);

        Ok(Self::spawn(device, conn, conn_rx))
    }

    fn spawn(
        device: Device,
        conn: ConnectionManager,
        conn_rx: mpsc::Receiver<crate::connection::ConnectionEvent>,
    ) -> (Self, mpsc::Receiver<DeviceEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        tokio::spawn(run_device_actor(device, conn, conn_rx, cmd_rx, event_tx));

        (Self { cmd_tx }, event_rx)
    }

    fn send(&self, cmd: DeviceCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            warn!("{}", ClientError::ActorStopped);
        }
    }

    fn intent(&self, intent: Intent) {
        self.send(DeviceCommand::Intent(intent));
    }

    // =========================================================================
    // Control methods (fire-and-forget)
    // =========================================================================

    /// `power_on!`
    pub fn turn_on(&self) {
        self.intent(Intent::TurnOn);
    }

    /// `power_off!`
    pub fn turn_off(&self) {
        self.intent(Intent::TurnOff);
    }

    /// `vol_up!`
    pub fn volume_up(&self) {
        self.intent(Intent::VolumeUp);
    }

    /// `vol_down!`
    pub fn volume_down(&self) {
        self.intent(Intent::VolumeDown);
    }

    /// Set absolute volume, `level` in `0.0..=1.0`
    pub fn set_volume_level(&self, level: f32) {
        self.intent(Intent::SetVolume(level));
    }

    /// Mute (`true`) or unmute (`false`)
    pub fn mute(&self, muted: bool) {
        self.intent(Intent::Mute(muted));
    }

    /// Select an input by display label
    ///
    /// Unknown labels are logged and reported as [`DeviceEvent::Error`];
    /// nothing is sent.
    pub fn select_source(&self, label: impl Into<String>) {
        self.intent(Intent::SelectSource(label.into()));
    }

    /// Ask the amplifier to report one attribute
    pub fn query(&self, query: Query) {
        self.send(DeviceCommand::Query(query));
    }

    // =========================================================================
    // Lifecycle and queries
    // =========================================================================

    /// Current snapshot, or `None` if the actor has stopped
    pub async fn snapshot(&self) -> Option<DeviceSnapshot> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(DeviceCommand::GetSnapshot {
                response: response_tx,
            })
            .is_err()
        {
            return None;
        }
        response_rx.await.ok()
    }

    /// Close the connection; state is kept and the actor keeps running
    pub fn close(&self) {
        self.send(DeviceCommand::Close);
    }

    /// Close the connection and stop the actor
    pub fn shutdown(&self) {
        self.send(DeviceCommand::Shutdown);
    }

    /// Whether the actor is still running
    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}
