//! TCP connection handling
//!
//! [`ConnectionManager`] owns the lifecycle of the single connection to an
//! amplifier. The socket itself lives in a spawned I/O task
//! ([`run_connection_io`]) which forwards every read as a
//! [`ConnectionEvent::Data`] and drains an outbound queue onto the socket.
//! When the session ends for any reason the task reports
//! [`ConnectionEvent::Closed`] exactly once and exits. Nothing reconnects.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::ClientError;

/// Read buffer size for the I/O task
const READ_BUFFER_SIZE: usize = 1024;

/// Outbound writes that may be queued before new ones are dropped
const WRITE_QUEUE_SIZE: usize = 64;

/// Lifecycle of the amplifier connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The amplifier closed the socket
    PeerClosed,
    /// Read or write failed
    Error(String),
    /// We closed it
    Local,
}

impl fmt::Display for CloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseCause::PeerClosed => f.write_str("closed by peer"),
            CloseCause::Error(e) => write!(f, "I/O error: {}", e),
            CloseCause::Local => f.write_str("closed locally"),
        }
    }
}

/// Events from the I/O task to the connection owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// One read's worth of bytes
    Data(Vec<u8>),
    /// The session is over
    Closed(CloseCause),
}

/// Owner-side view of the amplifier connection
#[derive(Debug)]
pub struct ConnectionManager {
    addr: String,
    state: ConnectionState,
    data_tx: Option<mpsc::Sender<Vec<u8>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ConnectionManager {
    /// Create a disconnected manager for `addr` (`host:port`)
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            state: ConnectionState::Disconnected,
            data_tx: None,
            shutdown_tx: None,
        }
    }

    /// Address this manager dials
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a transport exists and is not closing
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Connected && self.data_tx.is_some()
    }

    /// Dial the amplifier and start the I/O task
    ///
    /// Inbound data and the final close are delivered on `events`.
    pub async fn connect(
        &mut self,
        timeout: Duration,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<(), ClientError> {
        self.state = ConnectionState::Connecting;
        debug!(
            addr = %self.addr,
            timeout_ms = timeout.as_millis(),
            "Connecting to amplifier"
        );

        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.state = ConnectionState::Disconnected;
                warn!(addr = %self.addr, error = %e, "TCP connection failed");
                return Err(ClientError::Connect {
                    addr: self.addr.clone(),
                    source: e,
                });
            }
            Err(_) => {
                self.state = ConnectionState::Disconnected;
                warn!(addr = %self.addr, "TCP connection timed out");
                return Err(ClientError::ConnectTimeout {
                    addr: self.addr.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        // Commands are tiny and latency-sensitive
        if let Err(e) = stream.set_nodelay(true) {
            warn!(
                addr = %self.addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        info!(addr = %self.addr, "TCP connection established");
        self.attach(stream, events);
        Ok(())
    }

    /// Start the I/O task on an already-connected stream
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach<T>(&mut self, io: T, events: mpsc::Sender<ConnectionEvent>)
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (data_tx, data_rx) = mpsc::channel(WRITE_QUEUE_SIZE);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(run_connection_io(io, data_rx, shutdown_rx, events));

        self.data_tx = Some(data_tx);
        self.shutdown_tx = Some(shutdown_tx);
        self.state = ConnectionState::Connected;
    }

    /// Queue bytes for the amplifier, failing if there is no open transport
    pub fn try_write(&self, data: &[u8]) -> Result<(), ClientError> {
        let tx = match (&self.data_tx, self.state) {
            (Some(tx), ConnectionState::Connected) => tx,
            _ => return Err(ClientError::ConnectionUnavailable),
        };

        tx.try_send(data.to_vec()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::WriteQueueFull,
            mpsc::error::TrySendError::Closed(_) => ClientError::ConnectionUnavailable,
        })?;

        debug!("Data queued: {:?}", String::from_utf8_lossy(data));
        Ok(())
    }

    /// Fire-and-forget write; failures are logged and the data dropped
    pub fn write(&self, data: &[u8]) {
        if let Err(e) = self.try_write(data) {
            warn!(
                "{}: dropping {:?}",
                e,
                String::from_utf8_lossy(data)
            );
        }
    }

    /// Ask the I/O task to close the socket
    ///
    /// The close is confirmed later by [`ConnectionEvent::Closed`].
    pub fn close(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            info!(addr = %self.addr, "Closing connection");
            self.state = ConnectionState::Closing;
            let _ = shutdown_tx.send(());
        }
        self.data_tx = None;
    }

    /// Record that the I/O task has ended
    pub fn handle_closed(&mut self, cause: &CloseCause) {
        debug!(addr = %self.addr, %cause, "Connection closed");
        self.data_tx = None;
        self.shutdown_tx = None;
        self.state = ConnectionState::Disconnected;
    }
}

/// Socket I/O loop
///
/// Returns after reporting [`ConnectionEvent::Closed`]. A shutdown signal,
/// a dropped write queue, end of stream or an I/O error all end the loop.
pub async fn run_connection_io<T>(
    io: T,
    mut data_rx: mpsc::Receiver<Vec<u8>>,
    mut shutdown_rx: oneshot::Receiver<()>,
    events: mpsc::Sender<ConnectionEvent>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut reader, mut writer) = tokio::io::split(io);
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    debug!("Connection I/O task starting");

    let cause = loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                break CloseCause::Local;
            }

            data = data_rx.recv() => {
                let Some(data) = data else {
                    break CloseCause::Local;
                };
                if let Err(e) = writer.write_all(&data).await {
                    break CloseCause::Error(format!("write failed: {}", e));
                }
                let _ = writer.flush().await;
            }

            result = reader.read(&mut buffer) => {
                match result {
                    Ok(0) => break CloseCause::PeerClosed,
                    Ok(n) => {
                        debug!("Received {} bytes", n);
                        if events.send(ConnectionEvent::Data(buffer[..n].to_vec())).await.is_err() {
                            break CloseCause::Local;
                        }
                    }
                    Err(e) => break CloseCause::Error(e.to_string()),
                }
            }
        }
    };

    let _ = writer.shutdown().await;
    debug!(%cause, "Connection I/O task ending");
    let _ = events.send(ConnectionEvent::Closed(cause)).await;
}
