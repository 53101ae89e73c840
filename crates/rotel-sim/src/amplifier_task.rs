//! Virtual amplifier actor task
//!
//! Owns a [`VirtualAmplifier`] and drives it from an async stream. The task
//! uses a select! loop to:
//! - Read commands from the client and write back the queued reports
//! - Handle inject/chunking/shutdown commands from a channel
//! - Emit state change events via a broadcast channel

use std::io;

use rotel_protocol::PowerState;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::amplifier::{VirtualAmplifier, GREETING};

/// Commands that can be sent to a virtual amplifier actor
#[derive(Debug, Clone)]
pub enum VirtualAmpCommand {
    /// Write raw bytes to the client as-is
    Inject(Vec<u8>),
    /// Split every write into pieces of at most this many bytes
    ///
    /// `None` writes each batch in one go.
    SetChunkSize(Option<usize>),
    /// Shutdown the virtual amplifier actor
    Shutdown,
}

/// State event emitted when virtual amplifier state changes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualAmpStateEvent {
    pub power: PowerState,
    pub volume: u32,
    pub muted: bool,
    pub source: String,
}

impl VirtualAmpStateEvent {
    fn from_amp(amp: &VirtualAmplifier) -> Self {
        Self {
            power: amp.power(),
            volume: amp.volume(),
            muted: amp.muted(),
            source: amp.source().to_string(),
        }
    }
}

/// How a client session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the stream
    PeerClosed,
    /// Shutdown was requested or the command channel closed
    Shutdown,
}

/// Run the virtual amplifier for a single client stream
///
/// Sends the unsolicited greeting frame first, then answers commands until
/// the client disconnects or shutdown is requested.
pub async fn run_virtual_amp_task<S>(
    stream: S,
    mut amp: VirtualAmplifier,
    mut cmd_rx: mpsc::Receiver<VirtualAmpCommand>,
    state_tx: broadcast::Sender<VirtualAmpStateEvent>,
) -> io::Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    run_session(stream, &mut amp, &mut cmd_rx, &state_tx).await
}

/// Accept clients one at a time, keeping amplifier state between sessions
///
/// Returns once shutdown is requested.
pub async fn serve(
    listener: TcpListener,
    mut amp: VirtualAmplifier,
    mut cmd_rx: mpsc::Receiver<VirtualAmpCommand>,
    state_tx: broadcast::Sender<VirtualAmpStateEvent>,
) -> io::Result<()> {
    info!(
        "Virtual amplifier {} listening on {}",
        amp.id(),
        listener.local_addr()?
    );

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            cmd = cmd_rx.recv() => match cmd {
                Some(VirtualAmpCommand::Shutdown) | None => break,
                Some(other) => {
                    debug!("No client connected, dropping {:?}", other);
                    continue;
                }
            },
        };

        info!("Client connected to virtual amplifier {}: {}", amp.id(), peer);
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        match run_session(stream, &mut amp, &mut cmd_rx, &state_tx).await {
            Ok(SessionEnd::PeerClosed) => info!("Client {} disconnected", peer),
            Ok(SessionEnd::Shutdown) => break,
            Err(e) => warn!("Session with {} failed: {}", peer, e),
        }
    }

    info!("Virtual amplifier {} stopped", amp.id());
    Ok(())
}

async fn run_session<S>(
    mut stream: S,
    amp: &mut VirtualAmplifier,
    cmd_rx: &mut mpsc::Receiver<VirtualAmpCommand>,
    state_tx: &broadcast::Sender<VirtualAmpStateEvent>,
) -> io::Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1024];
    let mut chunk_size: Option<usize> = None;

    info!("Starting virtual amplifier session for {} ({})", amp.id(), amp.model());

    write_chunked(&mut stream, GREETING, chunk_size).await?;

    // Emit initial state
    let _ = state_tx.send(VirtualAmpStateEvent::from_amp(amp));

    let end = loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual amplifier stream closed for {}", amp.id());
                        break SessionEnd::PeerClosed;
                    }
                    Ok(n) => {
                        let data = &buf[..n];
                        debug!(
                            "Virtual amplifier {} received {} bytes: {:?}",
                            amp.id(), n, String::from_utf8_lossy(data)
                        );

                        if amp.process_bytes(data) {
                            let event = VirtualAmpStateEvent::from_amp(amp);
                            debug!("Virtual amplifier {} state changed: {:?}", amp.id(), event);
                            let _ = state_tx.send(event);
                        }

                        let reply = amp.drain_output();
                        write_chunked(&mut stream, &reply, chunk_size).await?;
                    }
                    Err(e) => {
                        warn!("Virtual amplifier {} stream error: {}", amp.id(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualAmpCommand::Inject(data)) => {
                        debug!(
                            "Virtual amplifier {} injecting {:?}",
                            amp.id(), String::from_utf8_lossy(&data)
                        );
                        write_chunked(&mut stream, &data, chunk_size).await?;
                    }
                    Some(VirtualAmpCommand::SetChunkSize(size)) => {
                        info!("Virtual amplifier {} chunk size set to {:?}", amp.id(), size);
                        chunk_size = size.filter(|&n| n > 0);
                    }
                    Some(VirtualAmpCommand::Shutdown) => {
                        info!("Shutdown requested for virtual amplifier {}", amp.id());
                        break SessionEnd::Shutdown;
                    }
                    None => {
                        debug!("Command channel closed for virtual amplifier {}", amp.id());
                        break SessionEnd::Shutdown;
                    }
                }
            }
        }
    };

    info!("Virtual amplifier session ended for {}", amp.id());
    Ok(end)
}

/// Write `data`, optionally split into pieces with a yield between each
async fn write_chunked<S>(stream: &mut S, data: &[u8], chunk_size: Option<usize>) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    if data.is_empty() {
        return Ok(());
    }

    match chunk_size {
        None => {
            stream.write_all(data).await?;
            stream.flush().await
        }
        Some(size) => {
            for piece in data.chunks(size) {
                stream.write_all(piece).await?;
                stream.flush().await?;
                tokio::task::yield_now().await;
            }
            Ok(())
        }
    }
}
