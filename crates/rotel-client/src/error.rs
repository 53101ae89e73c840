//! Error types for the amplifier client

use thiserror::Error;

/// Errors that can occur in the amplifier client
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connect failed
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialled
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// TCP connect did not complete in time
    #[error("connection to {addr} timed out after {timeout_ms}ms")]
    ConnectTimeout {
        /// Address that was dialled
        addr: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// No live transport to write to
    #[error("transport not ready")]
    ConnectionUnavailable,

    /// Outbound queue to the I/O task is full
    #[error("write queue full")]
    WriteQueueFull,

    /// The device actor is no longer running
    #[error("device actor has stopped")]
    ActorStopped,

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(#[from] rotel_protocol::ProtocolError),
}
