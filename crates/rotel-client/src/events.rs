//! Event stream emitted by the device actor
//!
//! Observers receive everything through one channel: lifecycle changes,
//! state notifications and raw traffic for monitoring. The actor never waits
//! on this channel: when it is full, new events are dropped.

use crate::connection::CloseCause;
use crate::device::DeviceSnapshot;

/// Unified event enum for all device activity
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    // -------------------------------------------------------------------------
    // Lifecycle events
    // -------------------------------------------------------------------------
    /// Connection established and handshake sent
    Connected {
        /// Address of the amplifier
        addr: String,
    },

    /// Connection ended; no reconnect will be attempted
    ConnectionLost {
        /// Why the session ended
        cause: CloseCause,
    },

    // -------------------------------------------------------------------------
    // State events
    // -------------------------------------------------------------------------
    /// State after one receive event was applied
    ///
    /// Emitted at most once per read from the socket.
    StateChanged(DeviceSnapshot),

    // -------------------------------------------------------------------------
    // Traffic events (for monitoring)
    // -------------------------------------------------------------------------
    /// Raw bytes received from the amplifier
    DataIn {
        /// Raw data bytes
        data: Vec<u8>,
    },

    /// Raw bytes queued for the amplifier
    DataOut {
        /// Raw data bytes
        data: Vec<u8>,
    },

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------
    /// Non-fatal error surfaced for display
    Error {
        /// Component that produced the error
        source: String,
        /// Error message
        message: String,
    },
}

impl DeviceEvent {
    /// Returns true for [`DeviceEvent::DataIn`] and [`DeviceEvent::DataOut`]
    pub fn is_traffic(&self) -> bool {
        matches!(self, Self::DataIn { .. } | Self::DataOut { .. })
    }
}
