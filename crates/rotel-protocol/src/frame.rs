//! Inbound frame reassembly
//!
//! The amplifier pushes `key=value$` reports that can be split or
//! concatenated arbitrarily by TCP. [`FrameDecoder`] accumulates received
//! bytes, hands back every complete frame, and keeps the incomplete tail for
//! the next read.
//!
//! # Modes
//!
//! - [`FrameMode::Strict`] returns every complete frame.
//! - [`FrameMode::Legacy`] reproduces the behaviour of older controllers:
//!   when a read ends mid-frame, the last complete frame of that read is
//!   discarded along with the placeholder. Only useful for comparing against
//!   captured traffic from those controllers.
//!
//!   It is not byte-for-byte faithful: those controllers kept their buffer
//!   after a read that ended on `$` and parsed the same frames again on the
//!   next read. Here a clean read end leaves nothing buffered in either mode,
//!   so a frame is never returned twice.

use tracing::{debug, warn};

/// Frame terminator
pub const FRAME_DELIMITER: u8 = b'$';

/// Prefix of undocumented status frames some firmware emits after connect
pub const NOISE_PREFIX: &str = "network_status";

/// Longest incomplete frame kept between reads
const MAX_FRAME_LEN: usize = 256;

/// How trailing fragments are handled when splitting a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FrameMode {
    /// Every complete frame is returned
    #[default]
    Strict,
    /// Drops the last complete frame of a read that ends mid-frame
    ///
    /// A read that ends cleanly still clears the buffer, so earlier frames
    /// are not replayed.
    Legacy,
}

/// Streaming `$`-delimited frame decoder
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    mode: FrameMode,
}

impl FrameDecoder {
    /// Create a strict decoder
    pub fn new() -> Self {
        Self::with_mode(FrameMode::Strict)
    }

    /// Create a decoder with an explicit mode
    pub fn with_mode(mode: FrameMode) -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_LEN),
            mode,
        }
    }

    /// The decoder's mode
    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    /// Bytes of the incomplete trailing frame, if any
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop any buffered fragment
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Push one received chunk and return the complete frames it finishes
    ///
    /// Frames are returned in arrival order without their delimiter.
    /// `network_status` frames are filtered out.
    pub fn decode(&mut self, data: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(data);

        let mut parts: Vec<&[u8]> = self.buffer.split(|&b| b == FRAME_DELIMITER).collect();

        // split() always yields at least one element: the tail after the
        // last delimiter, empty when the read ended cleanly.
        let tail = parts.pop().unwrap_or_default();
        let ended_mid_frame = !tail.is_empty();

        if ended_mid_frame && self.mode == FrameMode::Legacy {
            if let Some(dropped) = parts.pop() {
                debug!(
                    "Legacy framing dropped frame {:?}",
                    String::from_utf8_lossy(dropped)
                );
            }
        }

        let frames: Vec<String> = parts
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .filter(|frame| {
                let noise = frame.starts_with(NOISE_PREFIX);
                if noise {
                    debug!("Discarding status frame {:?}", frame);
                }
                !noise
            })
            .collect();

        let tail = tail.to_vec();
        if tail.len() > MAX_FRAME_LEN {
            warn!(
                "Discarding {} bytes of unterminated frame data",
                tail.len()
            );
            self.buffer.clear();
        } else {
            self.buffer = tail;
        }

        frames
    }
}
