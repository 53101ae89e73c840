//! Outbound command representation and encoding
//!
//! Everything sent to the amplifier is a single ASCII token followed by a
//! terminator: `!` for actions (`power_on!`, `vol_42!`, `cd!`) and `?` for
//! queries (`power?`). No acknowledgement exists; replies arrive later as
//! ordinary `key=value$` reports.
//!
//! [`CommandCodec`] parses the same grammar from the amplifier's side and is
//! used by the simulator.

use crate::error::ProtocolError;
use crate::source::SourceMap;
use crate::{EncodeCommand, ProtocolCodec};

/// Terminator for action commands
pub const ACTION_TERMINATOR: u8 = b'!';

/// Terminator for queries
pub const QUERY_TERMINATOR: u8 = b'?';

/// Maximum command length before the codec discards its buffer
const MAX_COMMAND_LEN: usize = 32;

/// Attribute that can be queried with `<key>?`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Query {
    Model,
    Power,
    Volume,
    Mute,
    Source,
    Freq,
}

impl Query {
    /// Queries sent once after connecting, in wire order
    pub const HANDSHAKE: [Query; 6] = [
        Query::Model,
        Query::Power,
        Query::Volume,
        Query::Mute,
        Query::Source,
        Query::Freq,
    ];

    /// Wire key for this attribute
    pub fn key(&self) -> &'static str {
        match self {
            Query::Model => "model",
            Query::Power => "power",
            Query::Volume => "volume",
            Query::Mute => "mute",
            Query::Source => "source",
            Query::Freq => "freq",
        }
    }

    /// Look up a query by its wire key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::HANDSHAKE.into_iter().find(|q| q.key() == key)
    }
}

/// Command sent to the amplifier
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// `power_on!`
    PowerOn,
    /// `power_off!`
    PowerOff,
    /// `vol_up!`
    VolumeUp,
    /// `vol_down!`
    VolumeDown,
    /// `vol_NN!`
    SetVolume { percent: u8 },
    /// `mute_on!` / `mute_off!`
    Mute { on: bool },
    /// `<code>!`
    Source { code: String },
    /// `<key>?`
    Query(Query),
    /// Startup multi-query: `model?power?volume?mute?source?freq?`
    Handshake,
}

impl Command {
    /// Absolute volume from a normalized level in `0.0..=1.0`
    ///
    /// Out-of-range input is clamped and the percentage is rounded to the
    /// nearest integer. NaN encodes as zero.
    pub fn set_volume(level: f32) -> Self {
        let percent = if level.is_nan() {
            0
        } else {
            (level.clamp(0.0, 1.0) * 100.0).round_ties_even() as u8
        };
        Command::SetVolume { percent }
    }

    /// Source selection by display label
    pub fn select_source(sources: &SourceMap, label: &str) -> Result<Self, ProtocolError> {
        let code = sources.code(label)?;
        Ok(Command::Source {
            code: code.to_string(),
        })
    }

    /// Queries carried by this command, in send order; empty for actions
    pub fn queries(&self) -> &[Query] {
        match self {
            Command::Query(query) => std::slice::from_ref(query),
            Command::Handshake => &Query::HANDSHAKE,
            _ => &[],
        }
    }

    /// Parse one token (terminator stripped) as seen by the amplifier
    ///
    /// Any action token that is not a fixed keyword is treated as a source
    /// code; whether it names a real input is up to the receiver.
    pub fn from_token(token: &str, terminator: u8) -> Option<Self> {
        if token.is_empty() {
            return None;
        }

        if terminator == QUERY_TERMINATOR {
            return Query::from_key(token).map(Command::Query);
        }

        let cmd = match token {
            "power_on" => Command::PowerOn,
            "power_off" => Command::PowerOff,
            "vol_up" => Command::VolumeUp,
            "vol_down" => Command::VolumeDown,
            "mute_on" => Command::Mute { on: true },
            "mute_off" => Command::Mute { on: false },
            _ => match token.strip_prefix("vol_") {
                Some(digits) => Command::SetVolume {
                    percent: digits.parse().ok()?,
                },
                None => Command::Source {
                    code: token.to_string(),
                },
            },
        };
        Some(cmd)
    }
}

impl EncodeCommand for Command {
    fn encode(&self) -> Vec<u8> {
        match self {
            Command::PowerOn => b"power_on!".to_vec(),
            Command::PowerOff => b"power_off!".to_vec(),
            Command::VolumeUp => b"vol_up!".to_vec(),
            Command::VolumeDown => b"vol_down!".to_vec(),
            // Two-digit field; 100 spills to three digits
            Command::SetVolume { percent } => format!("vol_{:02}!", percent).into_bytes(),
            Command::Mute { on: true } => b"mute_on!".to_vec(),
            Command::Mute { on: false } => b"mute_off!".to_vec(),
            Command::Source { code } => format!("{}!", code).into_bytes(),
            Command::Query(_) | Command::Handshake => self
                .queries()
                .iter()
                .flat_map(|q| format!("{}?", q.key()).into_bytes())
                .collect(),
        }
    }
}

/// Streaming parser for the command stream sent *to* the amplifier
///
/// Splits on both `!` and `?`. A handshake arrives as six separate
/// [`Command::Query`] values.
pub struct CommandCodec {
    buffer: Vec<u8>,
}

impl CommandCodec {
    /// Create a new command codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_COMMAND_LEN),
        }
    }
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolCodec for CommandCodec {
    type Command = Command;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // A peer that never sends a terminator should not grow us forever
        let unterminated = self
            .buffer
            .iter()
            .rposition(|&b| b == ACTION_TERMINATOR || b == QUERY_TERMINATOR)
            .map_or(self.buffer.len(), |pos| self.buffer.len() - pos - 1);
        if unterminated > MAX_COMMAND_LEN {
            tracing::warn!(
                "Discarding {} unterminated command bytes",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }

    fn next_command(&mut self) -> Option<Self::Command> {
        self.next_command_with_bytes().map(|(cmd, _)| cmd)
    }

    fn next_command_with_bytes(&mut self) -> Option<(Self::Command, Vec<u8>)> {
        loop {
            let term_pos = self
                .buffer
                .iter()
                .position(|&b| b == ACTION_TERMINATOR || b == QUERY_TERMINATOR)?;

            let raw: Vec<u8> = self.buffer.drain(..=term_pos).collect();
            let terminator = raw[raw.len() - 1];
            let token = String::from_utf8_lossy(&raw[..raw.len() - 1]);

            match Command::from_token(&token, terminator) {
                Some(cmd) => return Some((cmd, raw)),
                None => tracing::warn!("Ignoring unrecognised command token: {:?}", token),
            }
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}
