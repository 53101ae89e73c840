//! Per-amplifier session logic
//!
//! [`Device`] ties together the decoder, the source map and the state record.
//! It does no I/O: the actor feeds it reads and writes whatever it returns.

use rotel_protocol::{
    Command, FrameDecoder, FrameMode, Message, PowerState, ProtocolError, Query, SourceMap,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{DeviceConfig, RequeryPolicy};
use crate::connection::ConnectionState;
use crate::state::{ApplyOutcome, DeviceState};

/// User-level request for the amplifier
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    TurnOn,
    TurnOff,
    VolumeUp,
    VolumeDown,
    /// Absolute volume, `0.0..=1.0`
    SetVolume(f32),
    Mute(bool),
    /// Source by display label
    SelectSource(String),
}

/// Result of processing one receive event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Complete frames extracted from the read
    pub frames: usize,
    /// Frames that changed or confirmed state
    pub applied: usize,
    /// Frames skipped because they could not be parsed or mapped
    pub rejected: usize,
    /// Queries to send because of ambiguous values
    pub requeries: Vec<Query>,
}

impl BatchOutcome {
    /// Whether observers should be notified
    pub fn should_notify(&self) -> bool {
        self.applied > 0
    }
}

/// Read-only view handed to observers and presentation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub name: String,
    pub available: bool,
    pub connection: ConnectionState,
    pub power: Option<PowerState>,
    pub volume_level: Option<f32>,
    pub muted: Option<bool>,
    pub source: Option<String>,
    pub source_list: Vec<String>,
    pub model: Option<String>,
    pub frequency: Option<String>,
}

/// Session state for one amplifier
#[derive(Debug, Clone)]
pub struct Device {
    name: String,
    sources: SourceMap,
    decoder: FrameDecoder,
    state: DeviceState,
}

impl Device {
    /// Create a device with an all-unknown state
    pub fn new(
        name: impl Into<String>,
        sources: SourceMap,
        frame_mode: FrameMode,
        policy: RequeryPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            sources,
            decoder: FrameDecoder::with_mode(frame_mode),
            state: DeviceState::new(policy),
        }
    }

    /// Build from configuration
    pub fn from_config(config: &DeviceConfig) -> Result<Self, ProtocolError> {
        Ok(Self::new(
            config.display_name.clone(),
            config.source_map()?,
            config.frame_mode,
            config.requery_policy(),
        ))
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current attribute record
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Source map in use
    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    /// Decode one read and apply every frame in arrival order
    ///
    /// A frame that fails to parse or names an unknown source is logged and
    /// skipped; the rest of the batch still applies.
    pub fn receive(&mut self, data: &[u8]) -> BatchOutcome {
        let frames = self.decoder.decode(data);
        let mut outcome = BatchOutcome {
            frames: frames.len(),
            ..Default::default()
        };

        for frame in frames {
            let result = Message::parse(&frame)
                .map_err(ProtocolError::from)
                .and_then(|msg| self.state.apply(msg, &self.sources));

            match result {
                Ok(ApplyOutcome::Requery(query)) => {
                    outcome.applied += 1;
                    outcome.requeries.push(query);
                }
                Ok(ApplyOutcome::Updated) => outcome.applied += 1,
                Ok(ApplyOutcome::Ignored) => {}
                Err(ProtocolError::UnknownSourceCode(code)) => {
                    warn!("Unknown source from amplifier: {}", code);
                    outcome.rejected += 1;
                }
                Err(e) => {
                    warn!("Skipping frame {:?}: {}", frame, e);
                    outcome.rejected += 1;
                }
            }
        }

        debug!(
            frames = outcome.frames,
            applied = outcome.applied,
            rejected = outcome.rejected,
            "Processed receive batch"
        );
        outcome
    }

    /// Encode a user intent
    pub fn command_for(&self, intent: &Intent) -> Result<Command, ProtocolError> {
        let cmd = match intent {
            Intent::TurnOn => Command::PowerOn,
            Intent::TurnOff => Command::PowerOff,
            Intent::VolumeUp => Command::VolumeUp,
            Intent::VolumeDown => Command::VolumeDown,
            Intent::SetVolume(level) => Command::set_volume(*level),
            Intent::Mute(on) => Command::Mute { on: *on },
            Intent::SelectSource(label) => Command::select_source(&self.sources, label)?,
        };
        Ok(cmd)
    }

    /// Snapshot for observers, given the current transport state
    pub fn snapshot(&self, connection: ConnectionState) -> DeviceSnapshot {
        DeviceSnapshot {
            name: self.name.clone(),
            available: self.state.is_known() && connection == ConnectionState::Connected,
            connection,
            power: self.state.power,
            volume_level: self.state.volume_level(),
            muted: self.state.muted,
            source: self
                .state
                .source_label(&self.sources)
                .map(str::to_string),
            source_list: self.sources.labels(),
            model: self.state.model.clone(),
            frequency: self.state.frequency.clone(),
        }
    }
}
