//! Virtual Rotel amplifier
//!
//! Tracks power/volume/mute/source state from the command stream and queues
//! the `key=value$` reports a real unit would push back. Useful for testing
//! the client without hardware.

use std::collections::VecDeque;

use rotel_protocol::{
    Command, CommandCodec, PowerState, ProtocolCodec, Query, Report, Reported, SourceMap,
};
use tracing::{debug, warn};

/// Highest volume step the simulated unit accepts
pub const MAX_VOLUME: u32 = 100;

/// Frame a real unit emits unprompted right after a client connects
pub const GREETING: &[u8] = b"network_status=connected$";

/// Virtual amplifier for testing
pub struct VirtualAmplifier {
    /// Identifier for logging
    id: String,
    model: String,
    sources: SourceMap,
    power: PowerState,
    volume: u32,
    muted: bool,
    source: String,
    freq: String,
    codec: CommandCodec,
    /// Reports waiting to be written
    output: VecDeque<Vec<u8>>,
    /// Commands received (for test verification)
    received_commands: Vec<Command>,
}

impl VirtualAmplifier {
    /// Create a virtual amplifier in standby on the CD input
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            sources: SourceMap::rotel(),
            power: PowerState::Standby,
            volume: 30,
            muted: false,
            source: "cd".to_string(),
            freq: "off".to_string(),
            codec: CommandCodec::new(),
            output: VecDeque::new(),
            received_commands: Vec::new(),
        }
    }

    /// Get the identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn power(&self) -> PowerState {
        self.power
    }

    pub fn volume(&self) -> u32 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    /// Current input, as a source code
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Sample rate string reported for `freq?`
    pub fn set_freq(&mut self, freq: impl Into<String>) {
        self.freq = freq.into();
    }

    /// Process bytes sent to the amplifier
    ///
    /// Commands may be split across calls. Returns true if any state changed.
    pub fn process_bytes(&mut self, data: &[u8]) -> bool {
        self.codec.push_bytes(data);

        let mut changed = false;
        while let Some(cmd) = self.codec.next_command() {
            debug!("Virtual amplifier {} processing command: {:?}", self.id, cmd);
            changed |= self.apply(&cmd);
            self.received_commands.push(cmd);
        }
        changed
    }

    /// Apply one command, queueing the resulting reports
    fn apply(&mut self, cmd: &Command) -> bool {
        match cmd {
            Command::Query(_) | Command::Handshake => {
                for query in cmd.queries() {
                    self.answer(*query);
                }
                false
            }
            Command::PowerOn => self.set_power(PowerState::On),
            Command::PowerOff => self.set_power(PowerState::Standby),
            // A unit in standby only listens for power and queries
            _ if self.power == PowerState::Standby => {
                debug!("Virtual amplifier {} in standby, ignoring {:?}", self.id, cmd);
                false
            }
            Command::VolumeUp => self.set_volume(self.volume.saturating_add(1)),
            Command::VolumeDown => self.set_volume(self.volume.saturating_sub(1)),
            Command::SetVolume { percent } => self.set_volume(u32::from(*percent)),
            Command::Mute { on } => {
                let changed = self.muted != *on;
                self.muted = *on;
                self.answer(Query::Mute);
                changed
            }
            Command::Source { code } => {
                if self.sources.label(code).is_err() {
                    warn!("Virtual amplifier {} has no input {:?}", self.id, code);
                    return false;
                }
                let changed = self.source != *code;
                self.source = code.clone();
                self.answer(Query::Source);
                changed
            }
        }
    }

    fn set_power(&mut self, power: PowerState) -> bool {
        let changed = self.power != power;
        self.power = power;
        self.answer(Query::Power);
        changed
    }

    fn set_volume(&mut self, volume: u32) -> bool {
        let volume = volume.min(MAX_VOLUME);
        let changed = self.volume != volume;
        self.volume = volume;
        self.answer(Query::Volume);
        changed
    }

    /// Report for one attribute, as the amplifier would phrase it
    pub fn report(&self, query: Query) -> Report {
        match query {
            Query::Model => Report::Model(self.model.clone()),
            Query::Power => Report::Power(Reported::Known(self.power)),
            Query::Volume => Report::Volume(self.volume),
            Query::Mute => Report::Mute(Reported::Known(self.muted)),
            Query::Source => Report::Source(self.source.clone()),
            Query::Freq => Report::Freq(self.freq.clone()),
        }
    }

    fn answer(&mut self, query: Query) {
        let frame = self.report(query).encode();
        self.output.push_back(frame);
    }

    /// Queue arbitrary bytes, e.g. malformed or ambiguous frames
    pub fn queue_raw(&mut self, data: impl Into<Vec<u8>>) {
        self.output.push_back(data.into());
    }

    /// Take the next pending output frame
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.output.pop_front()
    }

    /// Take all pending output as one buffer
    pub fn drain_output(&mut self) -> Vec<u8> {
        self.output.drain(..).flatten().collect()
    }

    /// Get all received commands (for test verification)
    pub fn received_commands(&self) -> &[Command] {
        &self.received_commands
    }
}
