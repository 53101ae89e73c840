//! Inbound `key=value` messages and their typed interpretation

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// One decoded frame split into key and value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: String,
    pub value: String,
}

impl Message {
    /// Split a frame on its single `=`
    pub fn parse(frame: &str) -> Result<Self, ParseError> {
        let mut parts = frame.split('=');
        let key = parts.next().unwrap_or_default();
        let Some(value) = parts.next() else {
            return Err(ParseError::MissingSeparator(frame.to_string()));
        };
        if parts.next().is_some() {
            return Err(ParseError::ExtraSeparator(frame.to_string()));
        }

        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

impl FromStr for Message {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Amplifier power state as reported on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PowerState {
    On,
    Standby,
}

impl PowerState {
    /// Wire value for this state
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Standby => "standby",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value that is either one of the documented ones or something else
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reported<T> {
    Known(T),
    /// Value outside the documented set (kept for logging)
    Ambiguous(String),
}

/// Typed interpretation of a [`Message`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// `model=<name>`
    Model(String),
    /// `power=on|standby`
    Power(Reported<PowerState>),
    /// `mute=on|off`
    Mute(Reported<bool>),
    /// `volume=<int>`, percent of full scale (not range-checked)
    Volume(u32),
    /// `source=<code>`, still in amplifier code form
    Source(String),
    /// `freq=<raw>`, not interpreted
    Freq(String),
    /// Key this library does not track
    Other { key: String, value: String },
}

impl TryFrom<Message> for Report {
    type Error = ParseError;

    fn try_from(msg: Message) -> Result<Self, Self::Error> {
        let report = match msg.key.as_str() {
            "model" => Report::Model(msg.value),
            "power" => Report::Power(match msg.value.as_str() {
                "on" => Reported::Known(PowerState::On),
                "standby" => Reported::Known(PowerState::Standby),
                _ => Reported::Ambiguous(msg.value),
            }),
            "mute" => Report::Mute(match msg.value.as_str() {
                "on" => Reported::Known(true),
                "off" => Reported::Known(false),
                _ => Reported::Ambiguous(msg.value),
            }),
            "volume" => match msg.value.parse::<u32>() {
                Ok(v) => Report::Volume(v),
                Err(_) => {
                    return Err(ParseError::InvalidValue {
                        key: msg.key,
                        value: msg.value,
                    })
                }
            },
            "source" => Report::Source(msg.value),
            "freq" => Report::Freq(msg.value),
            _ => Report::Other {
                key: msg.key,
                value: msg.value,
            },
        };
        Ok(report)
    }
}

impl FromStr for Report {
    type Err = ParseError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        Report::try_from(Message::parse(frame)?)
    }
}

impl Report {
    /// Encode as a `key=value$` frame, the way the amplifier sends it
    pub fn encode(&self) -> Vec<u8> {
        let (key, value) = match self {
            Report::Model(name) => ("model", name.clone()),
            Report::Power(Reported::Known(state)) => ("power", state.to_string()),
            Report::Power(Reported::Ambiguous(raw)) => ("power", raw.clone()),
            Report::Mute(Reported::Known(on)) => ("mute", if *on { "on" } else { "off" }.into()),
            Report::Mute(Reported::Ambiguous(raw)) => ("mute", raw.clone()),
            Report::Volume(v) => ("volume", v.to_string()),
            Report::Source(code) => ("source", code.clone()),
            Report::Freq(raw) => ("freq", raw.clone()),
            Report::Other { key, value } => (key.as_str(), value.clone()),
        };
        format!("{}={}$", key, value).into_bytes()
    }
}
