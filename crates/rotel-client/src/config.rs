//! Device connection configuration

use std::collections::BTreeMap;
use std::time::Duration;

use rotel_protocol::{FrameMode, ProtocolError, SourceMap, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

/// Display name used when none is configured
pub const DEFAULT_NAME: &str = "Rotel";

/// Default re-query budget per ambiguous attribute
pub const DEFAULT_MAX_REQUERIES: u32 = 3;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_max_requeries() -> Option<u32> {
    Some(DEFAULT_MAX_REQUERIES)
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

/// Configuration for one amplifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Hostname or IP address of the amplifier
    pub host: String,
    /// TCP control port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name shown to users
    #[serde(default = "default_name")]
    pub display_name: String,
    /// Source code → label table; the factory Rotel table when absent
    #[serde(default)]
    pub sources: Option<BTreeMap<String, String>>,
    /// Inbound framing behaviour
    #[serde(default)]
    pub frame_mode: FrameMode,
    /// Consecutive re-queries allowed per ambiguous attribute (`null` = unbounded)
    #[serde(default = "default_max_requeries")]
    pub max_requeries: Option<u32>,
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl DeviceConfig {
    /// Configuration with defaults for everything but the host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            display_name: default_name(),
            sources: None,
            frame_mode: FrameMode::default(),
            max_requeries: default_max_requeries(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }

    /// `host:port` string for dialling and logging
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Build the source map this device should use
    pub fn source_map(&self) -> Result<SourceMap, ProtocolError> {
        match &self.sources {
            Some(entries) => SourceMap::new(entries.iter().map(|(c, l)| (c.as_str(), l.as_str()))),
            None => Ok(SourceMap::rotel()),
        }
    }

    /// Re-query policy derived from `max_requeries`
    pub fn requery_policy(&self) -> RequeryPolicy {
        RequeryPolicy {
            max_consecutive: self.max_requeries,
        }
    }
}

/// Bound on self-healing re-queries for `power` and `mute`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeryPolicy {
    /// Re-queries allowed between two unambiguous values; `None` = unbounded
    pub max_consecutive: Option<u32>,
}

impl RequeryPolicy {
    /// Never stop re-querying
    pub fn unbounded() -> Self {
        Self {
            max_consecutive: None,
        }
    }

    /// Whether another re-query is allowed after `already_sent` of them
    pub fn allows(&self, already_sent: u32) -> bool {
        self.max_consecutive.map_or(true, |max| already_sent < max)
    }
}

impl Default for RequeryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive: Some(DEFAULT_MAX_REQUERIES),
        }
    }
}
