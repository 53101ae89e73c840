//! Rotel Amplifier Protocol Library
//!
//! This crate provides parsing and encoding for the ASCII control protocol
//! spoken by Rotel network amplifiers on TCP port 9590.
//!
//! # Wire format
//!
//! - **Commands** (controller → amplifier): `<token>!`, e.g. `power_on!`,
//!   `vol_42!`, `cd!`
//! - **Queries** (controller → amplifier): `<key>?`, e.g. `power?`. Several
//!   may be concatenated: `model?power?volume?mute?source?freq?`
//! - **Reports** (amplifier → controller): `<key>=<value>$`, pushed whenever
//!   state changes and in reply to queries, split arbitrarily by TCP
//!
//! # Architecture
//!
//! - [`frame::FrameDecoder`] reassembles `$`-terminated frames from reads
//! - [`message::Message`] splits a frame into key and value, and
//!   [`message::Report`] classifies it
//! - [`command::Command`] encodes outbound commands
//! - [`source::SourceMap`] maps source codes to display labels and back
//!
//! # Example
//!
//! ```rust
//! use rotel_protocol::{Command, EncodeCommand, FrameDecoder, Message, Report, SourceMap};
//!
//! let mut decoder = FrameDecoder::new();
//! assert!(decoder.decode(b"power=on$sour").len() == 1);
//!
//! let frames = decoder.decode(b"ce=cd$");
//! let msg = Message::parse(&frames[0]).unwrap();
//! assert_eq!(Report::try_from(msg).unwrap(), Report::Source("cd".into()));
//!
//! let sources = SourceMap::rotel();
//! let cmd = Command::select_source(&sources, "CD").unwrap();
//! assert_eq!(cmd.encode(), b"cd!");
//! ```

pub mod command;
pub mod error;
pub mod frame;
pub mod message;
pub mod source;

pub use command::{Command, CommandCodec, Query};
pub use error::{ParseError, ProtocolError};
pub use frame::{FrameDecoder, FrameMode};
pub use message::{Message, PowerState, Report, Reported};
pub use source::{SourceMap, ROTEL_SOURCES};

/// Default TCP control port
pub const DEFAULT_PORT: u16 = 9590;

/// Trait for codecs that parse a streamed command grammar
pub trait ProtocolCodec {
    /// The command type produced by this codec
    type Command;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete command from the buffer
    fn next_command(&mut self) -> Option<Self::Command>;

    /// Try to extract the next complete command along with its raw bytes
    ///
    /// This is useful for traffic monitoring where we want to show the exact
    /// bytes that were parsed for each command.
    fn next_command_with_bytes(&mut self) -> Option<(Self::Command, Vec<u8>)>;

    /// Clear the internal buffer
    fn clear(&mut self);
}

/// Trait for commands that can be encoded to bytes
pub trait EncodeCommand {
    /// Encode this command to its wire format
    fn encode(&self) -> Vec<u8>;
}
