//! Error types for Rotel protocol parsing and encoding

use thiserror::Error;

/// Errors that can occur while parsing a single inbound frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Frame has no `=` separator
    #[error("missing '=' separator in frame: {0:?}")]
    MissingSeparator(String),

    /// Frame has more than one `=` separator
    #[error("too many '=' separators in frame: {0:?}")]
    ExtraSeparator(String),

    /// Value could not be interpreted for its key
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Higher-level protocol errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Parse error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Source code reported by the amplifier is not in the source map
    #[error("unknown source code: {0}")]
    UnknownSourceCode(String),

    /// Source label requested by the user is not in the source map
    #[error("unknown source label: {0}")]
    UnknownSourceLabel(String),

    /// The same source code appears twice in a source map definition
    #[error("duplicate source code: {0}")]
    DuplicateSourceCode(String),

    /// The same source label appears twice in a source map definition
    #[error("duplicate source label: {0}")]
    DuplicateSourceLabel(String),
}
