//! Bidirectional source code / display label mapping
//!
//! The amplifier reports and accepts short input identifiers (`cd`, `opt1`,
//! `pc_usb`). Users see display labels (`CD`, `Optical 1`, `PC USB`). A
//! [`SourceMap`] holds both directions, built once and never mutated.

use std::collections::HashMap;

use crate::error::ProtocolError;

/// Factory input table for Rotel integrated amplifiers (code, label)
pub const ROTEL_SOURCES: &[(&str, &str)] = &[
    ("phono", "Phono"),
    ("cd", "CD"),
    ("tuner", "Tuner"),
    ("usb", "USB"),
    ("opt1", "Optical 1"),
    ("opt2", "Optical 2"),
    ("coax1", "Coax 1"),
    ("coax2", "Coax 2"),
    ("bluetooth", "Bluetooth"),
    ("pc_usb", "PC USB"),
    ("aux1", "Aux 1"),
    ("aux2", "Aux 2"),
];

/// Immutable bijection between amplifier source codes and display labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMap {
    by_code: HashMap<String, String>,
    by_label: HashMap<String, String>,
}

impl SourceMap {
    /// Build a map from `(code, label)` pairs
    ///
    /// Fails if a code or a label appears more than once, since either would
    /// break the round trip `label -> code -> label`.
    pub fn new<I, C, L>(entries: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = (C, L)>,
        C: Into<String>,
        L: Into<String>,
    {
        let mut by_code = HashMap::new();
        let mut by_label = HashMap::new();

        for (code, label) in entries {
            let code = code.into();
            let label = label.into();

            if by_code.contains_key(&code) {
                return Err(ProtocolError::DuplicateSourceCode(code));
            }
            if by_label.contains_key(&label) {
                return Err(ProtocolError::DuplicateSourceLabel(label));
            }

            by_code.insert(code.clone(), label.clone());
            by_label.insert(label, code);
        }

        Ok(Self { by_code, by_label })
    }

    /// The factory Rotel input table
    pub fn rotel() -> Self {
        let mut by_code = HashMap::with_capacity(ROTEL_SOURCES.len());
        let mut by_label = HashMap::with_capacity(ROTEL_SOURCES.len());
        for (code, label) in ROTEL_SOURCES {
            by_code.insert(code.to_string(), label.to_string());
            by_label.insert(label.to_string(), code.to_string());
        }
        Self { by_code, by_label }
    }

    /// Display label for an amplifier source code
    pub fn label(&self, code: &str) -> Result<&str, ProtocolError> {
        self.by_code
            .get(code)
            .map(String::as_str)
            .ok_or_else(|| ProtocolError::UnknownSourceCode(code.to_string()))
    }

    /// Amplifier source code for a display label
    pub fn code(&self, label: &str) -> Result<&str, ProtocolError> {
        self.by_label
            .get(label)
            .map(String::as_str)
            .ok_or_else(|| ProtocolError::UnknownSourceLabel(label.to_string()))
    }

    /// All display labels, sorted alphabetically
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.by_label.keys().cloned().collect();
        labels.sort();
        labels
    }

    /// Number of configured sources
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

impl Default for SourceMap {
    fn default() -> Self {
        Self::rotel()
    }
}
