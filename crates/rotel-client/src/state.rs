//! Amplifier state tracking

use rotel_protocol::{Message, PowerState, ProtocolError, Query, Report, Reported, SourceMap};
use tracing::{debug, warn};

use crate::config::RequeryPolicy;

/// What applying one report did to the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A tracked attribute was written
    Updated,
    /// The value was ambiguous; the attribute is now unknown and should be
    /// re-queried
    Requery(Query),
    /// Report for a key that is not tracked
    Ignored,
}

/// Last known amplifier attributes
///
/// Every field is `None` until the amplifier first reports it. Only the
/// inbound pipeline writes to this record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    /// Power state
    pub power: Option<PowerState>,
    /// Mute state
    pub muted: Option<bool>,
    /// Volume as reported (percent, not range checked)
    pub volume: Option<u32>,
    /// Active source, as an amplifier code
    pub source: Option<String>,
    /// Raw `freq` report
    pub frequency: Option<String>,
    /// Model name from the handshake
    pub model: Option<String>,
    policy: RequeryPolicy,
    power_requeries: u32,
    mute_requeries: u32,
}

impl DeviceState {
    /// Create an all-unknown state
    pub fn new(policy: RequeryPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Normalized volume in `0.0..=1.0` (above 1.0 if the amp reports >100)
    pub fn volume_level(&self) -> Option<f32> {
        self.volume.map(|v| v as f32 / 100.0)
    }

    /// Display label of the active source
    pub fn source_label<'a>(&self, sources: &'a SourceMap) -> Option<&'a str> {
        self.source
            .as_deref()
            .and_then(|code| sources.label(code).ok())
    }

    /// Whether enough is known to present the device as usable
    pub fn is_known(&self) -> bool {
        self.power.is_some()
    }

    /// Apply one inbound `key=value` message
    pub fn apply(
        &mut self,
        message: Message,
        sources: &SourceMap,
    ) -> Result<ApplyOutcome, ProtocolError> {
        let report = Report::try_from(message)?;
        self.apply_report(report, sources)
    }

    /// Apply an already classified report
    ///
    /// An unknown source code leaves the previous source in place and is
    /// returned as [`ProtocolError::UnknownSourceCode`].
    pub fn apply_report(
        &mut self,
        report: Report,
        sources: &SourceMap,
    ) -> Result<ApplyOutcome, ProtocolError> {
        let outcome = match report {
            Report::Power(Reported::Known(state)) => {
                self.power = Some(state);
                self.power_requeries = 0;
                ApplyOutcome::Updated
            }
            Report::Power(Reported::Ambiguous(raw)) => {
                self.power = None;
                self.requery(Query::Power, &raw)
            }
            Report::Mute(Reported::Known(muted)) => {
                self.muted = Some(muted);
                self.mute_requeries = 0;
                ApplyOutcome::Updated
            }
            Report::Mute(Reported::Ambiguous(raw)) => {
                self.muted = None;
                self.requery(Query::Mute, &raw)
            }
            Report::Volume(volume) => {
                self.volume = Some(volume);
                ApplyOutcome::Updated
            }
            Report::Source(code) => {
                sources.label(&code)?;
                self.source = Some(code);
                ApplyOutcome::Updated
            }
            Report::Freq(raw) => {
                debug!("Frequency report: {}", raw);
                self.frequency = Some(raw);
                ApplyOutcome::Updated
            }
            Report::Model(model) => {
                self.model = Some(model);
                ApplyOutcome::Updated
            }
            Report::Other { key, value } => {
                debug!("Ignoring untracked report {}={}", key, value);
                ApplyOutcome::Ignored
            }
        };
        Ok(outcome)
    }

    fn requery(&mut self, query: Query, raw: &str) -> ApplyOutcome {
        let sent = match query {
            Query::Mute => &mut self.mute_requeries,
            _ => &mut self.power_requeries,
        };

        if self.policy.allows(*sent) {
            *sent += 1;
            debug!(
                "Ambiguous {} value {:?}, re-querying (attempt {})",
                query.key(),
                raw,
                sent
            );
            ApplyOutcome::Requery(query)
        } else {
            warn!(
                "Ambiguous {} value {:?}; re-query budget exhausted, leaving unknown",
                query.key(),
                raw
            );
            ApplyOutcome::Updated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rotel_protocol::{Command, EncodeCommand, ROTEL_SOURCES};

    fn msg(frame: &str) -> Message {
        Message::parse(frame).unwrap()
    }

    fn fresh() -> (DeviceState, SourceMap) {
        (DeviceState::new(RequeryPolicy::default()), SourceMap::rotel())
    }

    #[test]
    fn test_starts_unknown() {
        let (state, sources) = fresh();
        assert_eq!(state.power, None);
        assert_eq!(state.muted, None);
        assert_eq!(state.volume_level(), None);
        assert_eq!(state.source_label(&sources), None);
        assert_eq!(state.frequency, None);
        assert!(!state.is_known());
    }

    #[test]
    fn test_power() {
        let (mut state, sources) = fresh();
        assert_eq!(
            state.apply(msg("power=on"), &sources),
            Ok(ApplyOutcome::Updated)
        );
        assert_eq!(state.power, Some(PowerState::On));
        assert!(state.is_known());

        state.apply(msg("power=standby"), &sources).unwrap();
        assert_eq!(state.power, Some(PowerState::Standby));
    }

    #[test]
    fn test_ambiguous_power_requeries_once() {
        let (mut state, sources) = fresh();
        state.apply(msg("power=on"), &sources).unwrap();

        let outcome = state.apply(msg("power=unexpected"), &sources).unwrap();
        assert_eq!(outcome, ApplyOutcome::Requery(Query::Power));
        assert_eq!(state.power, None);
        assert_eq!(Command::Query(Query::Power).encode(), b"power?");
    }

    #[test]
    fn test_ambiguous_mute_requeries_once() {
        let (mut state, sources) = fresh();
        let outcome = state.apply(msg("mute=maybe"), &sources).unwrap();
        assert_eq!(outcome, ApplyOutcome::Requery(Query::Mute));
        assert_eq!(state.muted, None);

        state.apply(msg("mute=on"), &sources).unwrap();
        assert_eq!(state.muted, Some(true));
        state.apply(msg("mute=off"), &sources).unwrap();
        assert_eq!(state.muted, Some(false));
    }

    #[test]
    fn test_requery_budget() {
        let policy = RequeryPolicy {
            max_consecutive: Some(2),
        };
        let mut state = DeviceState::new(policy);
        let sources = SourceMap::rotel();

        let requery = ApplyOutcome::Requery(Query::Power);
        assert_eq!(state.apply(msg("power=?"), &sources), Ok(requery));
        assert_eq!(state.apply(msg("power=?"), &sources), Ok(requery));
        assert_eq!(
            state.apply(msg("power=?"), &sources),
            Ok(ApplyOutcome::Updated)
        );

        // Mute has its own budget
        assert_eq!(
            state.apply(msg("mute=?"), &sources),
            Ok(ApplyOutcome::Requery(Query::Mute))
        );

        // A clean value restores the power budget
        state.apply(msg("power=on"), &sources).unwrap();
        assert_eq!(state.apply(msg("power=?"), &sources), Ok(requery));
    }

    #[test]
    fn test_unbounded_requery() {
        let mut state = DeviceState::new(RequeryPolicy::unbounded());
        let sources = SourceMap::rotel();
        for _ in 0..50 {
            assert_eq!(
                state.apply(msg("power=glitch"), &sources),
                Ok(ApplyOutcome::Requery(Query::Power))
            );
        }
    }

    #[test]
    fn test_volume() {
        let (mut state, sources) = fresh();
        state.apply(msg("volume=50"), &sources).unwrap();
        assert_eq!(state.volume, Some(50));
        assert_eq!(state.volume_level(), Some(0.5));

        // Not range checked
        state.apply(msg("volume=120"), &sources).unwrap();
        assert_eq!(state.volume_level(), Some(1.2));

        assert!(matches!(
            state.apply(msg("volume=loud"), &sources),
            Err(ProtocolError::Parse(_))
        ));
        assert_eq!(state.volume, Some(120));
    }

    #[test]
    fn test_source() {
        let (mut state, sources) = fresh();
        state.apply(msg("source=opt1"), &sources).unwrap();
        assert_eq!(state.source.as_deref(), Some("opt1"));
        assert_eq!(state.source_label(&sources), Some("Optical 1"));
    }

    #[test]
    fn test_unknown_source_keeps_previous() {
        let (mut state, sources) = fresh();
        state.apply(msg("source=cd"), &sources).unwrap();

        assert_eq!(
            state.apply(msg("source=xyz"), &sources),
            Err(ProtocolError::UnknownSourceCode("xyz".into()))
        );
        assert_eq!(state.source_label(&sources), Some("CD"));
    }

    #[test]
    fn test_freq_and_model_stored_raw() {
        let (mut state, sources) = fresh();
        state.apply(msg("freq=44.1"), &sources).unwrap();
        state.apply(msg("model=A14MKII"), &sources).unwrap();
        assert_eq!(state.frequency.as_deref(), Some("44.1"));
        assert_eq!(state.model.as_deref(), Some("A14MKII"));
    }

    #[test]
    fn test_untracked_key_ignored() {
        let (mut state, sources) = fresh();
        let before = state.clone();
        assert_eq!(
            state.apply(msg("treble=+03"), &sources),
            Ok(ApplyOutcome::Ignored)
        );
        assert_eq!(state, before);
    }

    proptest! {
        #[test]
        fn source_label_round_trips(index in 0..ROTEL_SOURCES.len()) {
            let (mut state, sources) = fresh();
            let (_, label) = ROTEL_SOURCES[index];

            let encoded = Command::select_source(&sources, label).unwrap().encode();
            let code = String::from_utf8(encoded).unwrap();
            let code = code.trim_end_matches('!');

            state.apply(msg(&format!("source={}", code)), &sources).unwrap();
            prop_assert_eq!(state.source_label(&sources), Some(label));
        }
    }
}
