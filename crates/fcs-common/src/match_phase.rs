//! Match phase and match event types.
//!
//! The phase value is owned by an external match state machine; this core
//! only reads it. Events are the phase-transition notifications that drive
//! named field-control packets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the currently loaded match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchPhase {
    /// Field is being prepared; robots connecting.
    #[default]
    Prestart,
    /// Autonomous period.
    Autonomous,
    /// Transition between autonomous and teleoperated.
    Transition,
    /// Driver-controlled period.
    Teleoperated,
    /// Final seconds of the teleoperated period.
    Endgame,
    /// Match has run to completion.
    Ended,
    /// Match was aborted by the head referee or an e-stop.
    Aborted,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prestart => write!(f, "PRESTART"),
            Self::Autonomous => write!(f, "AUTONOMOUS"),
            Self::Transition => write!(f, "TRANSITION"),
            Self::Teleoperated => write!(f, "TELEOPERATED"),
            Self::Endgame => write!(f, "ENDGAME"),
            Self::Ended => write!(f, "ENDED"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

impl MatchPhase {
    /// Returns true while a match is actively running on the field.
    ///
    /// These are the phases during which the PLC match-start coil is armed.
    #[must_use]
    pub fn is_in_match(self) -> bool {
        matches!(
            self,
            Self::Autonomous | Self::Transition | Self::Teleoperated | Self::Endgame
        )
    }
}

/// Match lifecycle notifications consumed by the field engine.
///
/// Each event maps to one compiled packet: teleop start, endgame,
/// match end, and abort (field fault).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchEvent {
    /// Teleoperated period began.
    Teleoperated,
    /// Endgame period began.
    Endgame,
    /// Match ran to completion.
    Ended,
    /// Match was aborted.
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_match_phases() {
        assert!(!MatchPhase::Prestart.is_in_match());
        assert!(MatchPhase::Autonomous.is_in_match());
        assert!(MatchPhase::Transition.is_in_match());
        assert!(MatchPhase::Teleoperated.is_in_match());
        assert!(MatchPhase::Endgame.is_in_match());
        assert!(!MatchPhase::Ended.is_in_match());
        assert!(!MatchPhase::Aborted.is_in_match());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(MatchPhase::Prestart.to_string(), "PRESTART");
        assert_eq!(MatchPhase::Teleoperated.to_string(), "TELEOPERATED");
    }
}
