//! Retrospective phase model

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The single global phase of a retrospective, encoded as 1..=5 on the wire
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Phase {
    #[default]
    Cards = 1,
    Group = 2,
    Vote = 3,
    Discuss = 4,
    Actions = 5,
}

impl Phase {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn title(&self) -> &'static str {
        match self {
            Phase::Cards => "Phase 1: Enter Cards",
            Phase::Group => "Phase 2: Group Cards",
            Phase::Vote => "Phase 3: Vote",
            Phase::Discuss => "Phase 4: Discussion",
            Phase::Actions => "Phase 5: Action Items",
        }
    }

    pub fn all() -> &'static [Phase] {
        &[
            Phase::Cards,
            Phase::Group,
            Phase::Vote,
            Phase::Discuss,
            Phase::Actions,
        ]
    }
}

impl TryFrom<u8> for Phase {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Phase::Cards),
            2 => Ok(Phase::Group),
            3 => Ok(Phase::Vote),
            4 => Ok(Phase::Discuss),
            5 => Ok(Phase::Actions),
            other => Err(Error::InvalidOperation(format!(
                "Phase must be between 1 and 5, got {}",
                other
            ))),
        }
    }
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> Self {
        phase as u8
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}
