//! Participant and role models

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Board roles in priority order (highest to lowest)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Role {
    /// Facilitator - full control, including phase and roles
    Moderator = 3,
    /// Standard contributor
    #[default]
    Participant = 2,
    /// Read-only observer
    Guest = 1,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Moderator => "Moderator",
            Role::Participant => "Participant",
            Role::Guest => "Guest",
        }
    }

    /// Wire name, as used in messages and files
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Moderator => "moderator",
            Role::Participant => "participant",
            Role::Guest => "guest",
        }
    }

    /// All roles in priority order (highest first)
    pub fn all_by_priority() -> &'static [Role] {
        &[Role::Moderator, Role::Participant, Role::Guest]
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::all_by_priority()
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidOperation(format!("Unknown role '{}'", s)))
    }
}

/// Opaque transport address of a peer
///
/// The core never interprets it; the transport adapter decides what it means.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(pub String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Generate a random address for a peer that does not listen
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..10)
            .map(|_| {
                std::char::from_digit(rng.gen_range(0..36), 36).unwrap_or('0')
            })
            .collect();
        Self(format!("peer-{}", suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A member of the session roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub display_name: String,
    pub peer_address: PeerAddress,
    #[serde(default)]
    pub role: Role,
}

impl Participant {
    pub fn new(display_name: impl Into<String>, peer_address: PeerAddress, role: Role) -> Self {
        Self {
            display_name: display_name.into(),
            peer_address,
            role,
        }
    }
}
