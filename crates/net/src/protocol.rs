//! Wire messages exchanged between peers
//!
//! Each message is a JSON object tagged by a snake_case `type` field with
//! camelCase payload fields. Unknown fields are ignored; an unknown `type`
//! decodes to [`Message::Unknown`].

use retro_core::{ActionItem, BoardState, Card, Group, Participant, PeerAddress, Phase, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Message {
    /// First message on every channel, in both directions
    Introduction {
        display_name: String,
        peer_address: PeerAddress,
        #[serde(default)]
        role: Role,
    },

    /// Entire board; sent by the host on accept and after a restore
    FullSnapshot { state: BoardState },

    /// Host tells earlier peers about a newcomer
    ParticipantAdded { participant: Participant },

    /// Host sends the full roster after every join
    RosterSync { participants: Vec<Participant> },

    CardAdded { card: Card },

    CardDeleted { card_id: String },

    GroupCreated { group: Group },

    GroupUpdated { group: Group },

    VoteCast {
        group_id: String,
        #[serde(alias = "username")]
        voter_display_name: String,
    },

    ActionAdded { action: ActionItem },

    ActionUpdated { action: ActionItem },

    PhaseChanged { phase: Phase },

    RoleChanged {
        peer_address: PeerAddress,
        new_role: Role,
    },

    NewSessionRequested,

    #[serde(other)]
    Unknown,
}

impl Message {
    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Wire name of the message kind
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Introduction { .. } => "introduction",
            Message::FullSnapshot { .. } => "full_snapshot",
            Message::ParticipantAdded { .. } => "participant_added",
            Message::RosterSync { .. } => "roster_sync",
            Message::CardAdded { .. } => "card_added",
            Message::CardDeleted { .. } => "card_deleted",
            Message::GroupCreated { .. } => "group_created",
            Message::GroupUpdated { .. } => "group_updated",
            Message::VoteCast { .. } => "vote_cast",
            Message::ActionAdded { .. } => "action_added",
            Message::ActionUpdated { .. } => "action_updated",
            Message::PhaseChanged { .. } => "phase_changed",
            Message::RoleChanged { .. } => "role_changed",
            Message::NewSessionRequested => "new_session_requested",
            Message::Unknown => "unknown",
        }
    }

    /// Board mutations that every peer applies and the host relays
    pub fn is_incremental(&self) -> bool {
        matches!(
            self,
            Message::CardAdded { .. }
                | Message::CardDeleted { .. }
                | Message::GroupCreated { .. }
                | Message::GroupUpdated { .. }
                | Message::VoteCast { .. }
                | Message::ActionAdded { .. }
                | Message::ActionUpdated { .. }
                | Message::PhaseChanged { .. }
                | Message::RoleChanged { .. }
                | Message::NewSessionRequested
        )
    }
}
