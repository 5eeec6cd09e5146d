//! Permission system for board operations
//!
//! The policy is advisory: it gates what this peer originates. Events
//! arriving from other peers are applied without consulting it.

use crate::error::{Error, Result};
use crate::models::Role;

/// Operations a peer can originate on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardAction {
    // Cards
    AddCard,
    DeleteOwnCard,

    // Grouping
    CreateGroup,
    ModifyGroup,

    // Voting
    CastVote,

    // Action items
    AddActionItem,
    ModifyActionItem,

    // Facilitation
    ChangePhase,
    ManageRoles,
    StartNewSession,

    // Snapshots and files
    RestoreSnapshot,
    ImportBoard,
    ExportBoard,
    SaveSnapshot,
}

/// Permission matrix for board roles
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Check if a role has permission to perform an action
    pub fn can_perform(role: Role, action: BoardAction) -> bool {
        match action {
            // Contributing - participants and up
            BoardAction::AddCard => role >= Role::Participant,
            BoardAction::DeleteOwnCard => role >= Role::Participant,
            BoardAction::CreateGroup => role >= Role::Participant,
            BoardAction::ModifyGroup => role >= Role::Participant,
            BoardAction::CastVote => role >= Role::Participant,
            BoardAction::AddActionItem => role >= Role::Participant,
            BoardAction::ModifyActionItem => role >= Role::Participant,

            // Facilitation - moderator only
            BoardAction::ChangePhase => role == Role::Moderator,
            BoardAction::ManageRoles => role == Role::Moderator,
            BoardAction::StartNewSession => role == Role::Moderator,
            BoardAction::RestoreSnapshot => role == Role::Moderator,
            BoardAction::ImportBoard => role == Role::Moderator,

            // Read-only - everyone
            BoardAction::ExportBoard => true,
            BoardAction::SaveSnapshot => true,
        }
    }

    /// Like [`PermissionMatrix::can_perform`], as a `Result`
    pub fn check(role: Role, action: BoardAction) -> Result<()> {
        if Self::can_perform(role, action) {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!(
                "{} may not perform {:?}",
                role.display_name(),
                action
            )))
        }
    }
}
