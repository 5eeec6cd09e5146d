//! Replicated-state synchronization engine
//!
//! Owns the local board replica and one outbound queue per channel.
//! Local actions are authorized, applied and turned into exactly one
//! broadcast; inbound messages are applied and reported back as a
//! [`Refresh`] hint for whoever renders the board.
//!
//! The engine is transport-agnostic and never blocks: sends use
//! `try_send`, so a slow or dead peer only loses its own messages.

use std::collections::HashMap;

use retro_core::invariants::assert_vote_budget;
use retro_core::{
    ActionItem, BoardAction, BoardState, Card, Category, Error as CoreError, Group, Participant,
    PeerAddress, PermissionMatrix, Phase, Role, Snapshot,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::protocol::Message;

/// Identifies one peer-to-peer channel
pub type ChannelId = Uuid;

/// Join handshake progress of a single channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    Connecting,
    Open,
    Introduced,
    Synced,
    Closed,
}

impl ChannelPhase {
    fn is_live(self) -> bool {
        matches!(
            self,
            ChannelPhase::Open | ChannelPhase::Introduced | ChannelPhase::Synced
        )
    }
}

/// Which part of the board a change touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Refresh {
    Cards,
    Groups,
    Votes,
    Actions,
    Phase,
    Roster,
    /// The local peer's own role changed
    Role,
    All,
}

/// A mutation requested by the local user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAction {
    AddCard {
        text: String,
        category: Category,
    },
    DeleteCard {
        card_id: String,
    },
    CreateGroup {
        name: Option<String>,
        card_ids: Vec<String>,
    },
    RenameGroup {
        group_id: String,
        name: String,
    },
    MoveCard {
        card_id: String,
        group_id: String,
    },
    UngroupCard {
        card_id: String,
    },
    CastVote {
        group_id: String,
    },
    AddAction {
        text: String,
        owner: Option<String>,
    },
    ToggleAction {
        action_id: String,
    },
    ChangePhase(Phase),
    ChangeRole {
        peer_address: PeerAddress,
        role: Role,
    },
    NewSession,
}

impl LocalAction {
    /// Permission needed to perform this action
    pub fn required_permission(&self) -> BoardAction {
        match self {
            LocalAction::AddCard { .. } => BoardAction::AddCard,
            LocalAction::DeleteCard { .. } => BoardAction::DeleteOwnCard,
            LocalAction::CreateGroup { .. } => BoardAction::CreateGroup,
            LocalAction::RenameGroup { .. }
            | LocalAction::MoveCard { .. }
            | LocalAction::UngroupCard { .. } => BoardAction::ModifyGroup,
            LocalAction::CastVote { .. } => BoardAction::CastVote,
            LocalAction::AddAction { .. } => BoardAction::AddActionItem,
            LocalAction::ToggleAction { .. } => BoardAction::ModifyActionItem,
            LocalAction::ChangePhase(_) => BoardAction::ChangePhase,
            LocalAction::ChangeRole { .. } => BoardAction::ManageRoles,
            LocalAction::NewSession => BoardAction::StartNewSession,
        }
    }
}

struct Channel {
    phase: ChannelPhase,
    outbound: Option<mpsc::Sender<Message>>,
    remote: Option<PeerAddress>,
    introduction_received: bool,
    snapshot_exchanged: bool,
}

impl Channel {
    fn advance(&mut self) {
        if self.phase == ChannelPhase::Closed {
            return;
        }
        self.phase = match (self.introduction_received, self.snapshot_exchanged) {
            (true, true) => ChannelPhase::Synced,
            (true, false) => ChannelPhase::Introduced,
            _ => ChannelPhase::Open,
        };
    }
}

pub struct SyncEngine {
    me: Participant,
    is_host: bool,
    session_id: String,
    board: BoardState,
    vote_budget: u32,
    votes_remaining: u32,
    channels: HashMap<ChannelId, Channel>,
}

impl SyncEngine {
    /// Start a new session; the host is the moderator and its peer
    /// address doubles as the session id
    pub fn host(display_name: impl Into<String>, peer_address: PeerAddress, vote_budget: u32) -> Self {
        let me = Participant::new(display_name, peer_address, Role::Moderator);
        let mut board = BoardState::new();
        board.add_participant(me.clone());
        info!(session = %me.peer_address, name = %me.display_name, "Hosting session");
        Self {
            session_id: me.peer_address.to_string(),
            me,
            is_host: true,
            board,
            vote_budget,
            votes_remaining: vote_budget,
            channels: HashMap::new(),
        }
    }

    /// Prepare to join `session_id` under a self-declared role
    pub fn join(
        display_name: impl Into<String>,
        peer_address: PeerAddress,
        role: Role,
        session_id: impl Into<String>,
        vote_budget: u32,
    ) -> Self {
        let me = Participant::new(display_name, peer_address, role);
        let mut board = BoardState::new();
        board.add_participant(me.clone());
        Self {
            me,
            is_host: false,
            session_id: session_id.into(),
            board,
            vote_budget,
            votes_remaining: vote_budget,
            channels: HashMap::new(),
        }
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn me(&self) -> &Participant {
        &self.me
    }

    pub fn role(&self) -> Role {
        self.me.role
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn vote_budget(&self) -> u32 {
        self.vote_budget
    }

    pub fn votes_remaining(&self) -> u32 {
        self.votes_remaining
    }

    pub fn channel_phase(&self, channel: ChannelId) -> Option<ChannelPhase> {
        self.channels.get(&channel).map(|c| c.phase)
    }

    /// Remote peer announced on a channel, once introduced
    pub fn channel_peer(&self, channel: ChannelId) -> Option<&PeerAddress> {
        self.channels.get(&channel).and_then(|c| c.remote.as_ref())
    }

    pub fn open_channels(&self) -> usize {
        self.channels.values().filter(|c| c.phase.is_live()).count()
    }

    pub fn authorize(&self, action: BoardAction) -> Result<()> {
        PermissionMatrix::check(self.me.role, action)?;
        Ok(())
    }

    /// Track a channel whose transport is still being set up
    pub fn register_channel(&mut self, channel: ChannelId, outbound: mpsc::Sender<Message>) {
        self.channels.insert(
            channel,
            Channel {
                phase: ChannelPhase::Connecting,
                outbound: Some(outbound),
                remote: None,
                introduction_received: false,
                snapshot_exchanged: false,
            },
        );
    }

    /// Channel is usable: introduce ourselves, and as host send the board
    pub fn channel_opened(&mut self, channel: ChannelId) {
        let introduction = Message::Introduction {
            display_name: self.me.display_name.clone(),
            peer_address: self.me.peer_address.clone(),
            role: self.me.role,
        };
        self.send(channel, introduction);
        if self.is_host {
            self.send(
                channel,
                Message::FullSnapshot {
                    state: self.board.clone(),
                },
            );
        }

        let is_host = self.is_host;
        if let Some(entry) = self.channels.get_mut(&channel) {
            entry.snapshot_exchanged = is_host;
            entry.advance();
            debug!(%channel, phase = ?entry.phase, "Channel open");
        }
    }

    /// Drop a channel from the fan-out set; the roster is left alone
    ///
    /// Returns the number of channels still open.
    pub fn channel_closed(&mut self, channel: ChannelId) -> usize {
        if let Some(entry) = self.channels.get_mut(&channel) {
            entry.phase = ChannelPhase::Closed;
            entry.outbound = None;
            info!(%channel, peer = ?entry.remote, "Channel closed");
        }
        self.open_channels()
    }

    /// Apply a message received on `channel`
    ///
    /// Inbound events are applied whatever the sender's role. Returns
    /// what changed, if anything.
    pub fn handle_message(&mut self, channel: ChannelId, msg: Message) -> Option<Refresh> {
        debug!(%channel, kind = msg.kind(), "Received");
        if self.is_host && msg.is_incremental() {
            self.broadcast(&msg, Some(channel));
        }

        match msg {
            Message::Introduction {
                display_name,
                peer_address,
                role,
            } => self.on_introduction(channel, Participant::new(display_name, peer_address, role)),
            Message::FullSnapshot { state } => {
                self.replace_board(state);
                if let Some(entry) = self.channels.get_mut(&channel) {
                    entry.snapshot_exchanged = true;
                    entry.advance();
                }
                Some(Refresh::All)
            }
            Message::ParticipantAdded { participant } => {
                let changed = self.board.merge_participant(participant);
                self.roster_refresh(changed)
            }
            Message::RosterSync { participants } => {
                let changed = self.board.merge_roster(participants);
                self.roster_refresh(changed)
            }
            Message::CardAdded { card } => self.board.insert_card(card).then_some(Refresh::Cards),
            Message::CardDeleted { card_id } => {
                self.board.remove_card(&card_id).then_some(Refresh::Cards)
            }
            Message::GroupCreated { group } => {
                self.board.insert_group(group).then_some(Refresh::Groups)
            }
            Message::GroupUpdated { group } => {
                self.board.replace_group(group).then_some(Refresh::Groups)
            }
            Message::VoteCast {
                group_id,
                voter_display_name,
            } => {
                self.board.record_vote(&group_id, &voter_display_name);
                Some(Refresh::Votes)
            }
            Message::ActionAdded { action } => {
                self.board.insert_action(action).then_some(Refresh::Actions)
            }
            Message::ActionUpdated { action } => {
                self.board.replace_action(action).then_some(Refresh::Actions)
            }
            Message::PhaseChanged { phase } => {
                self.board.set_phase(phase);
                Some(Refresh::Phase)
            }
            Message::RoleChanged {
                peer_address,
                new_role,
            } => {
                let changed = self.board.set_role(&peer_address, new_role);
                if peer_address == self.me.peer_address {
                    self.me.role = new_role;
                    info!(role = %new_role, "Our role was changed");
                    Some(Refresh::Role)
                } else {
                    changed.then_some(Refresh::Roster)
                }
            }
            Message::NewSessionRequested => {
                self.reset_session();
                Some(Refresh::All)
            }
            Message::Unknown => {
                debug!(%channel, "Dropping message of unknown type");
                None
            }
        }
    }

    fn on_introduction(&mut self, channel: ChannelId, participant: Participant) -> Option<Refresh> {
        info!(
            %channel,
            peer = %participant.peer_address,
            name = %participant.display_name,
            role = %participant.role,
            "Peer introduced"
        );
        if let Some(entry) = self.channels.get_mut(&channel) {
            entry.remote = Some(participant.peer_address.clone());
            entry.introduction_received = true;
            entry.advance();
        }

        let added = self.board.add_participant(participant.clone());
        if self.is_host {
            self.broadcast(&Message::ParticipantAdded { participant }, Some(channel));
            self.broadcast(
                &Message::RosterSync {
                    participants: self.board.participants.clone(),
                },
                None,
            );
        }
        added.then_some(Refresh::Roster)
    }

    fn roster_refresh(&mut self, changed: bool) -> Option<Refresh> {
        if self.derive_role() {
            return Some(Refresh::Role);
        }
        changed.then_some(Refresh::Roster)
    }

    /// Take our role from the roster; unchanged when we are not listed
    fn derive_role(&mut self) -> bool {
        match self.board.participant(&self.me.peer_address) {
            Some(entry) if entry.role != self.me.role => {
                self.me.role = entry.role;
                info!(role = %self.me.role, "Role updated from roster");
                true
            }
            _ => false,
        }
    }

    fn replace_board(&mut self, state: BoardState) {
        self.board = state;
        self.board.normalize();
        self.derive_role();
    }

    fn reset_session(&mut self) {
        self.board.reset_session();
        self.votes_remaining = self.vote_budget;
    }

    /// Authorize, apply and broadcast a local action
    ///
    /// Nothing is changed or sent when the action is refused.
    pub fn apply(&mut self, action: LocalAction) -> Result<Refresh> {
        self.authorize(action.required_permission())?;

        let (msg, refresh) = match action {
            LocalAction::AddCard { text, category } => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(invalid("Card text is empty"));
                }
                let card = Card::new(text, category, self.me.display_name.clone());
                self.board.insert_card(card.clone());
                (Message::CardAdded { card }, Refresh::Cards)
            }
            LocalAction::DeleteCard { card_id } => {
                let card = self
                    .board
                    .card(&card_id)
                    .ok_or_else(|| CoreError::NotFound(format!("card {}", card_id)))?;
                if card.author_user_name != self.me.display_name {
                    return Err(CoreError::PermissionDenied(
                        "Only the author can delete a card".into(),
                    )
                    .into());
                }
                self.board.remove_card(&card_id);
                (Message::CardDeleted { card_id }, Refresh::Cards)
            }
            LocalAction::CreateGroup { name, card_ids } => {
                if let Some(missing) = card_ids.iter().find(|id| self.board.card(id).is_none()) {
                    return Err(CoreError::NotFound(format!("card {}", missing)).into());
                }
                let mut group = Group::new(name.as_deref());
                group.card_ids = card_ids;
                group.dedup_cards();
                self.board.insert_group(group.clone());
                (Message::GroupCreated { group }, Refresh::Groups)
            }
            LocalAction::RenameGroup { group_id, name } => {
                let mut group = self.existing_group(&group_id)?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(invalid("Group name is empty"));
                }
                group.name = name.to_string();
                self.board.replace_group(group.clone());
                (Message::GroupUpdated { group }, Refresh::Groups)
            }
            LocalAction::MoveCard { card_id, group_id } => {
                if self.board.card(&card_id).is_none() {
                    return Err(CoreError::NotFound(format!("card {}", card_id)).into());
                }
                let mut group = self.existing_group(&group_id)?;
                if !group.contains(&card_id) {
                    group.card_ids.push(card_id);
                }
                self.board.replace_group(group.clone());
                (Message::GroupUpdated { group }, Refresh::Groups)
            }
            LocalAction::UngroupCard { card_id } => {
                let mut group = self
                    .board
                    .group_containing(&card_id)
                    .cloned()
                    .ok_or_else(|| invalid_core(format!("card {} is not in a group", card_id)))?;
                group.card_ids.retain(|id| *id != card_id);
                self.board.replace_group(group.clone());
                (Message::GroupUpdated { group }, Refresh::Groups)
            }
            LocalAction::CastVote { group_id } => {
                self.existing_group(&group_id)?;
                if self.votes_remaining == 0 {
                    return Err(invalid("No votes remaining"));
                }
                self.board.record_vote(&group_id, &self.me.display_name);
                self.votes_remaining -= 1;
                assert_vote_budget(self.votes_remaining, self.vote_budget);
                (
                    Message::VoteCast {
                        group_id,
                        voter_display_name: self.me.display_name.clone(),
                    },
                    Refresh::Votes,
                )
            }
            LocalAction::AddAction { text, owner } => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(invalid("Action text is empty"));
                }
                let owner = owner.as_deref().map(str::trim).filter(|o| !o.is_empty());
                let action = ActionItem::new(text, owner);
                self.board.insert_action(action.clone());
                (Message::ActionAdded { action }, Refresh::Actions)
            }
            LocalAction::ToggleAction { action_id } => {
                let mut action = self
                    .board
                    .action(&action_id)
                    .cloned()
                    .ok_or_else(|| CoreError::NotFound(format!("action {}", action_id)))?;
                action.completed = !action.completed;
                self.board.replace_action(action.clone());
                (Message::ActionUpdated { action }, Refresh::Actions)
            }
            LocalAction::ChangePhase(phase) => {
                self.board.set_phase(phase);
                (Message::PhaseChanged { phase }, Refresh::Phase)
            }
            LocalAction::ChangeRole { peer_address, role } => {
                if self.board.participant(&peer_address).is_none() {
                    return Err(CoreError::NotFound(format!("participant {}", peer_address)).into());
                }
                self.board.set_role(&peer_address, role);
                let refresh = if peer_address == self.me.peer_address {
                    self.me.role = role;
                    Refresh::Role
                } else {
                    Refresh::Roster
                };
                (
                    Message::RoleChanged {
                        peer_address,
                        new_role: role,
                    },
                    refresh,
                )
            }
            LocalAction::NewSession => {
                self.reset_session();
                (Message::NewSessionRequested, Refresh::All)
            }
        };

        debug!(kind = msg.kind(), "Applied local action");
        self.broadcast(&msg, None);
        Ok(refresh)
    }

    fn existing_group(&self, group_id: &str) -> Result<Group> {
        self.board
            .group(group_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("group {}", group_id)).into())
    }

    /// Capture the current board with session metadata
    pub fn build_snapshot(&self, is_automatic: bool) -> Snapshot {
        Snapshot::capture(
            &self.board,
            self.me.display_name.clone(),
            is_automatic,
            Some(PeerAddress::new(self.session_id.clone())),
        )
    }

    /// Replace the board with a snapshot's state
    ///
    /// A restoring host pushes the result to every peer.
    pub fn restore_snapshot(&mut self, snapshot: Snapshot) -> Result<Refresh> {
        self.authorize(BoardAction::RestoreSnapshot)?;
        info!(snapshot = %snapshot.id, saved_by = %snapshot.saved_by, "Restoring snapshot");
        self.replace_board(snapshot.state);
        if self.is_host {
            let msg = Message::FullSnapshot {
                state: self.board.clone(),
            };
            self.broadcast(&msg, None);
        }
        Ok(Refresh::All)
    }

    /// Board as an export file with clear-text cards
    pub fn export_board(&self) -> Result<String> {
        self.authorize(BoardAction::ExportBoard)?;
        Ok(self.build_snapshot(false).to_export_json()?)
    }

    /// Validate an export file, then restore it
    pub fn import_board(&mut self, contents: &str) -> Result<Refresh> {
        self.authorize(BoardAction::ImportBoard)?;
        let snapshot = Snapshot::from_export_json(contents)?;
        self.restore_snapshot(snapshot)
    }

    fn send(&self, channel: ChannelId, msg: Message) {
        let Some(outbound) = self.channels.get(&channel).and_then(|c| c.outbound.as_ref()) else {
            debug!(%channel, "Send to unknown or closed channel");
            return;
        };
        enqueue(channel, outbound, msg);
    }

    /// Queue `msg` on every open channel except `except`
    fn broadcast(&self, msg: &Message, except: Option<ChannelId>) {
        for (id, entry) in &self.channels {
            if Some(*id) == except || !entry.phase.is_live() {
                continue;
            }
            if let Some(outbound) = &entry.outbound {
                enqueue(*id, outbound, msg.clone());
            }
        }
    }
}

fn enqueue(channel: ChannelId, outbound: &mpsc::Sender<Message>, msg: Message) {
    match outbound.try_send(msg) {
        Ok(()) => {}
        Err(TrySendError::Full(msg)) => {
            warn!(%channel, kind = msg.kind(), "Outbound queue full, dropping message");
        }
        Err(TrySendError::Closed(msg)) => {
            debug!(%channel, kind = msg.kind(), "Outbound queue closed, dropping message");
        }
    }
}

fn invalid_core(msg: impl Into<String>) -> CoreError {
    CoreError::InvalidOperation(msg.into())
}

fn invalid(msg: &str) -> crate::error::Error {
    invalid_core(msg).into()
}
