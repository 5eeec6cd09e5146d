//! Replicated board state
//!
//! Every peer holds a full copy. All mutation goes through the methods
//! below; each returns whether anything changed so callers can decide
//! whether to re-render or persist.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::invariants::assert_board_invariants;
use crate::models::{ActionItem, Card, Group, Participant, PeerAddress, Phase, Role};

/// The shared retrospective document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    #[serde(default)]
    pub current_phase: Phase,
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Group id -> voter display names, one entry per vote cast
    #[serde(default)]
    pub votes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl BoardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    /// Append a card unless its id is already present
    pub fn insert_card(&mut self, card: Card) -> bool {
        if self.card(&card.id).is_some() {
            return false;
        }
        self.cards.push(card);
        true
    }

    pub fn remove_card(&mut self, card_id: &str) -> bool {
        let before = self.cards.len();
        self.cards.retain(|c| c.id != card_id);
        self.cards.len() != before
    }

    /// Cards not in any group, in insertion order
    pub fn ungrouped_cards(&self) -> Vec<&Card> {
        self.cards
            .iter()
            .filter(|c| self.group_containing(&c.id).is_none())
            .collect()
    }

    pub fn group(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    pub fn group_containing(&self, card_id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.contains(card_id))
    }

    /// Append a group unless its id is already present
    ///
    /// Its cards leave whatever group held them before.
    pub fn insert_group(&mut self, mut group: Group) -> bool {
        if self.group(&group.id).is_some() {
            return false;
        }
        group.dedup_cards();
        self.release_cards(&group.id, &group.card_ids);
        self.groups.push(group);
        assert_board_invariants(self);
        true
    }

    /// Replace the group with the same id; unknown ids are ignored
    ///
    /// Its cards leave whatever other group held them before.
    pub fn replace_group(&mut self, mut group: Group) -> bool {
        let Some(index) = self.groups.iter().position(|g| g.id == group.id) else {
            return false;
        };
        group.dedup_cards();
        self.release_cards(&group.id, &group.card_ids);
        self.groups[index] = group;
        assert_board_invariants(self);
        true
    }

    fn release_cards(&mut self, keep_group_id: &str, card_ids: &[String]) {
        for other in self.groups.iter_mut().filter(|g| g.id != keep_group_id) {
            other.card_ids.retain(|id| !card_ids.contains(id));
        }
    }

    /// Append one vote; no de-duplication and no budget check
    pub fn record_vote(&mut self, group_id: &str, voter: &str) {
        self.votes
            .entry(group_id.to_string())
            .or_default()
            .push(voter.to_string());
    }

    pub fn vote_count(&self, group_id: &str) -> usize {
        self.votes.get(group_id).map_or(0, Vec::len)
    }

    pub fn votes_by(&self, group_id: &str, voter: &str) -> usize {
        self.votes
            .get(group_id)
            .map_or(0, |v| v.iter().filter(|name| *name == voter).count())
    }

    /// Groups holding at least one card, most votes first
    ///
    /// Ties keep group creation order.
    pub fn ranked_groups(&self) -> Vec<(&Group, usize)> {
        let mut ranked: Vec<(&Group, usize)> = self
            .groups
            .iter()
            .filter(|g| !g.card_ids.is_empty())
            .map(|g| (g, self.vote_count(&g.id)))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    pub fn action(&self, action_id: &str) -> Option<&ActionItem> {
        self.action_items.iter().find(|a| a.id == action_id)
    }

    pub fn insert_action(&mut self, action: ActionItem) -> bool {
        if self.action(&action.id).is_some() {
            return false;
        }
        self.action_items.push(action);
        true
    }

    pub fn replace_action(&mut self, action: ActionItem) -> bool {
        match self.action_items.iter_mut().find(|a| a.id == action.id) {
            Some(slot) => {
                *slot = action;
                true
            }
            None => false,
        }
    }

    pub fn set_phase(&mut self, phase: Phase) -> bool {
        if self.current_phase == phase {
            return false;
        }
        self.current_phase = phase;
        true
    }

    pub fn participant(&self, peer_address: &PeerAddress) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| &p.peer_address == peer_address)
    }

    /// Add a participant introduced on a channel
    ///
    /// An already known peer address is left exactly as it is.
    pub fn add_participant(&mut self, participant: Participant) -> bool {
        if self.participant(&participant.peer_address).is_some() {
            return false;
        }
        self.participants.push(participant);
        true
    }

    /// Merge a roster entry: union on membership, last value wins on fields
    pub fn merge_participant(&mut self, participant: Participant) -> bool {
        match self
            .participants
            .iter_mut()
            .find(|p| p.peer_address == participant.peer_address)
        {
            Some(existing) if *existing == participant => false,
            Some(existing) => {
                *existing = participant;
                true
            }
            None => {
                self.participants.push(participant);
                true
            }
        }
    }

    pub fn merge_roster(&mut self, roster: Vec<Participant>) -> bool {
        let mut changed = false;
        for participant in roster {
            changed |= self.merge_participant(participant);
        }
        changed
    }

    pub fn set_role(&mut self, peer_address: &PeerAddress, role: Role) -> bool {
        match self
            .participants
            .iter_mut()
            .find(|p| &p.peer_address == peer_address)
        {
            Some(p) if p.role != role => {
                p.role = role;
                true
            }
            _ => false,
        }
    }

    /// Clear the board for a new retrospective; the roster is kept
    pub fn reset_session(&mut self) {
        let participants = std::mem::take(&mut self.participants);
        *self = BoardState {
            participants,
            ..BoardState::default()
        };
    }

    /// Repair a board received whole from outside
    ///
    /// Duplicate cards, groups and roster entries keep their first position.
    /// A card listed by several groups stays in the first one. A repeated
    /// roster address takes the values of its last entry. Returns whether
    /// anything had to change.
    pub fn normalize(&mut self) -> bool {
        let before = (
            self.cards.len(),
            self.groups.clone(),
            self.participants.clone(),
        );

        let mut card_ids = HashSet::new();
        self.cards.retain(|c| card_ids.insert(c.id.clone()));

        let mut group_ids = HashSet::new();
        self.groups.retain(|g| group_ids.insert(g.id.clone()));
        let mut claimed = HashSet::new();
        for group in &mut self.groups {
            group.card_ids.retain(|id| claimed.insert(id.clone()));
        }

        let roster = std::mem::take(&mut self.participants);
        self.merge_roster(roster);

        assert_board_invariants(self);
        let changed = before.0 != self.cards.len()
            || before.1 != self.groups
            || before.2 != self.participants;
        if changed {
            tracing::warn!("Repaired inconsistent board state");
        }
        changed
    }

    /// Map every card's stored text through `f`
    pub fn map_card_text(&mut self, f: impl Fn(&str) -> String) {
        for card in &mut self.cards {
            card.text = f(&card.text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn group_with(id: &str, cards: &[&str]) -> Group {
        Group {
            id: id.to_string(),
            name: id.to_string(),
            card_ids: cards.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn no_card_in_two_groups(board: &BoardState) -> bool {
        let mut seen = std::collections::HashSet::new();
        board
            .groups
            .iter()
            .flat_map(|g| g.card_ids.iter())
            .all(|id| seen.insert(id.clone()))
    }

    #[test]
    fn test_insert_card_is_idempotent() {
        let mut board = BoardState::new();
        let card = Card::new("Pairing worked", Category::Good, "alice");
        assert!(board.insert_card(card.clone()));
        assert!(!board.insert_card(card));
        assert_eq!(board.cards.len(), 1);
    }

    #[test]
    fn test_remove_missing_card_is_noop() {
        let mut board = BoardState::new();
        assert!(!board.remove_card("card-missing"));
    }

    #[test]
    fn test_groups_stay_disjoint() {
        let mut board = BoardState::new();
        board.insert_group(group_with("g1", &["c1", "c2"]));
        board.insert_group(group_with("g2", &["c2", "c3", "c3"]));
        assert!(no_card_in_two_groups(&board));
        assert_eq!(board.group("g1").unwrap().card_ids, vec!["c1"]);
        assert_eq!(board.group("g2").unwrap().card_ids, vec!["c2", "c3"]);

        board.replace_group(group_with("g1", &["c1", "c3"]));
        assert!(no_card_in_two_groups(&board));
        assert_eq!(board.group("g2").unwrap().card_ids, vec!["c2"]);
        assert_eq!(board.group_containing("c3").unwrap().id, "g1");
    }

    #[test]
    fn test_disjoint_under_event_sequence() {
        let mut board = BoardState::new();
        let steps = [
            ("create", group_with("a", &["1", "2", "3"])),
            ("create", group_with("b", &["3", "4"])),
            ("update", group_with("a", &["4", "5", "1"])),
            ("create", group_with("c", &["1", "2", "5"])),
            ("update", group_with("b", &["5", "5", "2"])),
            ("update", group_with("missing", &["1"])),
        ];
        for (kind, group) in steps {
            if kind == "create" {
                board.insert_group(group);
            } else {
                board.replace_group(group);
            }
            assert!(no_card_in_two_groups(&board));
        }
        assert!(board.group("missing").is_none());
    }

    #[test]
    fn test_replace_unknown_group_ignored() {
        let mut board = BoardState::new();
        assert!(!board.replace_group(group_with("g9", &["c1"])));
        assert!(board.groups.is_empty());
    }

    #[test]
    fn test_votes_append_without_dedup() {
        let mut board = BoardState::new();
        board.record_vote("g1", "alice");
        board.record_vote("g1", "alice");
        board.record_vote("g1", "bob");
        assert_eq!(board.vote_count("g1"), 3);
        assert_eq!(board.votes_by("g1", "alice"), 2);
        assert_eq!(board.vote_count("g2"), 0);
    }

    #[test]
    fn test_ranked_groups_skip_empty_and_sort() {
        let mut board = BoardState::new();
        board.insert_group(group_with("g1", &["c1"]));
        board.insert_group(group_with("g2", &["c2"]));
        board.insert_group(group_with("g3", &[]));
        board.record_vote("g2", "alice");
        board.record_vote("g3", "alice");

        let ranked: Vec<(&str, usize)> = board
            .ranked_groups()
            .into_iter()
            .map(|(g, v)| (g.id.as_str(), v))
            .collect();
        assert_eq!(ranked, vec![("g2", 1), ("g1", 0)]);
    }

    #[test]
    fn test_roster_merge_rules() {
        let mut board = BoardState::new();
        let alice = Participant::new("alice", "p1".into(), Role::Participant);

        assert!(board.add_participant(alice.clone()));
        assert!(!board.add_participant(Participant::new("alice", "p1".into(), Role::Guest)));
        assert_eq!(board.participant(&"p1".into()).unwrap().role, Role::Participant);

        assert!(board.merge_participant(Participant::new("alice", "p1".into(), Role::Moderator)));
        assert!(!board.merge_participant(Participant::new("alice", "p1".into(), Role::Moderator)));
        assert_eq!(board.participant(&"p1".into()).unwrap().role, Role::Moderator);
        assert_eq!(board.participants.len(), 1);
    }

    #[test]
    fn test_normalize_splits_shared_cards() {
        let mut board = BoardState::new();
        board.groups = vec![
            group_with("g1", &["c1", "c2"]),
            group_with("g2", &["c1", "c3"]),
            group_with("g1", &["c4"]),
        ];
        board.participants = vec![
            Participant::new("alice", "p1".into(), Role::Moderator),
            Participant::new("bob", "p2".into(), Role::Participant),
            Participant::new("alice2", "p1".into(), Role::Guest),
        ];

        assert!(board.normalize());
        assert!(no_card_in_two_groups(&board));
        assert_eq!(board.groups.len(), 2);
        assert_eq!(board.group("g1").unwrap().card_ids, vec!["c1", "c2"]);
        assert_eq!(board.group("g2").unwrap().card_ids, vec!["c3"]);
        assert_eq!(board.participants.len(), 2);
        assert_eq!(board.participants[0].display_name, "alice2");
        assert_eq!(board.participants[0].role, Role::Guest);

        // Later group edits no longer trip the guardrails
        board.insert_group(group_with("g3", &["c1"]));
        assert_eq!(board.group_containing("c1").unwrap().id, "g3");
        assert!(!board.normalize());
    }

    #[test]
    fn test_reset_keeps_roster() {
        let mut board = BoardState::new();
        board.add_participant(Participant::new("alice", "p1".into(), Role::Moderator));
        board.insert_card(Card::new("x", Category::Good, "alice"));
        board.set_phase(Phase::Vote);
        board.reset_session();

        assert!(board.cards.is_empty());
        assert_eq!(board.current_phase, Phase::Cards);
        assert_eq!(board.participants.len(), 1);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let board: BoardState = serde_json::from_str(r#"{"cards":[],"extra":42}"#).unwrap();
        assert_eq!(board, BoardState::new());
    }
}
