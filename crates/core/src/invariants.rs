//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use std::collections::HashSet;

use crate::board::BoardState;

/// Validate that a board's state is internally consistent
pub fn assert_board_invariants(board: &BoardState) {
    // A card belongs to at most one group
    let mut seen = HashSet::new();
    for group in &board.groups {
        for card_id in &group.card_ids {
            debug_assert!(
                seen.insert(card_id.as_str()),
                "Card {} appears in more than one group (second: {})",
                card_id,
                group.id
            );
        }
    }

    // Group ids are unique
    let mut group_ids = HashSet::new();
    for group in &board.groups {
        debug_assert!(
            group_ids.insert(group.id.as_str()),
            "Duplicate group id {}",
            group.id
        );
    }

    // Roster is keyed by peer address
    let mut addresses = HashSet::new();
    for participant in &board.participants {
        debug_assert!(
            addresses.insert(&participant.peer_address),
            "Duplicate roster entry for {}",
            participant.peer_address
        );
    }
}

/// Validate that the local vote counter never exceeds its budget
pub fn assert_vote_budget(remaining: u32, budget: u32) {
    debug_assert!(
        remaining <= budget,
        "Remaining votes {} exceed budget {}",
        remaining,
        budget
    );
}
