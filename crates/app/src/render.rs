//! Plain text rendering of the board
//!
//! Card numbers are positions in the board's card list, so the same
//! number works whether the card is shown in its column or its group.

use std::fmt::Write;

use retro_core::{BoardState, Category, Snapshot};
use retro_net::{BoardView, NodeEvent, Refresh};

pub fn board(view: &BoardView) -> String {
    let board = &view.board;
    let viewer = view.me.display_name.as_str();
    let phase = board.current_phase;
    let mut out = String::new();

    let _ = writeln!(out, "== {} ==", phase.title());
    let _ = writeln!(
        out,
        "You: {} ({}{})  Votes left: {}/{}  Connected peers: {}  Auto-save: {}",
        viewer,
        view.me.role,
        if view.is_host { ", host" } else { "" },
        view.votes_remaining,
        view.vote_budget,
        view.open_channels,
        if view.settings.auto_snapshots_allowed() {
            "on"
        } else {
            "off"
        },
    );

    let _ = writeln!(out, "\nParticipants");
    for (i, p) in board.participants.iter().enumerate() {
        let _ = writeln!(out, "  {}. {} ({})", i + 1, p.display_name, p.role);
    }

    for category in Category::all() {
        let _ = writeln!(out, "\n{}", category.heading());
        let mut any = false;
        for (i, card) in ungrouped(board, *category) {
            any = true;
            let _ = writeln!(
                out,
                "  {}. {}  ({})",
                i + 1,
                card.visible_text(viewer, phase),
                card.author_user_name
            );
        }
        if !any {
            let _ = writeln!(out, "  (none)");
        }
    }

    if !board.groups.is_empty() {
        let _ = writeln!(out, "\nGroups");
        for (i, group) in board.groups.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} ({} votes)",
                i + 1,
                group.name,
                board.vote_count(&group.id)
            );
            for card_id in &group.card_ids {
                if let Some((n, card)) = position(board, card_id) {
                    let _ = writeln!(out, "     {}. {}", n + 1, card.visible_text(viewer, phase));
                }
            }
        }
    }

    if !board.action_items.is_empty() {
        let _ = writeln!(out, "\nAction items");
        for (i, action) in board.action_items.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. [{}] {} (Owner: {})",
                i + 1,
                if action.completed { "x" } else { " " },
                action.text,
                action.owner
            );
        }
    }

    out
}

fn ungrouped(
    board: &BoardState,
    category: Category,
) -> impl Iterator<Item = (usize, &retro_core::Card)> {
    board
        .cards
        .iter()
        .enumerate()
        .filter(move |(_, card)| {
            card.category == category && board.group_containing(&card.id).is_none()
        })
}

fn position<'a>(board: &'a BoardState, card_id: &str) -> Option<(usize, &'a retro_core::Card)> {
    board.cards.iter().enumerate().find(|(_, c)| c.id == card_id)
}

/// Snapshot listing, numbered for `restore`
pub fn snapshots(snapshots: &[Snapshot]) -> String {
    if snapshots.is_empty() {
        return "No snapshots saved.".to_string();
    }
    let mut out = String::new();
    for (i, s) in snapshots.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {}  {}  by {}  phase {}, {} cards, {} groups, {} actions  [{}]",
            i + 1,
            s.created_at.format("%Y-%m-%d %H:%M:%S"),
            if s.is_official { "auto  " } else { "manual" },
            s.saved_by,
            s.summary.phase.number(),
            s.summary.cards_count,
            s.summary.groups_count,
            s.summary.actions_count,
            s.id
        );
    }
    out
}

/// One-line notice for an event, if it deserves one
pub fn event(event: &NodeEvent) -> Option<String> {
    match event {
        NodeEvent::Refresh(Refresh::Phase) => Some("Phase changed.".to_string()),
        NodeEvent::Refresh(Refresh::Roster) => Some("Participants updated.".to_string()),
        NodeEvent::Refresh(Refresh::Role) => Some("Your role changed.".to_string()),
        NodeEvent::Refresh(Refresh::All) => Some("Board replaced.".to_string()),
        NodeEvent::Refresh(_) => None,
        NodeEvent::ChannelOpened => Some("Peer connected.".to_string()),
        NodeEvent::ChannelClosed { open_channels } => Some(format!(
            "Peer disconnected ({} still connected).",
            open_channels
        )),
        NodeEvent::AutoSaved(_) => None,
        NodeEvent::StorageError(msg) => Some(format!("Auto-save failed: {}", msg)),
    }
}
