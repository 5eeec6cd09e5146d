//! Markdown retro summary

use std::fmt::Write;

use chrono::NaiveDate;

use crate::board::BoardState;

/// Suggested file name for a summary written on `date`
pub fn summary_file_name(date: NaiveDate) -> String {
    format!("retro-summary-{}.md", date.format("%Y-%m-%d"))
}

/// Render the board as a Markdown document with clear-text cards
pub fn render_markdown(state: &BoardState, date: NaiveDate) -> String {
    let mut out = String::from("# Retro Summary\n\n");
    let _ = writeln!(out, "Date: {}\n", date.format("%Y-%m-%d"));

    out.push_str("## Participants\n");
    for participant in &state.participants {
        let _ = writeln!(out, "- {}", participant.display_name);
    }
    out.push('\n');

    out.push_str("## Discussion Topics (by votes)\n");
    for (index, (group, votes)) in state.ranked_groups().into_iter().enumerate() {
        let _ = writeln!(out, "\n### {}. {} ({} votes)", index + 1, group.name, votes);
        for card in group.card_ids.iter().filter_map(|id| state.card(id)) {
            let _ = writeln!(out, "- {}", card.clear_text());
        }
    }

    out.push_str("\n## Action Items\n");
    if state.action_items.is_empty() {
        out.push_str("No action items recorded.\n");
    } else {
        for (index, action) in state.action_items.iter().enumerate() {
            let status = if action.completed { "[x]" } else { "[ ]" };
            let _ = writeln!(
                out,
                "{}. {} {} (Owner: {})",
                index + 1,
                status,
                action.text,
                action.owner
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionItem, Card, Category, Group, Participant, Role};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
    }

    #[test]
    fn test_empty_board() {
        let md = render_markdown(&BoardState::new(), date());
        assert!(md.starts_with("# Retro Summary\n\nDate: 2024-03-08\n"));
        assert!(md.contains("## Participants\n\n## Discussion Topics (by votes)\n"));
        assert!(md.ends_with("## Action Items\nNo action items recorded.\n"));
    }

    #[test]
    fn test_groups_ranked_by_votes() {
        let mut board = BoardState::new();
        board.add_participant(Participant::new("alice", "p1".into(), Role::Moderator));

        let slow = Card::new("Slow CI", Category::Bad, "alice");
        let pairing = Card::new("Pairing", Category::Good, "bob");
        let mut first = Group::new(Some("Tooling"));
        first.card_ids.push(slow.id.clone());
        let mut second = Group::new(Some("Team"));
        second.card_ids.push(pairing.id.clone());
        let empty = Group::new(Some("Empty"));

        board.record_vote(&second.id, "alice");
        board.record_vote(&second.id, "bob");
        board.record_vote(&first.id, "bob");
        board.insert_card(slow);
        board.insert_card(pairing);
        board.insert_group(first);
        board.insert_group(second);
        board.insert_group(empty);

        let mut done = ActionItem::new("Cache builds", Some("bob"));
        done.completed = true;
        board.insert_action(done);
        board.insert_action(ActionItem::new("Rotate pairs", None));

        let md = render_markdown(&board, date());
        assert!(md.contains("- alice\n"));
        let team = md.find("### 1. Team (2 votes)\n- Pairing\n").unwrap();
        let tooling = md.find("### 2. Tooling (1 votes)\n- Slow CI\n").unwrap();
        assert!(team < tooling);
        assert!(!md.contains("Empty"));
        assert!(md.contains("1. [x] Cache builds (Owner: bob)\n"));
        assert!(md.contains("2. [ ] Rotate pairs (Owner: Unassigned)\n"));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(summary_file_name(date()), "retro-summary-2024-03-08.md");
    }
}
