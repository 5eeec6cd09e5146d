//! Runs parsed commands against a live node

use std::path::PathBuf;

use chrono::Local;
use retro_core::summary;
use retro_net::{JoinLink, LocalAction, NodeEvent, NodeHandle};
use tracing::info;

use crate::command::{Command, HELP};
use crate::error::Result;
use crate::render;

/// What the prompt loop does after a command
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Quit,
}

impl Reply {
    fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }
}

pub struct Session {
    node: NodeHandle,
    join_link: JoinLink,
    /// Default directory for summaries
    work_dir: PathBuf,
}

impl Session {
    pub fn new(node: NodeHandle, join_link: JoinLink, work_dir: PathBuf) -> Self {
        Self {
            node,
            join_link,
            work_dir,
        }
    }

    pub async fn next_event(&mut self) -> Option<NodeEvent> {
        self.node.next_event().await
    }

    pub async fn execute(&self, command: Command) -> Result<Reply> {
        let node = &self.node;
        let reply = match command {
            Command::Card { category, text } => {
                node.apply(LocalAction::AddCard { text, category }).await?;
                Reply::text(format!("Card added to '{}'.", category.heading()))
            }
            Command::Delete(card) => {
                let card_id = card.card_id(&node.view().await?.board)?;
                node.apply(LocalAction::DeleteCard { card_id }).await?;
                Reply::text("Card deleted.")
            }
            Command::GroupNew(name) => {
                node.apply(LocalAction::CreateGroup {
                    name,
                    card_ids: Vec::new(),
                })
                .await?;
                Reply::text("Group created.")
            }
            Command::GroupRename { group, name } => {
                let group_id = group.group_id(&node.view().await?.board)?;
                node.apply(LocalAction::RenameGroup { group_id, name })
                    .await?;
                Reply::text("Group renamed.")
            }
            Command::GroupAdd { group, card } => {
                let board = node.view().await?.board;
                let group_id = group.group_id(&board)?;
                let card_id = card.card_id(&board)?;
                node.apply(LocalAction::MoveCard { card_id, group_id })
                    .await?;
                Reply::text("Card moved.")
            }
            Command::GroupRemove(card) => {
                let card_id = card.card_id(&node.view().await?.board)?;
                node.apply(LocalAction::UngroupCard { card_id }).await?;
                Reply::text("Card ungrouped.")
            }
            Command::Vote(group) => {
                let group_id = group.group_id(&node.view().await?.board)?;
                node.apply(LocalAction::CastVote { group_id }).await?;
                let view = node.view().await?;
                Reply::text(format!(
                    "Vote cast. {} of {} left.",
                    view.votes_remaining, view.vote_budget
                ))
            }
            Command::Action { text, owner } => {
                node.apply(LocalAction::AddAction { text, owner }).await?;
                Reply::text("Action item added.")
            }
            Command::Toggle(action) => {
                let action_id = action.action_id(&node.view().await?.board)?;
                node.apply(LocalAction::ToggleAction { action_id })
                    .await?;
                Reply::text("Action item updated.")
            }
            Command::Phase(phase) => {
                node.apply(LocalAction::ChangePhase(phase)).await?;
                Reply::text(format!("Now in {}.", phase.title()))
            }
            Command::Role { peer, role } => {
                let peer_address = peer.peer_address(&node.view().await?.board)?;
                node.apply(LocalAction::ChangeRole { peer_address, role })
                    .await?;
                Reply::text(format!("Role set to {}.", role))
            }
            Command::Reset => {
                node.apply(LocalAction::NewSession).await?;
                Reply::text("New session started.")
            }
            Command::Save => {
                let snapshot = node.save_snapshot().await?;
                Reply::text(format!("Snapshot saved ({}).", snapshot.id))
            }
            Command::Snapshots => Reply::Text(render::snapshots(&node.list_snapshots().await?)),
            Command::Restore(reference) => {
                let id = reference.snapshot_id(&node.list_snapshots().await?)?;
                node.restore(id).await?;
                Reply::text("Snapshot restored.")
            }
            Command::Export(path) => {
                let contents = node.export().await?;
                tokio::fs::write(&path, contents).await?;
                info!(path = %path.display(), "Board exported");
                Reply::text(format!("Board exported to {}.", path.display()))
            }
            Command::Import(path) => {
                let contents = tokio::fs::read_to_string(&path).await?;
                node.import(contents).await?;
                info!(path = %path.display(), "Board imported");
                Reply::text("Board imported.")
            }
            Command::Summary(path) => {
                let today = Local::now().date_naive();
                let board = node.view().await?.board;
                let path = path
                    .unwrap_or_else(|| self.work_dir.join(summary::summary_file_name(today)));
                tokio::fs::write(&path, summary::render_markdown(&board, today)).await?;
                Reply::text(format!("Summary written to {}.", path.display()))
            }
            Command::Persist(on) => {
                let mut settings = node.view().await?.settings;
                settings.official_enabled = on;
                if on {
                    settings.grant_consent();
                } else {
                    settings.revoke_consent();
                }
                node.update_settings(settings).await?;
                Reply::text(if on {
                    "Automatic snapshots on."
                } else {
                    "Automatic snapshots off."
                })
            }
            Command::Show => Reply::Text(render::board(&node.view().await?)),
            Command::Link => Reply::Text(self.join_link.to_url()),
            Command::Help => Reply::text(HELP),
            Command::Quit => Reply::Quit,
        };
        Ok(reply)
    }

    pub async fn shutdown(self) {
        self.node.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::parse;
    use crate::error::Error;
    use retro_core::{MemoryStore, PeerAddress, PersistenceSettings, Phase, Role};
    use retro_net::{Node, SyncEngine, Transport};
    use std::time::Duration;

    fn session(engine: SyncEngine, dir: &std::path::Path) -> Session {
        let link = JoinLink::new("retro://join", engine.session_id());
        let node = Node::spawn(
            engine,
            Transport::new(),
            None,
            Box::new(MemoryStore::new()),
            PersistenceSettings::default(),
            Duration::from_millis(50),
        );
        Session::new(node, link, dir.to_path_buf())
    }

    fn host(dir: &std::path::Path) -> Session {
        session(
            SyncEngine::host("alice", PeerAddress::new("127.0.0.1:7341"), 3),
            dir,
        )
    }

    async fn run(session: &Session, line: &str) -> Result<Reply> {
        let command = parse(line)?.expect("blank line");
        session.execute(command).await
    }

    #[tokio::test]
    async fn test_board_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let session = host(dir.path());

        run(&session, "card good Release went smoothly").await.unwrap();
        run(&session, "card bad Too many meetings").await.unwrap();
        run(&session, "group new Meetings").await.unwrap();
        run(&session, "group add 1 2").await.unwrap();
        run(&session, "vote 1").await.unwrap();
        run(&session, "action Cancel the weekly sync @bob").await.unwrap();
        run(&session, "toggle 1").await.unwrap();

        let view = session.node.view().await.unwrap();
        let group = &view.board.groups[0];
        assert_eq!(group.name, "Meetings");
        assert_eq!(group.card_ids, vec![view.board.cards[1].id.clone()]);
        assert_eq!(view.board.vote_count(&group.id), 1);
        assert_eq!(view.board.action_items[0].owner, "bob");
        assert!(view.board.action_items[0].completed);

        match run(&session, "show").await.unwrap() {
            Reply::Text(text) => assert!(text.contains("[x] Cancel the weekly sync")),
            other => panic!("unexpected reply: {other:?}"),
        }
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_reference_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let session = host(dir.path());

        let result = run(&session, "vote 4").await;
        assert!(matches!(result, Err(Error::Usage(_))));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_guest_cannot_add_cards() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SyncEngine::join(
            "gus",
            PeerAddress::new("peer-gus"),
            Role::Guest,
            "127.0.0.1:7341",
            3,
        );
        let session = session(engine, dir.path());

        let result = run(&session, "card good hello").await;
        assert!(matches!(result, Err(Error::Net(_))));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_summary_written_to_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let session = host(dir.path());
        run(&session, "card improve Automate deploys").await.unwrap();
        run(&session, "phase 5").await.unwrap();

        run(&session, "summary").await.unwrap();
        let today = Local::now().date_naive();
        let written =
            std::fs::read_to_string(dir.path().join(summary::summary_file_name(today))).unwrap();
        assert!(written.starts_with("# Retro Summary"));
        assert!(written.contains("- alice"));

        let view = session.node.view().await.unwrap();
        assert_eq!(view.board.current_phase, Phase::Actions);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_export_import_and_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let session = host(dir.path());
        let export_path = dir.path().join("board.json");

        run(&session, "card good Kept the scope small").await.unwrap();
        run(&session, &format!("export {}", export_path.display()))
            .await
            .unwrap();
        run(&session, "save").await.unwrap();
        run(&session, "reset").await.unwrap();
        assert!(session.node.view().await.unwrap().board.cards.is_empty());

        run(&session, &format!("import {}", export_path.display()))
            .await
            .unwrap();
        assert_eq!(session.node.view().await.unwrap().board.cards.len(), 1);

        run(&session, "reset").await.unwrap();
        match run(&session, "snapshots").await.unwrap() {
            Reply::Text(text) => assert!(text.contains("1 cards")),
            other => panic!("unexpected reply: {other:?}"),
        }
        run(&session, "restore 1").await.unwrap();
        let view = session.node.view().await.unwrap();
        assert_eq!(view.board.cards[0].clear_text(), "Kept the scope small");
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_persist_toggles_consent() {
        let dir = tempfile::tempdir().unwrap();
        let session = host(dir.path());

        run(&session, "persist on").await.unwrap();
        let settings = session.node.view().await.unwrap().settings;
        assert!(settings.auto_snapshots_allowed());

        run(&session, "persist off").await.unwrap();
        let settings = session.node.view().await.unwrap().settings;
        assert!(!settings.auto_snapshots_allowed());
        assert!(settings.consent.timestamp.is_some());
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_link_and_quit() {
        let dir = tempfile::tempdir().unwrap();
        let session = host(dir.path());

        assert_eq!(
            run(&session, "link").await.unwrap(),
            Reply::Text("retro://join?session=127.0.0.1%3A7341".into())
        );
        assert_eq!(run(&session, "quit").await.unwrap(), Reply::Quit);
        session.shutdown().await;
    }
}
