//! Line command parser
//!
//! One line of terminal input becomes one [`Command`]. References to
//! cards, groups, action items and participants are kept unresolved until
//! the command runs against the current board.

use std::fmt;
use std::path::PathBuf;

use retro_core::{BoardState, Category, PeerAddress, Phase, Role, Snapshot};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A 1-based list position or an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Position(usize),
    Id(String),
}

impl Reference {
    fn parse(token: &str) -> Self {
        match token.parse::<usize>() {
            Ok(n) if n > 0 => Reference::Position(n),
            _ => Reference::Id(token.to_string()),
        }
    }

    fn pick<'a, T>(
        &self,
        items: &'a [T],
        id_of: impl Fn(&T) -> &str,
        kind: &str,
    ) -> Result<&'a T> {
        match self {
            Reference::Position(n) => n.checked_sub(1).and_then(|i| items.get(i)),
            Reference::Id(id) => items.iter().find(|item| id_of(item) == id),
        }
        .ok_or_else(|| Error::usage(format!("No {} {}", kind, self)))
    }

    pub fn card_id(&self, board: &BoardState) -> Result<String> {
        self.pick(&board.cards, |c| c.id.as_str(), "card")
            .map(|c| c.id.clone())
    }

    pub fn group_id(&self, board: &BoardState) -> Result<String> {
        self.pick(&board.groups, |g| g.id.as_str(), "group")
            .map(|g| g.id.clone())
    }

    pub fn action_id(&self, board: &BoardState) -> Result<String> {
        self.pick(&board.action_items, |a| a.id.as_str(), "action item")
            .map(|a| a.id.clone())
    }

    /// Participants can also be named by display name
    pub fn peer_address(&self, board: &BoardState) -> Result<PeerAddress> {
        if let Reference::Id(name) = self {
            if let Some(p) = board.participants.iter().find(|p| p.display_name == *name) {
                return Ok(p.peer_address.clone());
            }
        }
        self.pick(
            &board.participants,
            |p| p.peer_address.as_str(),
            "participant",
        )
        .map(|p| p.peer_address.clone())
    }

    /// Resolve against a snapshot listing (newest first)
    pub fn snapshot_id(&self, snapshots: &[Snapshot]) -> Result<Uuid> {
        match self {
            Reference::Position(_) => self
                .pick(snapshots, |_| "", "snapshot")
                .map(|s| s.id),
            Reference::Id(id) => Uuid::parse_str(id)
                .map_err(|_| Error::usage(format!("'{}' is not a snapshot id", id))),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Position(n) => write!(f, "#{}", n),
            Reference::Id(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Card { category: Category, text: String },
    Delete(Reference),
    GroupNew(Option<String>),
    GroupRename { group: Reference, name: String },
    GroupAdd { group: Reference, card: Reference },
    GroupRemove(Reference),
    Vote(Reference),
    Action { text: String, owner: Option<String> },
    Toggle(Reference),
    Phase(Phase),
    Role { peer: Reference, role: Role },
    Reset,
    Save,
    Snapshots,
    Restore(Reference),
    Export(PathBuf),
    Import(PathBuf),
    Summary(Option<PathBuf>),
    Persist(bool),
    Show,
    Link,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  card <good|bad|improve> <text>   add a card
  delete <card>                    delete one of your cards
  group new [name]                 create a group
  group rename <group> <name>      rename a group
  group add <group> <card>         move a card into a group
  group remove <card>              take a card out of its group
  vote <group>                     vote for a group
  action <text> [@owner]           add an action item
  toggle <action>                  mark an action item done or open
  phase <1-5>                      change the phase
  role <participant> <role>        change a participant's role
  reset                            start a new session
  save                             save a snapshot
  snapshots                        list saved snapshots
  restore <snapshot>               restore a snapshot
  export <path>                    export the board to a file
  import <path>                    import a board file
  summary [path]                   write the markdown summary
  persist <on|off>                 automatic snapshots
  show                             show the board
  link                             show the join link
  help                             show this help
  quit                             leave the session

Cards, groups and action items are referenced by their number in `show`
or by id.";

/// Parse one input line; blank lines yield `None`
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = split_word(line);

    let command = match word.to_ascii_lowercase().as_str() {
        "card" => {
            let (category, text) = split_word(rest);
            if category.is_empty() {
                return Err(Error::usage("Usage: card <good|bad|improve> <text>"));
            }
            let category = category.parse::<Category>()?;
            Command::Card {
                category,
                text: required(text, "Usage: card <good|bad|improve> <text>")?,
            }
        }
        "delete" => Command::Delete(reference(rest, "Usage: delete <card>")?),
        "group" => parse_group(rest)?,
        "vote" => Command::Vote(reference(rest, "Usage: vote <group>")?),
        "action" => {
            let (text, owner) = split_owner(rest);
            Command::Action {
                text: required(text, "Usage: action <text> [@owner]")?,
                owner,
            }
        }
        "toggle" => Command::Toggle(reference(rest, "Usage: toggle <action>")?),
        "phase" => {
            let number = rest
                .parse::<u8>()
                .map_err(|_| Error::usage("Usage: phase <1-5>"))?;
            Command::Phase(Phase::try_from(number)?)
        }
        "role" => {
            let (peer, role) = split_word(rest);
            if peer.is_empty() || role.is_empty() {
                return Err(Error::usage("Usage: role <participant> <role>"));
            }
            Command::Role {
                peer: Reference::parse(peer),
                role: role.parse::<Role>()?,
            }
        }
        "reset" => Command::Reset,
        "save" => Command::Save,
        "snapshots" => Command::Snapshots,
        "restore" => Command::Restore(reference(rest, "Usage: restore <snapshot>")?),
        "export" => Command::Export(required(rest, "Usage: export <path>")?.into()),
        "import" => Command::Import(required(rest, "Usage: import <path>")?.into()),
        "summary" => Command::Summary((!rest.is_empty()).then(|| PathBuf::from(rest))),
        "persist" => match rest.to_ascii_lowercase().as_str() {
            "on" => Command::Persist(true),
            "off" => Command::Persist(false),
            _ => return Err(Error::usage("Usage: persist <on|off>")),
        },
        "show" => Command::Show,
        "link" => Command::Link,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => {
            return Err(Error::usage(format!(
                "Unknown command '{}'. Type `help` for a list.",
                other
            )))
        }
    };
    Ok(Some(command))
}

fn parse_group(rest: &str) -> Result<Command> {
    let (sub, args) = split_word(rest);
    match sub.to_ascii_lowercase().as_str() {
        "new" => Ok(Command::GroupNew((!args.is_empty()).then(|| args.to_string()))),
        "rename" => {
            let (group, name) = split_word(args);
            if group.is_empty() {
                return Err(Error::usage("Usage: group rename <group> <name>"));
            }
            Ok(Command::GroupRename {
                group: Reference::parse(group),
                name: required(name, "Usage: group rename <group> <name>")?,
            })
        }
        "add" => {
            let (group, card) = split_word(args);
            if group.is_empty() || card.is_empty() {
                return Err(Error::usage("Usage: group add <group> <card>"));
            }
            Ok(Command::GroupAdd {
                group: Reference::parse(group),
                card: Reference::parse(card),
            })
        }
        "remove" => Ok(Command::GroupRemove(reference(
            args,
            "Usage: group remove <card>",
        )?)),
        _ => Err(Error::usage(
            "Usage: group <new|rename|add|remove> ...",
        )),
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

/// Trailing `@owner` on an action item
fn split_owner(s: &str) -> (&str, Option<String>) {
    if let Some((text, owner)) = s.rsplit_once(" @") {
        let owner = owner.trim();
        if !owner.is_empty() {
            return (text.trim(), Some(owner.to_string()));
        }
    }
    (s.trim(), None)
}

fn required(s: &str, usage: &str) -> Result<String> {
    if s.trim().is_empty() {
        Err(Error::usage(usage))
    } else {
        Ok(s.trim().to_string())
    }
}

fn reference(s: &str, usage: &str) -> Result<Reference> {
    let (token, _) = split_word(s);
    if token.is_empty() {
        Err(Error::usage(usage))
    } else {
        Ok(Reference::parse(token))
    }
}
