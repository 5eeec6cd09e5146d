//! Feedback card model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{generate_id, Phase};
use crate::cipher;
use crate::error::Error;

/// Card column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Good,
    Bad,
    Improve,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Good => "good",
            Category::Bad => "bad",
            Category::Improve => "improve",
        }
    }

    pub fn heading(&self) -> &'static str {
        match self {
            Category::Good => "What went well",
            Category::Bad => "What didn't go well",
            Category::Improve => "What to improve",
        }
    }

    pub fn all() -> &'static [Category] {
        &[Category::Good, Category::Bad, Category::Improve]
    }
}

impl std::str::FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::all()
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidOperation(format!("Unknown category '{}'", s)))
    }
}

/// A feedback card. `text` is stored obfuscated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub text: String,
    pub category: Category,
    pub author_user_name: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl Card {
    /// Create a card from clear text; the text is obfuscated on the way in
    pub fn new(clear_text: &str, category: Category, author: impl Into<String>) -> Self {
        Self {
            id: generate_id("card"),
            text: cipher::obfuscate(clear_text),
            category,
            author_user_name: author.into(),
            created_at: Utc::now(),
        }
    }

    pub fn clear_text(&self) -> String {
        cipher::deobfuscate(&self.text)
    }

    /// Text as a given viewer may see it
    ///
    /// While cards are being written only the author sees clear text.
    pub fn visible_text(&self, viewer: &str, phase: Phase) -> String {
        if phase == Phase::Cards && self.author_user_name != viewer {
            self.text.clone()
        } else {
            self.clear_text()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_text_obfuscated_at_rest() {
        let card = Card::new("Great sprint", Category::Good, "alice");
        assert_ne!(card.text, "Great sprint");
        assert_eq!(card.clear_text(), "Great sprint");
        assert!(card.id.starts_with("card-"));
    }

    #[test]
    fn test_visible_text_policy() {
        let card = Card::new("Too many meetings", Category::Bad, "alice");

        assert_eq!(card.visible_text("alice", Phase::Cards), "Too many meetings");
        assert_eq!(card.visible_text("bob", Phase::Cards), card.text);
        assert_eq!(card.visible_text("bob", Phase::Group), "Too many meetings");
        assert_eq!(card.visible_text("bob", Phase::Actions), "Too many meetings");
    }

    #[test]
    fn test_category_wire_names() {
        assert_eq!(serde_json::to_string(&Category::Improve).unwrap(), "\"improve\"");
        assert_eq!("BAD".parse::<Category>().unwrap(), Category::Bad);
    }
}
