//! Card group model

use serde::{Deserialize, Serialize};

use super::generate_id;

pub const DEFAULT_GROUP_NAME: &str = "New Group";

/// A named cluster of cards. `card_ids` behaves as an ordered set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub card_ids: Vec<String>,
}

impl Group {
    pub fn new(name: Option<&str>) -> Self {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_GROUP_NAME);
        Self {
            id: generate_id("group"),
            name: name.to_string(),
            card_ids: Vec::new(),
        }
    }

    pub fn contains(&self, card_id: &str) -> bool {
        self.card_ids.iter().any(|id| id == card_id)
    }

    /// Drop duplicate card ids, keeping first occurrence order
    pub fn dedup_cards(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.card_ids.retain(|id| seen.insert(id.clone()));
    }
}
