//! Action item model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::generate_id;

pub const UNASSIGNED_OWNER: &str = "Unassigned";

fn default_owner() -> String {
    UNASSIGNED_OWNER.to_string()
}

/// A follow-up task recorded during the retrospective
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub id: String,
    pub text: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl ActionItem {
    pub fn new(text: &str, owner: Option<&str>) -> Self {
        let owner = owner
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .unwrap_or_else(default_owner);
        Self {
            id: generate_id("action"),
            text: text.trim().to_string(),
            owner,
            completed: false,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_defaults_to_unassigned() {
        assert_eq!(ActionItem::new("Fix CI", None).owner, UNASSIGNED_OWNER);
        assert_eq!(ActionItem::new("Fix CI", Some(" ")).owner, UNASSIGNED_OWNER);
        assert_eq!(ActionItem::new("Fix CI", Some("dana")).owner, "dana");
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let action: ActionItem =
            serde_json::from_str(r#"{"id":"action-1","text":"Write docs"}"#).unwrap();
        assert_eq!(action.owner, UNASSIGNED_OWNER);
        assert!(!action.completed);
    }
}
