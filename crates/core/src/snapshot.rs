//! Session snapshots and the board export file
//!
//! A snapshot is an immutable copy of the board plus metadata. Card text
//! stays obfuscated inside a snapshot; the export file carries clear text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::board::BoardState;
use crate::cipher;
use crate::error::{Error, Result};
use crate::models::{PeerAddress, Phase};

/// Top-level fields an import file must carry
const REQUIRED_IMPORT_FIELDS: &[&str] = &["id", "createdAt", "savedBy", "state"];

/// Counts shown when listing snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub cards_count: usize,
    #[serde(default)]
    pub groups_count: usize,
    #[serde(default)]
    pub actions_count: usize,
    #[serde(default)]
    pub participants_count: usize,
}

impl SnapshotSummary {
    pub fn of(state: &BoardState) -> Self {
        Self {
            phase: state.current_phase,
            cards_count: state.cards.len(),
            groups_count: state.groups.len(),
            actions_count: state.action_items.len(),
            participants_count: state.participants.len(),
        }
    }
}

/// A point-in-time copy of the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub saved_by: String,
    /// Taken automatically rather than on request
    #[serde(default)]
    pub is_official: bool,
    #[serde(default)]
    pub host_peer_address: Option<PeerAddress>,
    #[serde(default)]
    pub summary: SnapshotSummary,
    pub state: BoardState,
}

impl Snapshot {
    /// Capture the current board
    pub fn capture(
        state: &BoardState,
        saved_by: impl Into<String>,
        is_official: bool,
        host_peer_address: Option<PeerAddress>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            saved_by: saved_by.into(),
            is_official,
            host_peer_address,
            summary: SnapshotSummary::of(state),
            state: state.clone(),
        }
    }

    /// Serialize as an export file with clear-text cards
    pub fn to_export_json(&self) -> Result<String> {
        let mut exported = self.clone();
        exported.state.map_card_text(cipher::deobfuscate);
        Ok(serde_json::to_string_pretty(&exported)?)
    }

    /// Parse an export file, validating it before anything uses it
    ///
    /// Card text is obfuscated again, inconsistent group or roster entries
    /// are repaired and the summary recomputed.
    pub fn from_export_json(contents: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(contents)
            .map_err(|e| Error::InvalidImport(format!("not valid JSON: {}", e)))?;

        let object = value
            .as_object()
            .ok_or_else(|| Error::InvalidImport("top level must be an object".into()))?;
        let missing: Vec<&str> = REQUIRED_IMPORT_FIELDS
            .iter()
            .copied()
            .filter(|field| !object.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidImport(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let mut snapshot: Snapshot = serde_json::from_value(value)
            .map_err(|e| Error::InvalidImport(e.to_string()))?;
        snapshot.state.map_card_text(cipher::obfuscate);
        snapshot.state.normalize();
        snapshot.summary = SnapshotSummary::of(&snapshot.state);
        Ok(snapshot)
    }
}
