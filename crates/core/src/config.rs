//! Node configuration
//!
//! Loaded from a TOML file. Every field has a default, so a missing file
//! or a partial one both work.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::Role;
use crate::settings::PersistenceSettings;

pub const DEFAULT_VOTE_BUDGET: u32 = 3;
pub const DEFAULT_LISTEN_PORT: u16 = 7341;
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 1500;
pub const DEFAULT_JOIN_BASE_URL: &str = "retro://join";

fn default_display_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "anonymous".to_string())
}

fn default_vote_budget() -> u32 {
    DEFAULT_VOTE_BUDGET
}

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_autosave_debounce_ms() -> u64 {
    DEFAULT_AUTOSAVE_DEBOUNCE_MS
}

fn default_join_base_url() -> String {
    DEFAULT_JOIN_BASE_URL.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetroConfig {
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Role announced when joining someone else's session
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_vote_budget")]
    pub vote_budget: u32,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_autosave_debounce_ms")]
    pub autosave_debounce_ms: u64,
    #[serde(default = "default_join_base_url")]
    pub join_base_url: String,
    /// Byte limit for stored snapshots, unlimited when unset
    #[serde(default)]
    pub snapshot_quota_bytes: Option<u64>,
    #[serde(default)]
    pub persistence: PersistenceSettings,
}

impl Default for RetroConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            role: Role::default(),
            vote_budget: DEFAULT_VOTE_BUDGET,
            listen_port: DEFAULT_LISTEN_PORT,
            autosave_debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
            join_base_url: default_join_base_url(),
            snapshot_quota_bytes: None,
            persistence: PersistenceSettings::default(),
        }
    }
}

impl RetroConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: RetroConfig = toml::from_str(content)?;
        config.persistence.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
