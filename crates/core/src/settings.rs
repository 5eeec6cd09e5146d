//! Persistence metadata
//!
//! Decides whether automatic snapshots may run at all and where they go.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MIN_RETENTION_DAYS: u16 = 1;
pub const MAX_RETENTION_DAYS: u16 = 365;
pub const DEFAULT_RETENTION_DAYS: u16 = 30;

fn default_retention_days() -> u16 {
    DEFAULT_RETENTION_DAYS
}

fn default_use_durable_store() -> bool {
    true
}

/// Explicit user consent to automatic persistence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Persistence settings record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceSettings {
    /// Automatic ("official") snapshots are wanted
    #[serde(default)]
    pub official_enabled: bool,
    #[serde(default)]
    pub consent: Consent,
    #[serde(default = "default_retention_days")]
    pub retention_days: u16,
    /// Durable store when set, session-only memory store otherwise
    #[serde(
        default = "default_use_durable_store",
        rename = "useIndexedDB",
        alias = "useDurableStore"
    )]
    pub use_durable_store: bool,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            official_enabled: false,
            consent: Consent::default(),
            retention_days: DEFAULT_RETENTION_DAYS,
            use_durable_store: true,
        }
    }
}

impl PersistenceSettings {
    /// Automatic snapshots need both the feature and recorded consent
    pub fn auto_snapshots_allowed(&self) -> bool {
        self.official_enabled && self.consent.accepted
    }

    pub fn grant_consent(&mut self) {
        self.consent = Consent {
            accepted: true,
            timestamp: Some(Utc::now()),
        };
    }

    pub fn revoke_consent(&mut self) {
        self.consent = Consent {
            accepted: false,
            timestamp: Some(Utc::now()),
        };
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            return Err(Error::InvalidOperation(format!(
                "retentionDays must be between {} and {}, got {}",
                MIN_RETENTION_DAYS, MAX_RETENTION_DAYS, self.retention_days
            )));
        }
        Ok(())
    }
}
