//! Persistence settings record

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::instrument;

use super::parse::{parse_json, OptionalExt};
use crate::error::Result;
use crate::settings::PersistenceSettings;

/// Settings store; holds a single row
pub struct SettingsStore<'a> {
    conn: &'a Connection,
}

impl<'a> SettingsStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    #[instrument(skip(self, settings))]
    pub fn save(&self, settings: &PersistenceSettings) -> Result<()> {
        settings.validate()?;
        self.conn.execute(
            "INSERT OR REPLACE INTO persistence_settings (id, record, updated_at)
             VALUES (1, ?1, ?2)",
            params![serde_json::to_string(settings)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn load(&self) -> Result<Option<PersistenceSettings>> {
        let settings = self
            .conn
            .query_row(
                "SELECT record FROM persistence_settings WHERE id = 1",
                [],
                |row| {
                    let record: String = row.get(0)?;
                    parse_json(&record)
                },
            )
            .optional()?;
        Ok(settings)
    }
}
