//! Snapshot table

use chrono::{Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::parse::{parse_json, OptionalExt};
use crate::error::Result;
use crate::snapshot::Snapshot;

/// Serialized form stored in the payload column
pub(crate) fn encode(snapshot: &Snapshot) -> Result<String> {
    Ok(serde_json::to_string(snapshot)?)
}

/// Sortable timestamp for the `created_at` column
fn sort_key(time: chrono::DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Snapshot store
pub struct SnapshotStore<'a> {
    conn: &'a Connection,
}

impl<'a> SnapshotStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace a snapshot with an already encoded payload
    #[instrument(skip(self, snapshot, payload), fields(snapshot_id = %snapshot.id))]
    pub fn upsert(&self, snapshot: &Snapshot, payload: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO snapshots
                (id, created_at, saved_by, is_official, host_peer_address, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.id.to_string(),
                sort_key(snapshot.created_at),
                snapshot.saved_by,
                snapshot.is_official,
                snapshot.host_peer_address.as_ref().map(|a| a.as_str()),
                payload,
            ],
        )?;
        debug!(bytes = payload.len(), "Snapshot stored");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Snapshot>> {
        let snapshot = self
            .conn
            .query_row(
                "SELECT payload FROM snapshots WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    let payload: String = row.get(0)?;
                    parse_json(&payload)
                },
            )
            .optional()?;
        Ok(snapshot)
    }

    /// All snapshots, newest first
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM snapshots ORDER BY created_at DESC")?;
        let snapshots = stmt
            .query_map([], |row| {
                let payload: String = row.get(0)?;
                parse_json(&payload)
            })?
            .collect::<std::result::Result<Vec<Snapshot>, _>>()?;
        Ok(snapshots)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM snapshots WHERE id = ?1", params![id.to_string()])?;
        Ok(rows > 0)
    }

    /// Delete snapshots created more than `retention_days` ago
    #[instrument(skip(self))]
    pub fn prune_older_than(&self, retention_days: u16) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let rows = self.conn.execute(
            "DELETE FROM snapshots WHERE created_at < ?1",
            params![sort_key(cutoff)],
        )?;
        if rows > 0 {
            debug!(rows, retention_days, "Pruned expired snapshots");
        }
        Ok(rows as u64)
    }

    /// Bytes held by every snapshot other than `id`
    pub fn used_bytes_excluding(&self, id: Uuid) -> Result<u64> {
        let used: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(payload AS BLOB))), 0) FROM snapshots WHERE id != ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(used.max(0) as u64)
    }
}
