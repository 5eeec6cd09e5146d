//! Snapshot storage for Retro
//!
//! `Database` keeps snapshots and persistence settings in SQLite.
//! `MemoryStore` keeps them for the lifetime of the process only.

mod memory;
mod migrations;
mod parse;
mod settings;
mod snapshots;
mod traits;

use std::path::Path;

use rusqlite::Connection;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::settings::PersistenceSettings;
use crate::snapshot::Snapshot;

pub use memory::MemoryStore;
pub use settings::SettingsStore;
pub use snapshots::SnapshotStore;
pub use traits::{SettingsRepository, SnapshotRepository, Storage};

/// Main database handle
pub struct Database {
    conn: Connection,
    quota_bytes: Option<u64>,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            quota_bytes: None,
        };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            quota_bytes: None,
        };
        db.init()?;
        Ok(db)
    }

    /// Limit the total bytes of stored snapshots
    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        migrations::applied_version(&self.conn).unwrap_or(0)
    }

    pub fn snapshots(&self) -> SnapshotStore<'_> {
        SnapshotStore::new(&self.conn)
    }

    pub fn settings(&self) -> SettingsStore<'_> {
        SettingsStore::new(&self.conn)
    }
}

/// Fail with `QuotaExceeded` when `needed` more bytes do not fit
pub(crate) fn check_quota(quota: Option<u64>, used: u64, needed: u64) -> Result<()> {
    let Some(quota) = quota else {
        return Ok(());
    };
    let available = quota.saturating_sub(used);
    if needed > available {
        return Err(Error::QuotaExceeded { needed, available });
    }
    Ok(())
}

impl SnapshotRepository for Database {
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let store = self.snapshots();
        let payload = snapshots::encode(snapshot)?;
        let used = store.used_bytes_excluding(snapshot.id)?;
        check_quota(self.quota_bytes, used, payload.len() as u64)?;
        store.upsert(snapshot, &payload)
    }

    fn find_snapshot(&self, id: Uuid) -> Result<Option<Snapshot>> {
        self.snapshots().find_by_id(id)
    }

    fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        self.snapshots().list()
    }

    fn delete_snapshot(&self, id: Uuid) -> Result<bool> {
        self.snapshots().delete(id)
    }

    fn prune_snapshots(&self, retention_days: u16) -> Result<u64> {
        self.snapshots().prune_older_than(retention_days)
    }
}

impl SettingsRepository for Database {
    fn load_settings(&self) -> Result<Option<PersistenceSettings>> {
        self.settings().load()
    }

    fn save_settings(&self, settings: &PersistenceSettings) -> Result<()> {
        self.settings().save(settings)
    }
}
