//! Storage repository traits
//!
//! The node talks to storage only through these, so the SQLite store and
//! the session-only memory store are interchangeable.

use uuid::Uuid;

use crate::error::Result;
use crate::settings::PersistenceSettings;
use crate::snapshot::Snapshot;

/// Snapshot repository operations
pub trait SnapshotRepository {
    /// Store a snapshot, replacing one with the same id
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    fn find_snapshot(&self, id: Uuid) -> Result<Option<Snapshot>>;

    /// All snapshots, newest first
    fn list_snapshots(&self) -> Result<Vec<Snapshot>>;

    /// Returns whether a snapshot was removed
    fn delete_snapshot(&self, id: Uuid) -> Result<bool>;

    /// Remove snapshots older than the retention window, returning the count
    fn prune_snapshots(&self, retention_days: u16) -> Result<u64>;
}

/// Persistence metadata record
pub trait SettingsRepository {
    fn load_settings(&self) -> Result<Option<PersistenceSettings>>;

    fn save_settings(&self, settings: &PersistenceSettings) -> Result<()>;
}

/// Combined storage trait
pub trait Storage: SnapshotRepository + SettingsRepository {}

impl<T> Storage for T where T: SnapshotRepository + SettingsRepository {}
