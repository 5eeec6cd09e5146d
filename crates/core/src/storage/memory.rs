//! Session-only store
//!
//! Used when durable storage is turned off. Everything is lost when the
//! process exits.

use std::cell::RefCell;

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::check_quota;
use super::traits::{SettingsRepository, SnapshotRepository};
use crate::error::Result;
use crate::settings::PersistenceSettings;
use crate::snapshot::Snapshot;

#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: RefCell<Vec<(Snapshot, u64)>>,
    settings: RefCell<Option<PersistenceSettings>>,
    quota_bytes: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }
}

impl SnapshotRepository for MemoryStore {
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let size = serde_json::to_vec(snapshot)?.len() as u64;
        let mut snapshots = self.snapshots.borrow_mut();
        let used = snapshots
            .iter()
            .filter(|(s, _)| s.id != snapshot.id)
            .map(|(_, bytes)| bytes)
            .sum();
        check_quota(self.quota_bytes, used, size)?;

        snapshots.retain(|(s, _)| s.id != snapshot.id);
        snapshots.push((snapshot.clone(), size));
        Ok(())
    }

    fn find_snapshot(&self, id: Uuid) -> Result<Option<Snapshot>> {
        Ok(self
            .snapshots
            .borrow()
            .iter()
            .find(|(s, _)| s.id == id)
            .map(|(s, _)| s.clone()))
    }

    fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let mut list: Vec<Snapshot> = self
            .snapshots
            .borrow()
            .iter()
            .map(|(s, _)| s.clone())
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    fn delete_snapshot(&self, id: Uuid) -> Result<bool> {
        let mut snapshots = self.snapshots.borrow_mut();
        let before = snapshots.len();
        snapshots.retain(|(s, _)| s.id != id);
        Ok(snapshots.len() != before)
    }

    fn prune_snapshots(&self, retention_days: u16) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let mut snapshots = self.snapshots.borrow_mut();
        let before = snapshots.len();
        snapshots.retain(|(s, _)| s.created_at >= cutoff);
        Ok((before - snapshots.len()) as u64)
    }
}

impl SettingsRepository for MemoryStore {
    fn load_settings(&self) -> Result<Option<PersistenceSettings>> {
        Ok(self.settings.borrow().clone())
    }

    fn save_settings(&self, settings: &PersistenceSettings) -> Result<()> {
        settings.validate()?;
        *self.settings.borrow_mut() = Some(settings.clone());
        Ok(())
    }
}
