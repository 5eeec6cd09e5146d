//! Retro Core Library
//!
//! Board model, role permissions, text obfuscation, snapshots and storage
//! for the peer-to-peer retrospective board.

pub mod board;
pub mod cipher;
pub mod config;
pub mod error;
pub mod invariants;
pub mod models;
pub mod permissions;
pub mod settings;
pub mod snapshot;
pub mod storage;
pub mod summary;

pub use board::BoardState;
pub use config::RetroConfig;
pub use error::{Error, Result};
pub use models::*;
pub use permissions::*;
pub use settings::{Consent, PersistenceSettings};
pub use snapshot::{Snapshot, SnapshotSummary};
pub use storage::{
    Database, MemoryStore, SettingsRepository, SnapshotRepository, Storage,
};
