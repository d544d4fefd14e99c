//! World snapshots for save/load.
//!
//! Serializes every entity in a [`MemoryStore`] (facts, pending change log,
//! description) to versioned JSON.

use crate::entity::Entity;
use crate::error::StoreError;
use crate::store::MemoryStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Current snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// A saved world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Format version for compatibility checking.
    pub version: u32,

    pub saved_at: DateTime<Utc>,

    pub entities: Vec<Entity>,
}

impl WorldSnapshot {
    /// Capture every entity in the store.
    pub fn capture(store: &MemoryStore) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            entities: store.entities(),
        }
    }

    /// Rebuild a store from this snapshot.
    pub fn into_store(self) -> MemoryStore {
        MemoryStore::from_entities(self.entities)
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;

        if saved.version != SNAPSHOT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }
}

impl MemoryStore {
    /// Write the whole store to `path`.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        WorldSnapshot::capture(self).save_json(path).await
    }

    /// Load a store previously written with [`MemoryStore::save_json`].
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(WorldSnapshot::load_json(path).await?.into_store())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{Authority, FactSource};
    use crate::store::EntityStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_snapshot_round_trip_keeps_pending_changes() {
        let now = Utc::now();
        let mut entity = Entity::new("Library", "Dusty shelves.", now);
        entity
            .set_fact("books", "leather-bound", FactSource::User, true, Authority::Normal, now)
            .unwrap();
        entity.regeneration_in_progress = true;
        let id = entity.id;

        let store = MemoryStore::from_entities([entity]);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("world.json");
        store.save_json(&path).await.unwrap();

        let loaded = MemoryStore::load_json(&path).await.unwrap();
        let entity = loaded.load_entity(id).unwrap();
        assert_eq!(entity.description, "Dusty shelves.");
        assert!(entity.fact("books").unwrap().pinned);
        assert_eq!(entity.change_log().len(), 1);
        assert!(!entity.regeneration_in_progress);
        assert_eq!(loaded.find_by_name("library"), Some(id));
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.json");

        let mut snapshot = WorldSnapshot::capture(&MemoryStore::new());
        snapshot.version = 99;
        snapshot.save_json(&path).await.unwrap();

        let err = WorldSnapshot::load_json(&path).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionMismatch {
                expected: 1,
                found: 99
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = MemoryStore::load_json(dir.path().join("nope.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
