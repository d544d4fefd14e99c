//! Entity store: the persistence-layer interface the director works through.

use crate::entity::{Entity, EntityId};
use crate::error::StoreError;
use std::collections::HashMap;
use std::sync::RwLock;

/// Durable home of entities and their descriptions.
///
/// The director never caches entities; it loads, mutates and saves them
/// through this interface.
pub trait EntityStore: Send + Sync {
    fn load_entity(&self, id: EntityId) -> Result<Entity, StoreError>;

    fn save_entity(&self, entity: &Entity) -> Result<(), StoreError>;

    /// Case-insensitive exact name lookup.
    fn find_by_name(&self, name: &str) -> Option<EntityId>;

    fn entity_ids(&self) -> Vec<EntityId>;
}

/// In-process entity store.
///
/// The name index maps each lowercased name to the entity most recently
/// saved under it. The store does not enforce unique names;
/// [`Director::create_entity`](crate::Director::create_entity) does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    entities: HashMap<EntityId, Entity>,
    name_index: HashMap<String, EntityId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding the given entities.
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.write();
            for entity in entities {
                inner.insert(entity);
            }
        }
        store
    }

    /// Snapshot of every entity, ordered by name.
    pub fn entities(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.read().entities.values().cloned().collect();
        entities.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        entities
    }

    pub fn len(&self) -> usize {
        self.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl MemoryInner {
    fn insert(&mut self, entity: Entity) {
        if let Some(previous) = self.entities.get(&entity.id) {
            let old_name = name_key(&previous.name);
            if self.name_index.get(&old_name) == Some(&entity.id) {
                self.name_index.remove(&old_name);
            }
        }
        self.name_index.insert(name_key(&entity.name), entity.id);
        self.entities.insert(entity.id, entity);
    }
}

impl EntityStore for MemoryStore {
    fn load_entity(&self, id: EntityId) -> Result<Entity, StoreError> {
        self.read()
            .entities
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn save_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        self.write().insert(entity.clone());
        Ok(())
    }

    fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.read().name_index.get(&name_key(name)).copied()
    }

    fn entity_ids(&self) -> Vec<EntityId> {
        self.read().entities.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_save_and_load() {
        let store = MemoryStore::new();
        let entity = Entity::new("Cellar", "Cold stone.", Utc::now());
        let id = entity.id;

        store.save_entity(&entity).unwrap();
        let loaded = store.load_entity(id).unwrap();
        assert_eq!(loaded.name, "Cellar");
        assert_eq!(store.find_by_name("cellar"), Some(id));
    }

    #[test]
    fn test_missing_entity() {
        let store = MemoryStore::new();
        let id = EntityId::new();
        assert!(matches!(store.load_entity(id), Err(StoreError::NotFound(e)) if e == id));
    }

    #[test]
    fn test_rename_updates_index() {
        let store = MemoryStore::new();
        let mut entity = Entity::new("Cellar", "Cold stone.", Utc::now());
        store.save_entity(&entity).unwrap();

        entity.name = "Wine Cellar".to_string();
        store.save_entity(&entity).unwrap();

        assert_eq!(store.find_by_name("cellar"), None);
        assert_eq!(store.find_by_name("Wine Cellar"), Some(entity.id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_name_index_follows_last_write() {
        let store = MemoryStore::new();
        let first = Entity::new("Vault", "Iron doors.", Utc::now());
        let second = Entity::new("vault ", "Brass doors.", Utc::now());
        store.save_entity(&first).unwrap();
        store.save_entity(&second).unwrap();

        assert_eq!(store.find_by_name("VAULT"), Some(second.id));
        assert_eq!(store.len(), 2);
        assert!(store.load_entity(first.id).is_ok());
    }
}
