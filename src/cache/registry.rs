//! Bidirectional cache registry.
//!
//! Tracks the relationship between domain entities and cache entries,
//! enabling efficient invalidation when entities change.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::keys::{CacheKey, EntityKey};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

/// Tracks entity → cache_keys and cache_key → entities mappings.
///
/// The bidirectional mapping supports both directions of cleanup: finding
/// every cache entry affected by an entity change, and dropping entity
/// mappings when a cache entry is evicted.
pub struct CacheRegistry {
    entity_to_keys: RwLock<HashMap<EntityKey, HashSet<CacheKey>>>,
    key_to_entities: RwLock<HashMap<CacheKey, HashSet<EntityKey>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            entity_to_keys: RwLock::new(HashMap::new()),
            key_to_entities: RwLock::new(HashMap::new()),
        }
    }

    /// Register a cache entry with its dependent entities.
    pub fn register(&self, cache_key: CacheKey, entities: HashSet<EntityKey>) {
        let mut e2k = rw_write(&self.entity_to_keys, SOURCE, "register");
        let mut k2e = rw_write(&self.key_to_entities, SOURCE, "register");

        for entity in &entities {
            e2k.entry(entity.clone())
                .or_default()
                .insert(cache_key.clone());
        }
        k2e.insert(cache_key, entities);
    }

    /// Get all cache keys affected by an entity change.
    pub fn keys_for_entity(&self, entity: &EntityKey) -> HashSet<CacheKey> {
        rw_read(&self.entity_to_keys, SOURCE, "keys_for_entity")
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    /// Get all entities that a cache key depends on.
    pub fn entities_for_key(&self, cache_key: &CacheKey) -> HashSet<EntityKey> {
        rw_read(&self.key_to_entities, SOURCE, "entities_for_key")
            .get(cache_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a cache key and clean up entity mappings.
    ///
    /// Called when a cache entry is evicted or invalidated.
    pub fn unregister(&self, cache_key: &CacheKey) {
        let mut e2k = rw_write(&self.entity_to_keys, SOURCE, "unregister");
        let mut k2e = rw_write(&self.key_to_entities, SOURCE, "unregister");

        if let Some(entities) = k2e.remove(cache_key) {
            for entity in entities {
                if let Some(keys) = e2k.get_mut(&entity) {
                    keys.remove(cache_key);
                    if keys.is_empty() {
                        e2k.remove(&entity);
                    }
                }
            }
        }
    }

    /// Remove all mappings for an entity.
    ///
    /// Returns the set of cache keys that were affected.
    pub fn unregister_entity(&self, entity: &EntityKey) -> HashSet<CacheKey> {
        let mut e2k = rw_write(&self.entity_to_keys, SOURCE, "unregister_entity");
        let mut k2e = rw_write(&self.key_to_entities, SOURCE, "unregister_entity");

        let affected_keys = e2k.remove(entity).unwrap_or_default();

        for cache_key in &affected_keys {
            if let Some(entities) = k2e.get_mut(cache_key) {
                entities.remove(entity);
                // The k2e entry stays even when empty; the cache entry may
                // still be valid with other dependencies
            }
        }

        affected_keys
    }

    /// Clear all mappings.
    pub fn clear(&self) {
        rw_write(&self.entity_to_keys, SOURCE, "clear").clear();
        rw_write(&self.key_to_entities, SOURCE, "clear").clear();
    }

    pub fn entity_count(&self) -> usize {
        rw_read(&self.entity_to_keys, SOURCE, "entity_count").len()
    }

    pub fn key_count(&self) -> usize {
        rw_read(&self.key_to_entities, SOURCE, "key_count").len()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}
