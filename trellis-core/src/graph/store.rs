//! Entity Store
//!
//! A flat mapping from key to entity. Entities point at each other only
//! through references, so the map is the arena for an arbitrarily cyclic
//! graph.

use std::collections::HashMap;

use super::entity::{Entity, EntityKey};

/// One graph of entities: either the confirmed data or the optimistic
/// overlay derived from it.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    entities: HashMap<EntityKey, Entity>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn get_mut(&mut self, key: &EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(key)
    }

    /// Insert or replace an entity.
    pub fn set(&mut self, entity: Entity) {
        self.entities.insert(entity.key().clone(), entity);
    }

    pub fn remove(&mut self, key: &EntityKey) -> Option<Entity> {
        self.entities.remove(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.entities.keys()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Keep only the entities for which `keep` returns true. Returns how many
    /// were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&EntityKey) -> bool) -> usize {
        let before = self.entities.len();
        self.entities.retain(|key, _| keep(key));
        before - self.entities.len()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}
