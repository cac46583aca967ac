//! In-memory reference backend.
//!
//! Two indexes are kept in step on every write:
//!
//! - `entities`: entity id → (component name → value), for O(1) reads by id.
//! - `index`: component name → set of entity ids, for O(k) reads by component.
//!
//! Both are concurrent maps so one storage can be shared across threads, but
//! the runtime only ever has a single writer at a time.

use std::collections::{BTreeSet, HashMap};

use dashmap::DashMap;
use tracing::trace;

use stacks_component::{ComponentValue, Entity, IDENTITY, Result};

use crate::reader::EntityReader;
use crate::record::EntityRecord;
use crate::writer::EntityWriter;

/// The in-memory entity store.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entities: DashMap<i64, HashMap<String, ComponentValue>>,
    index: DashMap<String, BTreeSet<i64>>,
}

impl InMemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities held.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of entities indexed under a component name.
    #[must_use]
    pub fn component_count(&self, component: &str) -> usize {
        self.index.get(component).map(|ids| ids.len()).unwrap_or(0)
    }

    /// The entity stored under `id`. Components written to an id that has no
    /// identity (a late write to an expired entity) are not an entity.
    fn snapshot(&self, id: i64) -> Option<Entity> {
        self.entities
            .get(&id)
            .filter(|components| components.contains_key(IDENTITY.name()))
            .map(|components| Entity::new(components.value().clone()))
    }

    fn upsert(&self, id: i64, component: &str, value: ComponentValue) {
        self.entities
            .entry(id)
            .or_default()
            .insert(component.to_string(), value);
        self.index
            .entry(component.to_string())
            .or_default()
            .insert(id);
    }

    fn delete(&self, id: i64, component: &str) {
        if let Some(mut components) = self.entities.get_mut(&id) {
            components.remove(component);
        }
        self.unindex(id, component);
    }

    fn unindex(&self, id: i64, component: &str) {
        if let Some(mut ids) = self.index.get_mut(component) {
            ids.remove(&id);
        }
        self.index.remove_if(component, |_, ids| ids.is_empty());
    }

    /// Drop the entity from every component index, then from the primary
    /// store.
    fn expire(&self, id: i64) {
        let names: Vec<String> = match self.entities.get(&id) {
            Some(components) => components.keys().cloned().collect(),
            None => return,
        };
        for name in &names {
            self.unindex(id, name);
        }
        self.entities.remove(&id);
        trace!(id, components = names.len(), "expired entity");
    }
}

impl EntityReader for InMemoryStorage {
    fn read(&self, record: &EntityRecord) -> Result<Vec<Entity>> {
        if let Some(id) = record.id {
            return Ok(self.snapshot(id).into_iter().collect());
        }
        let Some(component) = record.component.as_deref() else {
            return Ok(Vec::new());
        };
        // Copy the ids out so no index guard is held while reading entities.
        let ids: Vec<i64> = match self.index.get(component) {
            Some(ids) => ids.iter().copied().collect(),
            None => return Ok(Vec::new()),
        };
        Ok(ids.into_iter().filter_map(|id| self.snapshot(id)).collect())
    }
}

impl EntityWriter for InMemoryStorage {
    fn write(&self, record: &EntityRecord) -> Result<()> {
        let id = record.required_id()?;
        let component = record.required_component()?;

        if record.active {
            self.upsert(id, component, record.value());
        } else {
            self.delete(id, component);
        }
        trace!(id, component, active = record.active, "applied write");

        if record.is_expiration() {
            self.expire(id);
        }
        Ok(())
    }
}
