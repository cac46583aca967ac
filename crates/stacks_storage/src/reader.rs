//! The read side of the storage abstraction.

use std::collections::BTreeMap;
use std::sync::Arc;

use stacks_component::{Component, Entity, Result};
use tracing::warn;

use crate::record::EntityRecord;

/// Reads entity snapshots from a backend.
///
/// Implementors only provide [`EntityReader::read`]; the lookups by id and by
/// component are built on top of it.
pub trait EntityReader: Send + Sync {
    /// Every entity matching the filter record.
    ///
    /// A record with an id selects that entity; otherwise a record with a
    /// component selects every entity carrying it.
    ///
    /// # Errors
    ///
    /// Returns [`stacks_component::StacksError::Backend`] when the backend
    /// fails.
    fn read(&self, record: &EntityRecord) -> Result<Vec<Entity>>;

    /// The entity with this id, or `None` when it does not exist.
    fn read_id(&self, id: i64) -> Result<Option<Entity>> {
        Ok(self.read(&EntityRecord::by_id(id))?.into_iter().next())
    }

    /// Every entity currently carrying the component.
    fn read_component(&self, component: &Component) -> Result<Vec<Entity>> {
        self.read(&EntityRecord::by_component(component.name()))
    }

    /// Every entity carrying all of the listed components.
    fn read_all(&self, components: &[Component]) -> Result<Vec<Entity>> {
        let mut merged = BTreeMap::new();
        for component in components {
            for entity in self.read_component(component)? {
                insert_identified(&mut merged, entity);
            }
        }
        Ok(merged
            .into_values()
            .filter(|e| components.iter().all(|c| e.is(c)))
            .collect())
    }
}

impl<T: EntityReader + ?Sized> EntityReader for Arc<T> {
    fn read(&self, record: &EntityRecord) -> Result<Vec<Entity>> {
        (**self).read(record)
    }
}

/// Merges the results of several readers, keyed by entity id.
///
/// When two readers return the same id, the later reader's snapshot wins.
/// Results come back ordered by id.
#[derive(Default)]
pub struct CompositeReader {
    readers: Vec<Arc<dyn EntityReader>>,
}

impl CompositeReader {
    /// Compose the given readers, in priority order (last wins).
    #[must_use]
    pub fn new(readers: Vec<Arc<dyn EntityReader>>) -> Self {
        Self { readers }
    }

    /// Append a reader with the highest priority so far.
    pub fn push(&mut self, reader: Arc<dyn EntityReader>) {
        self.readers.push(reader);
    }

    /// Number of composed readers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    /// Returns `true` if no readers are composed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

impl std::fmt::Debug for CompositeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeReader")
            .field("readers", &self.readers.len())
            .finish()
    }
}

impl EntityReader for CompositeReader {
    fn read(&self, record: &EntityRecord) -> Result<Vec<Entity>> {
        let mut merged = BTreeMap::new();
        for reader in &self.readers {
            for entity in reader.read(record)? {
                insert_identified(&mut merged, entity);
            }
        }
        Ok(merged.into_values().collect())
    }
}

/// Key a snapshot by its id. A snapshot without an identity is not an entity
/// and is left out.
fn insert_identified(merged: &mut BTreeMap<i64, Entity>, entity: Entity) {
    match entity.identifier() {
        Ok(id) => {
            merged.insert(id, entity);
        }
        Err(err) => warn!(error = %err, "skipping snapshot without identity"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use stacks_component::{ComponentKind, ComponentValue};

    use super::*;

    /// A reader that returns a fixed set of entities regardless of filter.
    struct FixedReader(Vec<Entity>);

    impl EntityReader for FixedReader {
        fn read(&self, record: &EntityRecord) -> Result<Vec<Entity>> {
            Ok(self
                .0
                .iter()
                .filter(|e| match (&record.id, &record.component) {
                    (Some(id), _) => e.identifier().ok() == Some(*id),
                    (None, Some(c)) => e.is_named(c),
                    (None, None) => false,
                })
                .cloned()
                .collect())
        }
    }

    fn entity(id: i64, extra: &[(&str, ComponentValue)]) -> Entity {
        let mut map = HashMap::new();
        map.insert("IDENTITY".to_string(), ComponentValue::Integer(id));
        for (name, value) in extra {
            map.insert(name.to_string(), value.clone());
        }
        Entity::new(map)
    }

    const SOURCE: Component = Component::new("SOURCE", ComponentKind::String);

    #[test]
    fn test_read_id_absent_is_none() {
        let reader = FixedReader(vec![entity(1, &[])]);
        assert!(reader.read_id(2).unwrap().is_none());
        assert_eq!(reader.read_id(1).unwrap().unwrap().identifier().unwrap(), 1);
    }

    #[test]
    fn test_composite_last_reader_wins() {
        let first: Arc<dyn EntityReader> = Arc::new(FixedReader(vec![
            entity(1, &[("SOURCE", ComponentValue::Text("first".into()))]),
            entity(2, &[("SOURCE", ComponentValue::Text("first".into()))]),
        ]));
        let second: Arc<dyn EntityReader> = Arc::new(FixedReader(vec![entity(
            1,
            &[("SOURCE", ComponentValue::Text("second".into()))],
        )]));
        let composite = CompositeReader::new(vec![first, second]);

        let all = composite.read_component(&SOURCE).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].string_value(&SOURCE), Some("second"));
        assert_eq!(all[1].string_value(&SOURCE), Some("first"));
    }

    #[test]
    fn test_snapshot_without_identity_is_skipped() {
        let mut orphan = HashMap::new();
        orphan.insert("SOURCE".to_string(), ComponentValue::Text("late".into()));
        let reader: Arc<dyn EntityReader> = Arc::new(FixedReader(vec![
            Entity::new(orphan),
            entity(2, &[("SOURCE", ComponentValue::Text("first".into()))]),
        ]));
        let composite = CompositeReader::new(vec![reader]);

        let found = composite.read_component(&SOURCE).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identifier().unwrap(), 2);
        assert_eq!(composite.read_all(&[SOURCE]).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_composite_reads_nothing() {
        let composite = CompositeReader::default();
        assert!(composite.is_empty());
        assert!(composite.read_id(1).unwrap().is_none());
    }

    #[test]
    fn test_read_all_requires_every_component() {
        let reader = FixedReader(vec![
            entity(1, &[("A", ComponentValue::Flag)]),
            entity(2, &[("A", ComponentValue::Flag), ("B", ComponentValue::Flag)]),
        ]);
        let found = reader
            .read_all(&[Component::flag("A"), Component::flag("B")])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identifier().unwrap(), 2);
    }
}
