//! The write side of the storage abstraction.

use std::sync::Arc;

use stacks_component::{Result, TRANSIENT};

use crate::record::EntityRecord;

/// Applies write records to a backend.
///
/// Implementors only provide [`EntityWriter::write`]. The helpers below are
/// the vocabulary transactions are built from.
pub trait EntityWriter: Send + Sync {
    /// Apply one write record.
    ///
    /// An active record upserts its value under (id, component); an inactive
    /// record deletes that pair. An active write of
    /// [`stacks_component::EXPIRED`] removes the whole entity.
    ///
    /// # Errors
    ///
    /// Returns [`stacks_component::StacksError::MissingField`] when the
    /// record lacks an id or component, and
    /// [`stacks_component::StacksError::Backend`] when the backend fails.
    fn write(&self, record: &EntityRecord) -> Result<()>;

    /// Bring an entity into existence by writing its identity.
    fn write_entity(&self, id: i64) -> Result<()> {
        self.write(&EntityRecord::identity(id))
    }

    /// Write the [`TRANSIENT`] flag, then the identity.
    fn write_transient_entity(&self, id: i64) -> Result<()> {
        self.write_assign_flag(id, TRANSIENT.name())?;
        self.write_entity(id)
    }

    /// Upsert a flag component.
    fn write_assign_flag(&self, id: i64, component: &str) -> Result<()> {
        self.write(&EntityRecord::assign_flag(id, component))
    }

    /// Upsert a text component.
    fn write_assign_string(&self, id: i64, component: &str, value: &str) -> Result<()> {
        self.write(&EntityRecord::assign_string(id, component, value))
    }

    /// Upsert an integer component.
    fn write_assign_long(&self, id: i64, component: &str, value: i64) -> Result<()> {
        self.write(&EntityRecord::assign_long(id, component, value))
    }

    /// Delete one component from an entity.
    fn write_remove_component(&self, id: i64, component: &str) -> Result<()> {
        self.write(&EntityRecord::remove(id, component))
    }

    /// Remove the whole entity.
    fn write_expire(&self, id: i64) -> Result<()> {
        self.write(&EntityRecord::expire(id))
    }
}

impl<T: EntityWriter + ?Sized> EntityWriter for Arc<T> {
    fn write(&self, record: &EntityRecord) -> Result<()> {
        (**self).write(record)
    }
}

/// Fans every write out to several writers, in order.
///
/// This is fan-out, not failover: the first failing writer stops the fan-out
/// and the writers before it keep what they applied.
#[derive(Default)]
pub struct CompositeWriter {
    writers: Vec<Arc<dyn EntityWriter>>,
}

impl CompositeWriter {
    /// Compose the given writers in application order.
    #[must_use]
    pub fn new(writers: Vec<Arc<dyn EntityWriter>>) -> Self {
        Self { writers }
    }

    /// Append a writer to the end of the fan-out.
    pub fn push(&mut self, writer: Arc<dyn EntityWriter>) {
        self.writers.push(writer);
    }

    /// Number of composed writers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Returns `true` if no writers are composed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }
}

impl std::fmt::Debug for CompositeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeWriter")
            .field("writers", &self.writers.len())
            .finish()
    }
}

impl EntityWriter for CompositeWriter {
    fn write(&self, record: &EntityRecord) -> Result<()> {
        for writer in &self.writers {
            writer.write(record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use stacks_component::StacksError;

    use super::*;

    #[derive(Default)]
    struct RecordingWriter(Mutex<Vec<EntityRecord>>);

    impl EntityWriter for RecordingWriter {
        fn write(&self, record: &EntityRecord) -> Result<()> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct FailingWriter;

    impl EntityWriter for FailingWriter {
        fn write(&self, _record: &EntityRecord) -> Result<()> {
            Err(StacksError::backend(std::io::Error::other("connection lost")))
        }
    }

    #[test]
    fn test_transient_entity_writes_flag_then_identity() {
        let writer = RecordingWriter::default();
        writer.write_transient_entity(5).unwrap();
        let records = writer.0.lock().unwrap();
        assert_eq!(
            *records,
            vec![EntityRecord::transient(5), EntityRecord::identity(5)]
        );
    }

    #[test]
    fn test_composite_fans_out_in_order() {
        let a = Arc::new(RecordingWriter::default());
        let b = Arc::new(RecordingWriter::default());
        let mut composite = CompositeWriter::default();
        composite.push(a.clone());
        composite.push(b.clone());
        composite.write_assign_long(1, "ENERGY", 3).unwrap();
        assert_eq!(a.0.lock().unwrap().len(), 1);
        assert_eq!(b.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_composite_stops_at_first_failure() {
        let a = Arc::new(RecordingWriter::default());
        let c = Arc::new(RecordingWriter::default());
        let writers: Vec<Arc<dyn EntityWriter>> = vec![
            a.clone() as Arc<dyn EntityWriter>,
            Arc::new(FailingWriter),
            c.clone(),
        ];
        let composite = CompositeWriter::new(writers);
        let err = composite.write_entity(1).unwrap_err();
        assert!(matches!(err, StacksError::Backend(_)));
        // No rollback: the first writer keeps its write.
        assert_eq!(a.0.lock().unwrap().len(), 1);
        assert!(c.0.lock().unwrap().is_empty());
    }
}
