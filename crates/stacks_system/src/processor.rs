//! Processors: functions from one matching entity to a transaction.

use std::sync::Arc;

use stacks_component::{Component, Entity, Result};

use crate::runtime::Stacks;
use crate::transaction::Transaction;

/// The body of a processor.
///
/// It receives the runtime for reads and identifier allocation, and must not
/// write: every effect goes into the returned transaction.
pub type ProcessorFn = dyn Fn(&Stacks, &Entity) -> Result<Transaction> + Send + Sync;

/// A trigger component bound to a processor function.
#[derive(Clone)]
pub struct Processor {
    trigger: Component,
    function: Arc<ProcessorFn>,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

impl Processor {
    /// Create a processor that fires on entities carrying `trigger`.
    pub fn new<F>(trigger: Component, function: F) -> Self
    where
        F: Fn(&Stacks, &Entity) -> Result<Transaction> + Send + Sync + 'static,
    {
        Self {
            trigger,
            function: Arc::new(function),
        }
    }

    /// A processor running every sub-processor against the entity and
    /// composing their transactions. With no sub-processors it is a no-op.
    #[must_use]
    pub fn composite(trigger: Component, processors: Vec<Processor>) -> Self {
        Self::new(trigger, move |stacks, entity| {
            processors
                .iter()
                .try_fold(Transaction::new(), |combined, processor| {
                    Ok(combined.compose(processor.process(stacks, entity)?))
                })
        })
    }

    /// The component this processor fires on.
    #[must_use]
    pub fn trigger(&self) -> &Component {
        &self.trigger
    }

    /// Run the function if `entity` carries the trigger, else return an
    /// empty transaction.
    ///
    /// # Errors
    ///
    /// Returns whatever the processor function returns.
    pub fn process(&self, stacks: &Stacks, entity: &Entity) -> Result<Transaction> {
        if !entity.is(&self.trigger) {
            return Ok(Transaction::new());
        }
        (self.function)(stacks, entity)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use stacks_component::{ComponentKind, ComponentValue, IDENTITY, StacksError};

    use super::*;

    const ENERGY: Component = Component::new("ENERGY", ComponentKind::Integer);
    const A: Component = Component::flag("A");
    const B: Component = Component::flag("B");

    fn entity(id: i64, flags: &[&str]) -> Entity {
        let mut map = HashMap::new();
        map.insert(IDENTITY.name().to_string(), ComponentValue::Integer(id));
        for flag in flags {
            map.insert(flag.to_string(), ComponentValue::Flag);
        }
        Entity::new(map)
    }

    fn flagger(flag: Component) -> Processor {
        Processor::new(ENERGY, move |_, e| {
            Transaction::new().assign_flag(e.identifier()?, &flag)
        })
    }

    #[test]
    fn test_process_skips_entities_without_trigger() {
        let stacks = Stacks::in_memory();
        let processor = flagger(A);
        let tx = processor.process(&stacks, &entity(1, &[])).unwrap();
        assert!(tx.is_empty());
        let tx = processor.process(&stacks, &entity(1, &["ENERGY"])).unwrap();
        assert_eq!(tx.len(), 1);
    }

    #[test]
    fn test_composite_composes_sub_results() {
        let stacks = Stacks::in_memory();
        let composite = Processor::composite(ENERGY, vec![flagger(A), flagger(B)]);
        let tx = composite.process(&stacks, &entity(1, &["ENERGY"])).unwrap();
        // Composed left to right, so the last sub-processor's write runs first.
        let order: Vec<_> = tx
            .operations()
            .filter_map(|op| match op {
                crate::transaction::Operation::Write(record) => record.component.clone(),
                crate::transaction::Operation::Unlock(_) => None,
            })
            .collect();
        assert_eq!(order, vec!["B", "A"]);
    }

    #[test]
    fn test_empty_composite_is_noop() {
        let stacks = Stacks::in_memory();
        let composite = Processor::composite(ENERGY, Vec::new());
        assert!(composite.process(&stacks, &entity(1, &["ENERGY"])).unwrap().is_empty());
    }

    #[test]
    fn test_process_propagates_errors() {
        let stacks = Stacks::in_memory();
        let processor = Processor::new(ENERGY, |_, _| Err(StacksError::UnboundCommit));
        assert!(processor.process(&stacks, &entity(1, &["ENERGY"])).is_err());
    }
}
