//! Deferred, composable write logs.
//!
//! A [`Transaction`] is an ordered list of [`Operation`]s that touches no
//! storage until it is committed. Composition is not commutative:
//!
//! - `a.compose(b)` runs `b`'s operations, then `a`'s.
//! - `a.and_then(b)` runs `a`'s operations, then `b`'s.
//!
//! Every builder (`create_entity`, `assign_*`, `remove_component`, ...) is a
//! `compose` with a one-block transaction, so each builder call places its
//! writes **before** everything accumulated so far:
//!
//! ```text
//! Transaction::start(&lock)?      [unlock]
//!     .assign_flag(1, &X)?        [X, unlock]
//!     .assign_flag(1, &Y)?        [Y, X, unlock]
//! ```
//!
//! Callers rely on this order, so it is kept as is.

use std::collections::VecDeque;
use std::sync::Arc;

use stacks_component::{Component, Entity, Result, StacksError, encode_references};
use stacks_storage::{EntityRecord, EntityWriter};
use tracing::{debug, warn};

use crate::lock::Lock;

/// One deferred step of a transaction.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Apply a write record.
    Write(EntityRecord),
    /// Release the lock that started the chain.
    Unlock(Lock),
}

impl Operation {
    fn apply(&self, writer: &dyn EntityWriter) -> Result<()> {
        match self {
            Operation::Write(record) => writer.write(record),
            Operation::Unlock(lock) => {
                lock.release();
                Ok(())
            }
        }
    }
}

/// An ordered, deferred log of storage writes.
///
/// A transaction may be *bound* to a writer, in which case [`Transaction::commit`]
/// applies it there; an unbound transaction can only be applied with
/// [`Transaction::commit_to`].
///
/// Dropping a transaction without committing it runs its pending lock
/// releases, so a builder that fails halfway through a chain never leaves the
/// chain lock held.
#[derive(Default)]
pub struct Transaction {
    operations: VecDeque<Operation>,
    writer: Option<Arc<dyn EntityWriter>>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("operations", &self.operations)
            .field("bound", &self.writer.is_some())
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if release_locks(self.operations.drain(..)) > 0 {
            debug!("released the lock of an uncommitted chain");
        }
    }
}

impl Transaction {
    /// An empty, unbound transaction. Committing it is a no-op.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transaction chain guarded by `lock`.
    ///
    /// The returned transaction carries one operation that releases the lock;
    /// builders prepend to it, so the release runs after everything built on
    /// top of this chain.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::LockContention`] if another chain holds the
    /// lock. This never blocks.
    pub fn start(lock: &Lock) -> Result<Self> {
        if !lock.try_acquire() {
            return Err(StacksError::LockContention);
        }
        Ok(Self::block([Operation::Unlock(lock.clone())]))
    }

    fn block(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            operations: operations.into_iter().collect(),
            writer: None,
        }
    }

    fn write(record: EntityRecord) -> Self {
        Self::block([Operation::Write(record)])
    }

    /// Bind this transaction to a writer so that [`Transaction::commit`] works.
    #[must_use]
    pub fn bind(mut self, writer: Arc<dyn EntityWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Returns `true` if the transaction carries a writer.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.writer.is_some()
    }

    /// Number of pending operations, lock releases included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if committing would do nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// The pending operations, in execution order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    /// A transaction running `other`'s operations, then this one's.
    ///
    /// The writer of `self` is kept; when `self` is unbound, `other`'s is.
    #[must_use]
    pub fn compose(mut self, mut other: Transaction) -> Self {
        let mut merged = std::mem::take(&mut other.operations);
        merged.append(&mut self.operations);
        self.operations = merged;
        self.writer = self.writer.take().or_else(|| other.writer.take());
        self
    }

    /// A transaction running this one's operations, then `other`'s.
    ///
    /// The writer of `self` is kept; when `self` is unbound, `other`'s is.
    #[must_use]
    pub fn and_then(mut self, mut other: Transaction) -> Self {
        self.operations.append(&mut other.operations);
        self.writer = self.writer.take().or_else(|| other.writer.take());
        self
    }

    /// Bring entity `id` into existence by writing its identity.
    #[must_use]
    pub fn create_entity(self, id: i64) -> Self {
        self.compose(Self::write(EntityRecord::identity(id)))
    }

    /// Create entity `id` flagged as transient.
    ///
    /// The flag and identity are one block: the flag is written first.
    #[must_use]
    pub fn create_transient_entity(self, id: i64) -> Self {
        self.compose(Self::block([
            Operation::Write(EntityRecord::transient(id)),
            Operation::Write(EntityRecord::identity(id)),
        ]))
    }

    /// Create entity `id` carrying the given flags.
    ///
    /// This is `create_entity` followed by one `assign_flag` per flag, so the
    /// flags are written last to first and the identity after them.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::TypeMismatch`] if any component is not a flag.
    pub fn create_entity_with(self, id: i64, flags: &[Component]) -> Result<Self> {
        for flag in flags {
            flag.expect_flag()?;
        }
        flags
            .iter()
            .try_fold(self.create_entity(id), |tx, flag| tx.assign_flag(id, flag))
    }

    /// Assign a flag component.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::TypeMismatch`] if `component` is not a flag.
    pub fn assign_flag(self, id: i64, component: &Component) -> Result<Self> {
        component.expect_flag()?;
        Ok(self.compose(Self::write(EntityRecord::assign_flag(id, component.name()))))
    }

    /// Assign a string or multi-reference component.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::TypeMismatch`] if `component` does not carry text.
    pub fn assign_string(
        self,
        id: i64,
        component: &Component,
        value: impl Into<String>,
    ) -> Result<Self> {
        component.expect_text()?;
        Ok(self.compose(Self::write(EntityRecord::assign_string(
            id,
            component.name(),
            value,
        ))))
    }

    /// Assign an integer or reference component.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::TypeMismatch`] if `component` does not carry an
    /// integer.
    pub fn assign_long(self, id: i64, component: &Component, value: i64) -> Result<Self> {
        component.expect_integer()?;
        Ok(self.compose(Self::write(EntityRecord::assign_long(
            id,
            component.name(),
            value,
        ))))
    }

    /// Remove a component of any kind.
    #[must_use]
    pub fn remove_component(self, id: i64, component: &Component) -> Self {
        self.compose(Self::write(EntityRecord::remove(id, component.name())))
    }

    /// Expire entity `id`, removing it from storage entirely.
    #[must_use]
    pub fn expire(self, id: i64) -> Self {
        self.compose(Self::write(EntityRecord::expire(id)))
    }

    /// Add `delta` to an integer component of `entity`, treating an absent
    /// value as zero.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::MissingField`] if the entity has no identity,
    /// [`StacksError::TypeMismatch`] if `component` does not carry an integer
    /// and [`StacksError::Overflow`] if the sum does not fit in an `i64`.
    pub fn alter_value(self, entity: &Entity, component: &Component, delta: i64) -> Result<Self> {
        let current = entity.long_value(component).unwrap_or(0);
        let altered = current.checked_add(delta).ok_or_else(|| StacksError::Overflow {
            component: component.name().to_string(),
            value: current,
            delta,
        })?;
        self.assign_long(entity.identifier()?, component, altered)
    }

    /// Append `reference` to a multi-reference component of `entity`.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::alter_value`], for text components.
    pub fn add_reference(
        self,
        entity: &Entity,
        component: &Component,
        reference: i64,
    ) -> Result<Self> {
        let mut references = entity.reference_values(component);
        references.push(reference);
        self.assign_string(entity.identifier()?, component, encode_references(&references))
    }

    /// Drop every occurrence of `reference` from a multi-reference component.
    ///
    /// The component is removed once no references remain.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::add_reference`].
    pub fn remove_reference(
        self,
        entity: &Entity,
        component: &Component,
        reference: i64,
    ) -> Result<Self> {
        component.expect_text()?;
        let id = entity.identifier()?;
        let references: Vec<i64> = entity
            .reference_values(component)
            .into_iter()
            .filter(|r| *r != reference)
            .collect();
        if references.is_empty() {
            return Ok(self.remove_component(id, component));
        }
        self.assign_string(id, component, encode_references(&references))
    }

    /// Apply every operation to `writer`, in order.
    ///
    /// There is no rollback: writes applied before a failure stay applied.
    /// Lock releases that had not run yet are still performed, so a failing
    /// backend never leaves the chain lock held.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the writer.
    pub fn commit_to(mut self, writer: &dyn EntityWriter) -> Result<()> {
        let total = self.operations.len();
        let mut pending = std::mem::take(&mut self.operations).into_iter();
        let mut applied = 0usize;
        while let Some(operation) = pending.next() {
            if let Err(err) = operation.apply(writer) {
                release_locks(pending);
                warn!(applied, total, error = %err, "commit failed");
                return Err(err);
            }
            applied += 1;
        }
        debug!(applied, "committed transaction");
        Ok(())
    }

    /// Apply the transaction to the writer it is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::UnboundCommit`] if the transaction has no
    /// writer (pending lock releases still run), otherwise the same errors as
    /// [`Transaction::commit_to`].
    pub fn commit(mut self) -> Result<()> {
        match self.writer.take() {
            Some(writer) => self.commit_to(writer.as_ref()),
            None => Err(StacksError::UnboundCommit),
        }
    }

    /// Drop the transaction without writing anything, releasing its locks.
    pub fn discard(self) {
        drop(self);
    }
}

fn release_locks(operations: impl IntoIterator<Item = Operation>) -> usize {
    let mut released = 0;
    for operation in operations {
        if let Operation::Unlock(lock) = operation {
            lock.release();
            released += 1;
        }
    }
    released
}
