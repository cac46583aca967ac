//! The runtime context: storage, lock, identifiers, configuration, and
//! processors, owned by one explicitly constructed [`Stacks`] value.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};
use uuid::Uuid;

use stacks_component::{Component, Entity, IdentifierSequence, Result, StacksError};
use stacks_storage::{
    CompositeReader, CompositeWriter, EntityReader, EntityWriter, InMemoryStorage,
};

use crate::config::{self, Configuration};
use crate::lock::Lock;
use crate::processor::Processor;
use crate::registry::ProcessorRegistry;
use crate::transaction::Transaction;

/// A running entity/component runtime.
///
/// Processor functions receive `&Stacks`, so everything they need (reads,
/// identifiers, bound transactions) is reachable from here.
pub struct Stacks {
    instance_id: String,
    lock: Lock,
    sequence: IdentifierSequence,
    configuration: Configuration,
    reader: Arc<dyn EntityReader>,
    writer: Arc<dyn EntityWriter>,
    registry: ProcessorRegistry,
    ticks: AtomicU64,
}

impl std::fmt::Debug for Stacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stacks")
            .field("instance_id", &self.instance_id)
            .field("locked", &self.lock.is_locked())
            .field("processors", &self.registry.len())
            .field("ticks", &self.tick_count())
            .finish_non_exhaustive()
    }
}

impl Stacks {
    /// A runtime backed only by a fresh in-memory store, with default
    /// configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStorage::new());
        Self::assemble(
            Configuration::defaults(),
            store.clone(),
            store,
            IdentifierSequence::from_clock(),
        )
    }

    /// Start configuring a runtime.
    #[must_use]
    pub fn builder() -> StacksBuilder {
        StacksBuilder::new()
    }

    fn assemble(
        configuration: Configuration,
        reader: Arc<dyn EntityReader>,
        writer: Arc<dyn EntityWriter>,
        sequence: IdentifierSequence,
    ) -> Self {
        let instance_id = Uuid::new_v4().to_string();
        info!(instance_id, "stacks runtime started");
        Self {
            instance_id,
            lock: Lock::new(),
            sequence,
            configuration,
            reader,
            writer,
            registry: ProcessorRegistry::new(),
            ticks: AtomicU64::new(0),
        }
    }

    /// Unique id of this runtime instance, attached to its log events.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The chain lock shared by [`Stacks::begin`] and the tick.
    #[must_use]
    pub fn lock(&self) -> &Lock {
        &self.lock
    }

    /// The effective configuration.
    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// The effective reader.
    #[must_use]
    pub fn reader(&self) -> Arc<dyn EntityReader> {
        Arc::clone(&self.reader)
    }

    /// The effective writer.
    #[must_use]
    pub fn writer(&self) -> Arc<dyn EntityWriter> {
        Arc::clone(&self.writer)
    }

    pub(crate) fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Allocate the next entity identifier.
    pub fn next_id(&self) -> i64 {
        self.sequence.next_id()
    }

    /// Append the creation of a fresh entity to `transaction`.
    ///
    /// The id is drawn from the sequence immediately, so it can be used in
    /// further builders before anything is committed.
    #[must_use]
    pub fn create_entity(&self, transaction: Transaction) -> (i64, Transaction) {
        let id = self.next_id();
        (id, transaction.create_entity(id))
    }

    /// Like [`Stacks::create_entity`], but the entity is transient.
    #[must_use]
    pub fn create_transient_entity(&self, transaction: Transaction) -> (i64, Transaction) {
        let id = self.next_id();
        (id, transaction.create_transient_entity(id))
    }

    /// Like [`Stacks::create_entity`], carrying the given flags.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::TypeMismatch`] if any component is not a flag.
    /// No id is drawn in that case.
    pub fn create_entity_with(
        &self,
        transaction: Transaction,
        flags: &[Component],
    ) -> Result<(i64, Transaction)> {
        for flag in flags {
            flag.expect_flag()?;
        }
        let id = self.next_id();
        Ok((id, transaction.create_entity_with(id, flags)?))
    }

    /// Open a lock-guarded chain bound to this runtime's writer.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::LockContention`] while another chain is open.
    pub fn begin(&self) -> Result<Transaction> {
        let chain = Transaction::start(&self.lock)?;
        debug!(instance_id = self.instance_id, "chain opened");
        Ok(chain.bind(self.writer()))
    }

    /// An empty transaction bound to this runtime's writer. Not lock-guarded.
    #[must_use]
    pub fn transaction(&self) -> Transaction {
        Transaction::new().bind(self.writer())
    }

    /// Apply a transaction to this runtime's writer.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the writer.
    pub fn commit(&self, transaction: Transaction) -> Result<()> {
        transaction.commit_to(self.writer.as_ref())
    }

    /// The entity with this id, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::Backend`] when the reader fails.
    pub fn read_id(&self, id: i64) -> Result<Option<Entity>> {
        self.reader.read_id(id)
    }

    /// Every entity carrying the component.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::Backend`] when the reader fails.
    pub fn read_component(&self, component: &Component) -> Result<Vec<Entity>> {
        self.reader.read_component(component)
    }

    /// Every entity carrying all of the components.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::Backend`] when the reader fails.
    pub fn read_all(&self, components: &[Component]) -> Result<Vec<Entity>> {
        self.reader.read_all(components)
    }

    /// The first entity `entity` points at through a reference component.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::Backend`] when the reader fails.
    pub fn reference(&self, entity: &Entity, component: &Component) -> Result<Option<Entity>> {
        match entity.reference_values(component).first() {
            Some(&id) => self.read_id(id),
            None => Ok(None),
        }
    }

    /// Every existing entity `entity` points at through a reference
    /// component, in reference order.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::Backend`] when the reader fails.
    pub fn references(&self, entity: &Entity, component: &Component) -> Result<Vec<Entity>> {
        let mut found = Vec::new();
        for id in entity.reference_values(component) {
            if let Some(target) = self.read_id(id)? {
                found.push(target);
            }
        }
        Ok(found)
    }

    /// Register a processor function under `name` and mark it active.
    pub fn register_processor<F>(
        &mut self,
        name: &str,
        trigger: Component,
        function: F,
    ) -> ProcessorStatus
    where
        F: Fn(&Stacks, &Entity) -> Result<Transaction> + Send + Sync + 'static,
    {
        self.register(name, Processor::new(trigger, function))
    }

    /// Register a built processor under `name` and mark it active.
    ///
    /// The name is appended to the processor list once; registering the
    /// same name again replaces the processor.
    pub fn register(&mut self, name: &str, processor: Processor) -> ProcessorStatus {
        let trigger = processor.trigger().name().to_string();
        self.registry.register(name, processor);
        self.configuration
            .append_to_list(config::PROCESSOR_LIST, name);
        self.configuration
            .set_flag(config::processor_active_key(name), true);
        info!(
            instance_id = self.instance_id,
            processor = name,
            trigger,
            "registered processor"
        );
        ProcessorStatus {
            name: name.to_string(),
        }
    }

    /// Remove a processor from the registry and the processor list.
    ///
    /// Returns `true` if it was registered.
    pub fn unregister_processor(&mut self, name: &str) -> bool {
        let registered = self.registry.unregister(name);
        self.configuration
            .remove_from_list(config::PROCESSOR_LIST, name);
        self.configuration
            .remove(&config::processor_active_key(name));
        if registered {
            info!(
                instance_id = self.instance_id,
                processor = name,
                "unregistered processor"
            );
        }
        registered
    }

    /// The status accessor of a registered processor.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::LookupMiss`] if nothing is registered under
    /// `name`.
    pub fn processor_status(&self, name: &str) -> Result<ProcessorStatus> {
        self.registry.require(name)?;
        Ok(ProcessorStatus {
            name: name.to_string(),
        })
    }

    /// Registered processor names, in registration order.
    #[must_use]
    pub fn processor_names(&self) -> Vec<String> {
        self.configuration
            .list(config::PROCESSOR_LIST)
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Returns `true` if the processor's active flag is set.
    #[must_use]
    pub fn is_processor_active(&self, name: &str) -> bool {
        self.configuration
            .flag(&config::processor_active_key(name))
    }

    /// Set a processor's active flag.
    pub fn set_processor_active(&mut self, name: &str, active: bool) {
        self.configuration
            .set_flag(config::processor_active_key(name), active);
        debug!(
            instance_id = self.instance_id,
            processor = name,
            active,
            "processor status changed"
        );
    }

    /// Number of ticks committed so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub(crate) fn advance_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Accessor for one processor's active flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorStatus {
    name: String,
}

impl ProcessorStatus {
    /// The processor name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the processor currently runs on ticks.
    #[must_use]
    pub fn is_active(&self, stacks: &Stacks) -> bool {
        stacks.is_processor_active(&self.name)
    }

    /// Enable or disable the processor.
    pub fn set_active(&self, stacks: &mut Stacks, active: bool) {
        stacks.set_processor_active(&self.name, active);
    }
}

/// Builds a [`Stacks`] from configuration and externally supplied backends.
///
/// The built-in in-memory store is always available under
/// [`config::IN_MEMORY`]. Any other backend whose reader or writer is enabled
/// in configuration must be supplied with [`StacksBuilder::backend`].
pub struct StacksBuilder {
    configuration: Configuration,
    backends: Vec<Backend>,
    identifier_start: Option<i64>,
}

struct Backend {
    name: String,
    reader: Arc<dyn EntityReader>,
    writer: Arc<dyn EntityWriter>,
}

impl Default for StacksBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StacksBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.backends.iter().map(|b| b.name.as_str()).collect();
        f.debug_struct("StacksBuilder")
            .field("configuration", &self.configuration)
            .field("backends", &names)
            .field("identifier_start", &self.identifier_start)
            .finish()
    }
}

impl StacksBuilder {
    /// A builder starting from [`Configuration::defaults`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            configuration: Configuration::defaults(),
            backends: Vec::new(),
            identifier_start: None,
        }
    }

    /// Lay `configuration` over the current one.
    #[must_use]
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = self.configuration.overlay(configuration);
        self
    }

    /// Supply a named storage backend.
    #[must_use]
    pub fn backend(
        mut self,
        name: impl Into<String>,
        reader: Arc<dyn EntityReader>,
        writer: Arc<dyn EntityWriter>,
    ) -> Self {
        let name = name.into();
        self.backends.retain(|b| b.name != name);
        self.backends.push(Backend {
            name,
            reader,
            writer,
        });
        self
    }

    /// Start the identifier sequence after `start` instead of the clock.
    #[must_use]
    pub fn identifier_start(mut self, start: i64) -> Self {
        self.identifier_start = Some(start);
        self
    }

    /// Compose the enabled backends into the runtime's reader and writer.
    ///
    /// Backends are visited in-memory first, then jdbc, then any other
    /// supplied backend in supply order.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::LookupMiss`] if a backend is enabled but was
    /// never supplied.
    pub fn build(self) -> Result<Stacks> {
        let mut names = vec![config::IN_MEMORY.to_string(), config::JDBC.to_string()];
        for backend in &self.backends {
            if !names.contains(&backend.name) {
                names.push(backend.name.clone());
            }
        }

        let mut in_memory: Option<Arc<InMemoryStorage>> = None;
        let mut reader = CompositeReader::default();
        let mut writer = CompositeWriter::default();
        for name in &names {
            let reads = self.configuration.flag(&config::reader_enabled_key(name));
            let writes = self.configuration.flag(&config::writer_enabled_key(name));
            if !reads && !writes {
                continue;
            }
            let (backend_reader, backend_writer) = self.resolve(name, &mut in_memory)?;
            if reads {
                reader.push(backend_reader);
            }
            if writes {
                writer.push(backend_writer);
            }
            debug!(backend = name.as_str(), reads, writes, "storage backend enabled");
        }

        let sequence = match self.identifier_start {
            Some(start) => IdentifierSequence::starting_after(start),
            None => IdentifierSequence::from_clock(),
        };
        Ok(Stacks::assemble(
            self.configuration,
            Arc::new(reader),
            Arc::new(writer),
            sequence,
        ))
    }

    fn resolve(
        &self,
        name: &str,
        in_memory: &mut Option<Arc<InMemoryStorage>>,
    ) -> Result<(Arc<dyn EntityReader>, Arc<dyn EntityWriter>)> {
        if let Some(backend) = self.backends.iter().find(|b| b.name == name) {
            return Ok((Arc::clone(&backend.reader), Arc::clone(&backend.writer)));
        }
        if name == config::IN_MEMORY {
            let store = in_memory.get_or_insert_with(|| Arc::new(InMemoryStorage::new()));
            let reader: Arc<dyn EntityReader> = store.clone();
            let writer: Arc<dyn EntityWriter> = store.clone();
            return Ok((reader, writer));
        }
        Err(StacksError::lookup("storage backend", name))
    }
}
