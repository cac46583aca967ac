//! Processor registry: registered processors keyed by name.
//!
//! Registration order is recorded in configuration (see
//! [`crate::config::PROCESSOR_LIST`]); the registry only resolves names.

use std::collections::HashMap;

use stacks_component::{Result, StacksError};

use crate::processor::Processor;

/// Registry of every processor known to a runtime.
#[derive(Debug, Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Processor>,
}

impl ProcessorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor under `name`, replacing any previous one.
    ///
    /// Returns `true` if the name was new.
    pub fn register(&mut self, name: impl Into<String>, processor: Processor) -> bool {
        self.processors.insert(name.into(), processor).is_none()
    }

    /// Remove a processor. Returns `true` if it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.processors.remove(name).is_some()
    }

    /// The processor registered under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Processor> {
        self.processors.get(name)
    }

    /// The processor registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::LookupMiss`] if no such processor exists.
    pub fn require(&self, name: &str) -> Result<&Processor> {
        self.get(name)
            .ok_or_else(|| StacksError::lookup("processor", name))
    }

    /// Number of registered processors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
