//! # stacks_system
//!
//! The transactional runtime of the Stacks entity/component engine.
//!
//! This crate provides:
//!
//! - [`Lock`]: the non-blocking single-writer gate for transaction chains.
//! - [`Transaction`]: a deferred, composable log of storage writes.
//! - [`Processor`]: a trigger component bound to an `Entity → Transaction`
//!   function, and the [`ProcessorRegistry`] resolving them by name.
//! - [`Stacks`]: the runtime context owning storage, configuration and
//!   processors, built with [`StacksBuilder`].
//! - [`Stacks::tick`] and [`TickLoop`]: one pass (or a paced series of
//!   passes) over every active processor, each ending in a single commit.
//!
//! ## Usage
//!
//! ```rust
//! use stacks_component::{Component, ComponentKind};
//! use stacks_system::{Stacks, Transaction};
//!
//! const ENERGY: Component = Component::new("ENERGY", ComponentKind::Integer);
//!
//! let mut stacks = Stacks::in_memory();
//! stacks.register_processor("drain", ENERGY, |_, entity| {
//!     Transaction::new().alter_value(entity, &ENERGY, -1)
//! });
//!
//! let id = stacks.next_id();
//! stacks
//!     .begin()?
//!     .assign_long(id, &ENERGY, 3)?
//!     .create_entity(id)
//!     .commit()?;
//!
//! stacks.tick()?;
//! let entity = stacks.read_id(id)?.expect("entity exists");
//! assert_eq!(entity.long_value(&ENERGY), Some(2));
//! # Ok::<(), stacks_component::StacksError>(())
//! ```

pub mod config;
pub mod lock;
pub mod processor;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod transaction;

pub use config::Configuration;
pub use lock::Lock;
pub use processor::{Processor, ProcessorFn};
pub use registry::ProcessorRegistry;
pub use runtime::{ProcessorStatus, Stacks, StacksBuilder};
pub use scheduler::{TickConfig, TickLoop, TickReport};
pub use transaction::{Operation, Transaction};
