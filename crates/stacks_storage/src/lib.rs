//! # stacks_storage
//!
//! The storage abstraction of the Stacks runtime.
//!
//! This crate provides:
//!
//! - [`EntityRecord`]: the read filter / write command exchanged with
//!   backends.
//! - [`EntityReader`] / [`EntityWriter`]: pluggable read and write
//!   capabilities, and their [`CompositeReader`] / [`CompositeWriter`]
//!   fan-in and fan-out.
//! - [`InMemoryStorage`]: the reference backend with a component index.
//!
//! Any other backend (for example a relational table keyed by
//! `(ID, COMPONENT)`) only has to implement the two traits with the same
//! observable semantics.

pub mod memory;
pub mod reader;
pub mod record;
pub mod writer;

pub use memory::InMemoryStorage;
pub use reader::{CompositeReader, EntityReader};
pub use record::EntityRecord;
pub use writer::{CompositeWriter, EntityWriter};
