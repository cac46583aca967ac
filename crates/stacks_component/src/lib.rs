//! # stacks_component
//!
//! The data model of the Stacks entity/component runtime.
//!
//! This crate provides:
//!
//! - [`Component`] and [`ComponentKind`]: named, kind-typed attribute
//!   descriptors, plus the reserved [`IDENTITY`], [`TRANSIENT`] and
//!   [`EXPIRED`] components.
//! - [`Entity`]: an immutable snapshot of one entity's component values.
//! - [`IdentifierSequence`]: atomic, monotonic entity id allocation.
//! - [`StacksError`]: the single error taxonomy used by every Stacks crate.

pub mod component;
pub mod entity;
pub mod error;

pub use component::{
    CORE, Component, ComponentKind, EXPIRED, IDENTITY, TRANSIENT, ValueType,
};
pub use entity::{
    ComponentValue, Entity, IdentifierSequence, REFERENCE_SEPARATOR, decode_references,
    encode_references,
};
pub use error::{Result, StacksError};
