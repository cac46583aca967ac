//! Component descriptors and their value kinds.
//!
//! A [`Component`] is a named attribute definition. Its [`ComponentKind`]
//! decides which value type may be stored under that name: nothing (a flag),
//! text, or a 64-bit integer. Descriptors are plain values; the same name can
//! be described in several places as long as the kinds agree.
//!
//! Three descriptors are reserved by the runtime itself:
//!
//! - [`IDENTITY`]: every persisted entity carries it, equal to its own id.
//! - [`TRANSIENT`]: marks an entity that should not be held durably.
//! - [`EXPIRED`]: writing it removes the whole entity from storage.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StacksError};

/// The Rust-side type a component value is carried in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Carried as a `String`.
    Text,
    /// Carried as an `i64`.
    Integer,
}

/// The kind of value a component holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentKind {
    /// No value; presence alone is the information.
    None,
    /// Free text.
    String,
    /// A 64-bit integer.
    Integer,
    /// The identifier of another entity.
    Reference,
    /// Several entity identifiers, stored `|`-joined in one string.
    MultiReference,
}

impl ComponentKind {
    /// All kinds, in declaration order.
    pub const ALL: [ComponentKind; 5] = [
        Self::None,
        Self::String,
        Self::Integer,
        Self::Reference,
        Self::MultiReference,
    ];

    /// The value type this kind carries, or `None` for flags.
    #[must_use]
    pub const fn value_type(self) -> Option<ValueType> {
        match self {
            Self::None => None,
            Self::String | Self::MultiReference => Some(ValueType::Text),
            Self::Integer | Self::Reference => Some(ValueType::Integer),
        }
    }

    /// Returns `true` for the value-less flag kind.
    #[must_use]
    pub const fn is_flag(self) -> bool {
        matches!(self, Self::None)
    }

    /// The canonical upper-case name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Reference => "REFERENCE",
            Self::MultiReference => "MULTI_REFERENCE",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = StacksError;

    /// Accepts the canonical names plus the short forms `NUMBER` and
    /// `MULTIREF`, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" | "FLAG" => Ok(Self::None),
            "STRING" => Ok(Self::String),
            "INTEGER" | "NUMBER" => Ok(Self::Integer),
            "REFERENCE" => Ok(Self::Reference),
            "MULTI_REFERENCE" | "MULTIREF" => Ok(Self::MultiReference),
            _ => Err(StacksError::missing("component kind", format!("'{s}'"))),
        }
    }
}

/// A named, kind-typed attribute definition.
///
/// # Examples
///
/// ```rust
/// use stacks_component::{Component, ComponentKind};
///
/// const ENERGY: Component = Component::new("ENERGY", ComponentKind::Integer);
/// const ALIVE: Component = Component::flag("ALIVE");
///
/// assert_eq!(ENERGY.name(), "ENERGY");
/// assert!(ALIVE.kind().is_flag());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Component {
    name: Cow<'static, str>,
    kind: ComponentKind,
}

impl Component {
    /// Describe a component with a static name.
    #[must_use]
    pub const fn new(name: &'static str, kind: ComponentKind) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind,
        }
    }

    /// Describe a flag component with a static name.
    #[must_use]
    pub const fn flag(name: &'static str) -> Self {
        Self::new(name, ComponentKind::None)
    }

    /// Describe a component with a runtime name.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::MissingField`] when `name` is empty.
    pub fn named(name: impl Into<String>, kind: ComponentKind) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StacksError::missing("component name", "component descriptor"));
        }
        Ok(Self {
            name: Cow::Owned(name),
            kind,
        })
    }

    /// Describe a component from textual name and kind, as found in
    /// configuration or blueprint files.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::MissingField`] when the name is empty or the
    /// kind is not recognised.
    pub fn parse(name: &str, kind: &str) -> Result<Self> {
        let kind = kind.parse()?;
        Self::named(name, kind)
    }

    /// The component name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The component kind.
    #[must_use]
    pub const fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Fails with [`StacksError::TypeMismatch`] unless this component is a flag.
    pub fn expect_flag(&self) -> Result<()> {
        match self.kind.value_type() {
            None => Ok(()),
            Some(_) => Err(self.mismatch("flag")),
        }
    }

    /// Fails with [`StacksError::TypeMismatch`] unless this component carries text.
    pub fn expect_text(&self) -> Result<()> {
        match self.kind.value_type() {
            Some(ValueType::Text) => Ok(()),
            _ => Err(self.mismatch("string")),
        }
    }

    /// Fails with [`StacksError::TypeMismatch`] unless this component carries an integer.
    pub fn expect_integer(&self) -> Result<()> {
        match self.kind.value_type() {
            Some(ValueType::Integer) => Ok(()),
            _ => Err(self.mismatch("long")),
        }
    }

    fn mismatch(&self, expected: &'static str) -> StacksError {
        StacksError::TypeMismatch {
            component: self.name.to_string(),
            expected,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.kind)
    }
}

/// The unique identifier of an entity. Every entity must carry it.
pub const IDENTITY: Component = Component::new("IDENTITY", ComponentKind::Reference);

/// Marks an entity that should not be held in persistent storage.
pub const TRANSIENT: Component = Component::flag("TRANSIENT");

/// Marks an entity for removal; backends delete the whole entity when it is
/// written.
pub const EXPIRED: Component = Component::flag("EXPIRED");

/// The reserved kernel components.
pub const CORE: [Component; 3] = [IDENTITY, TRANSIENT, EXPIRED];
