//! Entity snapshots, raw component values, and identifier allocation.
//!
//! An [`Entity`] is a read-only view produced by a storage reader: a mapping
//! from component name to [`ComponentValue`]. Entities are never mutated in
//! place. Changes are written through a transaction and observed by reading
//! the entity again.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::component::{Component, IDENTITY, ValueType};
use crate::error::{Result, StacksError};

/// Separator used to join multi-reference values into one string.
pub const REFERENCE_SEPARATOR: &str = "|";

/// A raw stored component value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentValue {
    /// Presence only.
    Flag,
    /// Text (string and multi-reference kinds).
    Text(String),
    /// Integer (integer and reference kinds).
    Integer(i64),
}

impl ComponentValue {
    /// The value type carried, or `None` for a flag.
    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Self::Flag => None,
            Self::Text(_) => Some(ValueType::Text),
            Self::Integer(_) => Some(ValueType::Integer),
        }
    }

    /// The text, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is an integer value.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => f.write_str("true"),
            Self::Text(s) => f.write_str(s),
            Self::Integer(v) => write!(f, "{v}"),
        }
    }
}

/// Decode a `|`-joined multi-reference string. Segments that are not
/// integers are dropped.
#[must_use]
pub fn decode_references(value: &str) -> Vec<i64> {
    value
        .split(REFERENCE_SEPARATOR)
        .filter_map(|segment| segment.trim().parse().ok())
        .collect()
}

/// Join entity identifiers into a multi-reference string.
#[must_use]
pub fn encode_references(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(REFERENCE_SEPARATOR)
}

/// An immutable snapshot of one entity's components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    components: HashMap<String, ComponentValue>,
}

impl Entity {
    /// Build a snapshot from raw component values.
    #[must_use]
    pub fn new(components: HashMap<String, ComponentValue>) -> Self {
        Self { components }
    }

    /// The entity identifier, taken from its [`IDENTITY`] component.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::MissingField`] when the snapshot carries no
    /// identity.
    pub fn identifier(&self) -> Result<i64> {
        self.long_value(&IDENTITY)
            .ok_or_else(|| StacksError::missing("identity", "entity"))
    }

    /// Returns `true` if the entity carries the component, whatever its kind.
    #[must_use]
    pub fn is(&self, component: &Component) -> bool {
        self.is_named(component.name())
    }

    /// Returns `true` if the entity carries a component with this name.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// The raw value, only if the descriptor's kind carries `value_type`.
    #[must_use]
    pub fn value(&self, component: &Component, value_type: ValueType) -> Option<&ComponentValue> {
        if component.kind().value_type() != Some(value_type) {
            return None;
        }
        self.components
            .get(component.name())
            .filter(|v| v.value_type() == Some(value_type))
    }

    /// The text value of a string or multi-reference component.
    #[must_use]
    pub fn string_value(&self, component: &Component) -> Option<&str> {
        self.value(component, ValueType::Text)
            .and_then(ComponentValue::as_text)
    }

    /// The integer value of an integer or reference component.
    #[must_use]
    pub fn long_value(&self, component: &Component) -> Option<i64> {
        self.value(component, ValueType::Integer)
            .and_then(ComponentValue::as_integer)
    }

    /// The entity ids referenced by a component.
    ///
    /// Text kinds are decoded as multi-references; integer kinds yield their
    /// single value. Anything else yields nothing.
    #[must_use]
    pub fn reference_values(&self, component: &Component) -> Vec<i64> {
        if let Some(text) = self.string_value(component) {
            return decode_references(text);
        }
        self.long_value(component).into_iter().collect()
    }

    /// The raw value stored under a name, regardless of kind.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&ComponentValue> {
        self.components.get(name)
    }

    /// Names of all components carried by the entity.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    /// Number of components carried.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` if the snapshot carries no components at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Allocates monotonically increasing entity identifiers.
///
/// The counter is atomic so a shared sequence can be drawn from several
/// threads. Each call to [`IdentifierSequence::next_id`] increments first and
/// returns the new value.
#[derive(Debug)]
pub struct IdentifierSequence {
    last: AtomicI64,
}

impl IdentifierSequence {
    /// A sequence whose first identifier is `start + 1`.
    #[must_use]
    pub const fn starting_after(start: i64) -> Self {
        Self {
            last: AtomicI64::new(start),
        }
    }

    /// A sequence seeded from the wall clock (milliseconds × 1000), so ids
    /// from separate runs against the same durable backend do not collide.
    #[must_use]
    pub fn from_clock() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Self::starting_after(millis.saturating_mul(1000))
    }

    /// Allocate the next identifier.
    pub fn next_id(&self) -> i64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The most recently allocated identifier (or the seed).
    #[must_use]
    pub fn last(&self) -> i64 {
        self.last.load(Ordering::SeqCst)
    }
}

impl Default for IdentifierSequence {
    fn default() -> Self {
        Self::from_clock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentKind;

    const NAME: Component = Component::new("NAME", ComponentKind::String);
    const ENERGY: Component = Component::new("ENERGY", ComponentKind::Integer);
    const ROOM: Component = Component::new("ROOM", ComponentKind::MultiReference);
    const HAT: Component = Component::flag("HAT");

    fn make_entity() -> Entity {
        let mut map = HashMap::new();
        map.insert("IDENTITY".to_string(), ComponentValue::Integer(7));
        map.insert("NAME".to_string(), ComponentValue::Text("bob".into()));
        map.insert("ENERGY".to_string(), ComponentValue::Integer(50));
        map.insert("ROOM".to_string(), ComponentValue::Text("1|x|3".into()));
        map.insert("HAT".to_string(), ComponentValue::Flag);
        Entity::new(map)
    }

    #[test]
    fn test_identifier() {
        assert_eq!(make_entity().identifier().unwrap(), 7);
        assert!(matches!(
            Entity::default().identifier(),
            Err(StacksError::MissingField { .. })
        ));
    }

    #[test]
    fn test_presence_is_kind_agnostic() {
        let e = make_entity();
        assert!(e.is(&HAT));
        // Same name, different declared kind: still present.
        assert!(e.is(&Component::new("HAT", ComponentKind::Integer)));
        assert!(!e.is(&Component::flag("CROWN")));
    }

    #[test]
    fn test_typed_value_requires_matching_kind() {
        let e = make_entity();
        assert_eq!(e.string_value(&NAME), Some("bob"));
        assert_eq!(e.long_value(&NAME), None);
        assert_eq!(e.long_value(&ENERGY), Some(50));
        assert_eq!(e.string_value(&ENERGY), None);
        // Declared as text, stored as an integer: empty.
        assert_eq!(
            e.string_value(&Component::new("ENERGY", ComponentKind::String)),
            None
        );
        assert_eq!(e.value(&HAT, ValueType::Text), None);
    }

    #[test]
    fn test_reference_values_drop_garbage() {
        let e = make_entity();
        assert_eq!(e.reference_values(&ROOM), vec![1, 3]);
        assert_eq!(e.reference_values(&IDENTITY), vec![7]);
        assert!(e.reference_values(&HAT).is_empty());
    }

    #[test]
    fn test_reference_codec() {
        assert_eq!(encode_references(&[4, 5, 6]), "4|5|6");
        assert_eq!(encode_references(&[]), "");
        assert_eq!(decode_references("4|5|6"), vec![4, 5, 6]);
        assert!(decode_references("").is_empty());
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let seq = IdentifierSequence::starting_after(100);
        assert_eq!(seq.next_id(), 101);
        assert_eq!(seq.next_id(), 102);
        assert_eq!(seq.last(), 102);
    }

    #[test]
    fn test_clock_sequence_is_positive() {
        let seq = IdentifierSequence::default();
        let a = seq.next_id();
        let b = seq.next_id();
        assert!(a > 0);
        assert_eq!(b, a + 1);
    }
}
