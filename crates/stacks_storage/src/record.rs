//! The storage record exchanged with readers and writers.
//!
//! One shape serves both directions. A read record filters by id and/or
//! component. A write record names an id, a component, at most one value,
//! and whether the pair is being upserted (`active`) or deleted.

use serde::{Deserialize, Serialize};

use stacks_component::{
    Component, ComponentValue, EXPIRED, IDENTITY, Result, StacksError, TRANSIENT,
};

/// A storage read filter or write command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// The entity identifier.
    pub id: Option<i64>,
    /// The component name.
    pub component: Option<String>,
    /// Text value, for string and multi-reference components.
    pub string_value: Option<String>,
    /// Integer value, for integer and reference components.
    pub long_value: Option<i64>,
    /// `true` to upsert the pair, `false` to delete it.
    pub active: bool,
}

impl EntityRecord {
    /// A read filter selecting one entity by id.
    #[must_use]
    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            component: None,
            string_value: None,
            long_value: None,
            active: true,
        }
    }

    /// A read filter selecting every entity with the named component.
    #[must_use]
    pub fn by_component(component: impl Into<String>) -> Self {
        Self {
            id: None,
            component: Some(component.into()),
            string_value: None,
            long_value: None,
            active: true,
        }
    }

    /// Upsert a flag.
    #[must_use]
    pub fn assign_flag(id: i64, component: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            component: Some(component.into()),
            string_value: None,
            long_value: None,
            active: true,
        }
    }

    /// Upsert a text value.
    #[must_use]
    pub fn assign_string(id: i64, component: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            string_value: Some(value.into()),
            ..Self::assign_flag(id, component)
        }
    }

    /// Upsert an integer value.
    #[must_use]
    pub fn assign_long(id: i64, component: impl Into<String>, value: i64) -> Self {
        Self {
            long_value: Some(value),
            ..Self::assign_flag(id, component)
        }
    }

    /// Delete one (id, component) pair.
    #[must_use]
    pub fn remove(id: i64, component: impl Into<String>) -> Self {
        Self {
            active: false,
            ..Self::assign_flag(id, component)
        }
    }

    /// The [`IDENTITY`] write that brings an entity into existence.
    #[must_use]
    pub fn identity(id: i64) -> Self {
        Self::assign_long(id, IDENTITY.name(), id)
    }

    /// The [`TRANSIENT`] flag write.
    #[must_use]
    pub fn transient(id: i64) -> Self {
        Self::assign_flag(id, TRANSIENT.name())
    }

    /// The [`EXPIRED`] flag write that removes the whole entity.
    #[must_use]
    pub fn expire(id: i64) -> Self {
        Self::assign_flag(id, EXPIRED.name())
    }

    /// The identifier a write must carry.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::MissingField`] if the record has no id.
    pub fn required_id(&self) -> Result<i64> {
        self.id
            .ok_or_else(|| StacksError::missing("entity identity", "storage record"))
    }

    /// The component a write must carry.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::MissingField`] if the record has no component.
    pub fn required_component(&self) -> Result<&str> {
        self.component
            .as_deref()
            .ok_or_else(|| StacksError::missing("component", "storage record"))
    }

    /// The raw value: the text if present, else the integer, else a flag.
    #[must_use]
    pub fn value(&self) -> ComponentValue {
        match (&self.string_value, self.long_value) {
            (Some(s), _) => ComponentValue::Text(s.clone()),
            (None, Some(v)) => ComponentValue::Integer(v),
            (None, None) => ComponentValue::Flag,
        }
    }

    /// Returns `true` for an active write of [`EXPIRED`].
    #[must_use]
    pub fn is_expiration(&self) -> bool {
        self.active && self.component.as_deref() == Some(EXPIRED.name())
    }

    /// Returns `true` if this record targets the given component.
    #[must_use]
    pub fn targets(&self, component: &Component) -> bool {
        self.component.as_deref() == Some(component.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_precedence() {
        assert_eq!(
            EntityRecord::assign_string(1, "NAME", "bob").value(),
            ComponentValue::Text("bob".into())
        );
        assert_eq!(
            EntityRecord::assign_long(1, "ENERGY", 5).value(),
            ComponentValue::Integer(5)
        );
        assert_eq!(EntityRecord::assign_flag(1, "HAT").value(), ComponentValue::Flag);
    }

    #[test]
    fn test_required_fields() {
        let read = EntityRecord::by_component("HAT");
        assert!(matches!(
            read.required_id(),
            Err(StacksError::MissingField { .. })
        ));
        assert_eq!(read.required_component().unwrap(), "HAT");

        let read = EntityRecord::by_id(3);
        assert_eq!(read.required_id().unwrap(), 3);
        assert!(read.required_component().is_err());
    }

    #[test]
    fn test_expiration_detection() {
        assert!(EntityRecord::expire(9).is_expiration());
        assert!(!EntityRecord::remove(9, EXPIRED.name()).is_expiration());
        assert!(!EntityRecord::transient(9).is_expiration());
        assert!(EntityRecord::identity(9).targets(&IDENTITY));
    }

    #[test]
    fn test_record_wire_shape() {
        let json = serde_json::to_value(EntityRecord::remove(4, "HAT")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 4,
                "component": "HAT",
                "string_value": null,
                "long_value": null,
                "active": false,
            })
        );
    }
}
