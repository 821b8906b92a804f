//! Graph entities.

use datalayer_codec::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A graph node produced from (or persisted as) an item.
///
/// `references` hold values that point at other entities; `properties` hold
/// everything else. `recorded` is the change marker the entity was read at,
/// when the source tracks one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Globally unique identifier.
    pub id: String,
    /// Change marker of the source record, if tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded: Option<i64>,
    /// Whether the entity is a deletion marker.
    #[serde(default)]
    pub deleted: bool,
    /// Property values by name.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Reference values by name.
    #[serde(default)]
    pub references: BTreeMap<String, Value>,
}

impl Entity {
    /// Creates an entity with the given id and no properties.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Adds a reference.
    #[must_use]
    pub fn with_reference(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.references.insert(name.into(), value.into());
        self
    }

    /// Returns a property value.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Returns a reference value.
    #[must_use]
    pub fn reference(&self, name: &str) -> Option<&Value> {
        self.references.get(name)
    }
}
