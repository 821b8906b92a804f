//! Declarative mapping configuration.
//!
//! A [`MappingConfig`] is pure data: an ordered list of [`PropertyMapping`]
//! rules plus a few dataset-wide switches. It is typically deserialized from
//! the host's configuration. Custom per-field logic is referenced by name and
//! resolved against a [`TransformRegistry`] when the mapper is built.

use crate::entity::Entity;
use crate::item::Item;
use datalayer_codec::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One field rule.
///
/// `property` names the item field, `entity_property` the entity property or
/// reference it corresponds to. When `entity_property` is empty the item
/// field name is used for both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyMapping {
    /// Entity-side property name.
    pub entity_property: String,
    /// Item-side field name.
    pub property: String,
    /// Field holds the entity identity.
    pub is_identity: bool,
    /// Field is a reference to another entity.
    pub is_reference: bool,
    /// Field is the boolean deletion flag.
    pub is_deleted: bool,
    /// Field is the change marker (integer counter or RFC 3339 timestamp).
    pub is_recorded: bool,
    /// Mapping fails when the source value is absent or null.
    pub required: bool,
    /// Value used when the source field is absent.
    pub default_value: Option<Value>,
    /// Name of a registered custom transform.
    pub transform: Option<String>,
}

impl PropertyMapping {
    /// Rule mapping `property` to the entity identity.
    #[must_use]
    pub fn identity(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            is_identity: true,
            ..Self::default()
        }
    }

    /// Rule mapping item field `property` to entity property `entity_property`.
    #[must_use]
    pub fn field(property: impl Into<String>, entity_property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            entity_property: entity_property.into(),
            ..Self::default()
        }
    }

    /// Marks the rule as a reference.
    #[must_use]
    pub fn reference(mut self) -> Self {
        self.is_reference = true;
        self
    }

    /// Marks the rule as the deletion flag.
    #[must_use]
    pub fn deleted_flag(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    /// Marks the rule as the change marker.
    #[must_use]
    pub fn recorded_marker(mut self) -> Self {
        self.is_recorded = true;
        self
    }

    /// Marks the rule as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Sets the custom transform name.
    #[must_use]
    pub fn with_transform(mut self, name: impl Into<String>) -> Self {
        self.transform = Some(name.into());
        self
    }

    /// Entity-side name, falling back to the item field name.
    #[must_use]
    pub fn target_property(&self) -> &str {
        if self.entity_property.is_empty() {
            &self.property
        } else {
            &self.entity_property
        }
    }

    pub(crate) fn role_count(&self) -> usize {
        [
            self.is_identity,
            self.is_reference,
            self.is_deleted,
            self.is_recorded,
        ]
        .iter()
        .filter(|f| **f)
        .count()
    }
}

/// Rules for one dataset direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Prefix applied to identity and text reference values on the entity side.
    pub base_uri: Option<String>,
    /// Copy item fields without a rule into entity properties verbatim.
    pub map_all: bool,
    /// Ordered rules.
    pub properties: Vec<PropertyMapping>,
}

impl MappingConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URI.
    #[must_use]
    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    /// Enables or disables copying of unmapped fields.
    #[must_use]
    pub fn map_all(mut self, value: bool) -> Self {
        self.map_all = value;
        self
    }

    /// Appends a rule.
    #[must_use]
    pub fn with_property(mut self, mapping: PropertyMapping) -> Self {
        self.properties.push(mapping);
        self
    }
}

/// Item to entity transform: source item, the rule, the entity built so far.
pub type ToEntityFn =
    dyn Fn(&Item, &PropertyMapping, &Entity) -> Result<Value, String> + Send + Sync;

/// Entity to item transform: source entity, the rule, the item built so far.
pub type ToItemFn = dyn Fn(&Entity, &PropertyMapping, &Item) -> Result<Value, String> + Send + Sync;

/// A named custom transform, usable in one or both directions.
///
/// A direction without a function falls back to the default copy.
#[derive(Clone, Default)]
pub struct Transform {
    pub(crate) to_entity: Option<Arc<ToEntityFn>>,
    pub(crate) to_item: Option<Arc<ToItemFn>>,
}

impl Transform {
    /// Transform applied when mapping items to entities.
    pub fn to_entity<F>(f: F) -> Self
    where
        F: Fn(&Item, &PropertyMapping, &Entity) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            to_entity: Some(Arc::new(f)),
            to_item: None,
        }
    }

    /// Transform applied when mapping entities to items.
    pub fn to_item<F>(f: F) -> Self
    where
        F: Fn(&Entity, &PropertyMapping, &Item) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            to_entity: None,
            to_item: Some(Arc::new(f)),
        }
    }

    /// Adds the entity to item direction.
    #[must_use]
    pub fn and_to_item<F>(mut self, f: F) -> Self
    where
        F: Fn(&Entity, &PropertyMapping, &Item) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.to_item = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("to_entity", &self.to_entity.is_some())
            .field("to_item", &self.to_item.is_some())
            .finish()
    }
}

/// Named transforms available to mapping configurations.
///
/// Owned by the host and passed to mapper construction; never global.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Transform>,
}

impl TransformRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `transform` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, transform: Transform) -> &mut Self {
        self.transforms.insert(name.into(), transform);
        self
    }

    /// Looks up a transform.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Transform> {
        self.transforms.get(name)
    }

    /// Number of registered transforms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Whether no transforms are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}
