//! Item <-> entity conversion driven by a mapping configuration.

use crate::cursor::marker_from_value;
use crate::entity::Entity;
use crate::error::{LayerError, LayerResult};
use crate::item::Item;
use crate::mapping::{MappingConfig, PropertyMapping, Transform, TransformRegistry};
use datalayer_codec::Value;
use std::collections::HashSet;

/// Conversion between items and entities.
///
/// Implemented by [`EntityMapper`]; adapters with hand-written conversion
/// logic can implement it directly.
pub trait ItemMapper: Send + Sync {
    /// Maps a source item to an entity.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Mapping`] when this item cannot be mapped.
    fn item_to_entity(&self, item: &Item) -> LayerResult<Entity>;

    /// Maps an entity to a source item.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Mapping`] when this entity cannot be mapped.
    fn entity_to_item(&self, entity: &Entity) -> LayerResult<Item>;
}

/// How one rule produces its value.
#[derive(Debug, Clone)]
enum FieldTransform {
    Copy,
    Custom(Transform),
}

#[derive(Debug, Clone)]
struct Rule {
    mapping: PropertyMapping,
    transform: FieldTransform,
}

/// Where a rule writes on the entity side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Id,
    Deleted,
    Recorded,
    Property(String),
    Reference(String),
}

impl Slot {
    fn of(mapping: &PropertyMapping) -> Self {
        if mapping.is_identity {
            Slot::Id
        } else if mapping.is_deleted {
            Slot::Deleted
        } else if mapping.is_recorded {
            Slot::Recorded
        } else if mapping.is_reference {
            Slot::Reference(mapping.target_property().to_string())
        } else {
            Slot::Property(mapping.target_property().to_string())
        }
    }
}

/// Configuration-driven mapper.
///
/// Immutable once built; share it between iterators with an `Arc`.
///
/// Mapping an item to an entity and back restores every plain field as it
/// was. Three roles normalize their value on the way:
///
/// - the identity becomes text (`42` comes back as `"42"`)
/// - a text change marker becomes its nanosecond integer marker
/// - an identity or text reference already starting with `base_uri` comes
///   back without it
///
/// Mapping the normalized item again yields the same entity.
#[derive(Debug, Clone)]
pub struct EntityMapper {
    rules: Vec<Rule>,
    base_uri: Option<String>,
    map_all: bool,
    mapped_fields: HashSet<String>,
    mapped_properties: HashSet<String>,
}

impl EntityMapper {
    /// Builds a mapper, resolving named transforms against `transforms`.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Configuration`] when the rule set does not have
    /// exactly one identity rule, a rule has no field name or more than one
    /// role, or a transform name is not registered.
    pub fn new(config: &MappingConfig, transforms: &TransformRegistry) -> LayerResult<Self> {
        let identities = config.properties.iter().filter(|m| m.is_identity).count();
        if identities != 1 {
            return Err(LayerError::configuration(format!(
                "expected exactly one identity rule, found {identities}"
            )));
        }

        let mut rules = Vec::with_capacity(config.properties.len());
        for mapping in &config.properties {
            if mapping.property.is_empty() {
                return Err(LayerError::configuration(format!(
                    "rule for entity property {:?} has no item field",
                    mapping.entity_property
                )));
            }
            if mapping.role_count() > 1 {
                return Err(LayerError::configuration(format!(
                    "rule for field {:?} combines identity, reference, deleted and recorded roles",
                    mapping.property
                )));
            }
            let transform = match &mapping.transform {
                None => FieldTransform::Copy,
                Some(name) => FieldTransform::Custom(
                    transforms
                        .get(name)
                        .cloned()
                        .ok_or_else(|| {
                            LayerError::configuration(format!(
                                "unresolved transform {name:?} for field {:?}",
                                mapping.property
                            ))
                        })?,
                ),
            };
            rules.push(Rule {
                mapping: mapping.clone(),
                transform,
            });
        }

        Ok(Self {
            mapped_fields: rules.iter().map(|r| r.mapping.property.clone()).collect(),
            mapped_properties: rules
                .iter()
                .filter(|r| r.mapping.role_count() == 0)
                .map(|r| r.mapping.target_property().to_string())
                .collect(),
            rules,
            base_uri: config.base_uri.clone(),
            map_all: config.map_all,
        })
    }

    /// Builds a mapper for a configuration without named transforms.
    ///
    /// # Errors
    ///
    /// See [`EntityMapper::new`].
    pub fn from_config(config: &MappingConfig) -> LayerResult<Self> {
        Self::new(config, &TransformRegistry::default())
    }

    /// Item field holding the identity.
    #[must_use]
    pub fn identity_field(&self) -> &str {
        self.rules
            .iter()
            .find(|r| r.mapping.is_identity)
            .map_or("", |r| r.mapping.property.as_str())
    }

    /// Absolute URIs are left alone.
    fn prefixed(&self, raw: String) -> String {
        match &self.base_uri {
            Some(base) if !raw.starts_with(base.as_str()) && !raw.contains("://") => {
                format!("{base}{raw}")
            }
            _ => raw,
        }
    }

    fn unprefixed<'a>(&self, raw: &'a str) -> &'a str {
        match &self.base_uri {
            Some(base) => raw.strip_prefix(base.as_str()).unwrap_or(raw),
            None => raw,
        }
    }

    /// Absent values fall back to the default; required rules reject absent or null.
    fn resolve(
        mapping: &PropertyMapping,
        value: Option<Value>,
        side: &str,
    ) -> LayerResult<Option<Value>> {
        let value = value.or_else(|| mapping.default_value.clone());
        let missing = value.as_ref().map_or(true, Value::is_null);
        if missing && (mapping.required || mapping.is_identity) {
            return Err(LayerError::mapping(format!(
                "{side} has no value for required field {:?}",
                if side == "item" {
                    mapping.property.as_str()
                } else {
                    mapping.target_property()
                }
            )));
        }
        Ok(value)
    }

    /// Maps a source item to an entity.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Mapping`] on a failing transform, a missing
    /// identity or required field, an ill-typed flag, or two rules writing
    /// the same entity slot.
    pub fn item_to_entity(&self, item: &Item) -> LayerResult<Entity> {
        let mut entity = Entity::default();
        let mut assigned = HashSet::new();

        for rule in &self.rules {
            let mapping = &rule.mapping;
            let value = match &rule.transform {
                FieldTransform::Custom(Transform {
                    to_entity: Some(f), ..
                }) => Some(f(item, mapping, &entity).map_err(|e| {
                    LayerError::mapping(format!(
                        "transform for field {:?} failed: {e}",
                        mapping.property
                    ))
                })?),
                _ => item.get(&mapping.property).cloned(),
            };
            let Some(value) = Self::resolve(mapping, value, "item")? else {
                continue;
            };

            let slot = Slot::of(mapping);
            if !assigned.insert(slot.clone()) {
                return Err(LayerError::mapping(format!(
                    "field {:?} maps to an already assigned target {slot:?}",
                    mapping.property
                )));
            }

            match slot {
                Slot::Id => {
                    let raw = value.to_scalar_string().ok_or_else(|| {
                        LayerError::mapping(format!(
                            "identity field {:?} holds a {}",
                            mapping.property,
                            value.type_name()
                        ))
                    })?;
                    entity.id = self.prefixed(raw);
                }
                Slot::Deleted => {
                    entity.deleted = value.as_bool().ok_or_else(|| {
                        LayerError::mapping(format!(
                            "deleted flag {:?} holds a {}",
                            mapping.property,
                            value.type_name()
                        ))
                    })?;
                }
                Slot::Recorded => {
                    entity.recorded = Some(marker_from_value(&value).ok_or_else(|| {
                        LayerError::mapping(format!(
                            "change marker {:?} is neither an integer nor a timestamp",
                            mapping.property
                        ))
                    })?);
                }
                Slot::Reference(name) => {
                    let value = match value {
                        Value::Text(s) => Value::Text(self.prefixed(s)),
                        other => other,
                    };
                    entity.references.insert(name, value);
                }
                Slot::Property(name) => {
                    entity.properties.insert(name, value);
                }
            }
        }

        if self.map_all {
            for (name, value) in item.iter() {
                if !self.mapped_fields.contains(name) && !entity.properties.contains_key(name) {
                    entity.properties.insert(name.clone(), value.clone());
                }
            }
        }

        Ok(entity)
    }

    /// Maps an entity to a source item.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Mapping`] on a failing transform, a missing
    /// identity or required property, or two rules writing the same item field.
    pub fn entity_to_item(&self, entity: &Entity) -> LayerResult<Item> {
        let mut item = Item::new();

        for rule in &self.rules {
            let mapping = &rule.mapping;
            let value = match &rule.transform {
                FieldTransform::Custom(Transform {
                    to_item: Some(f), ..
                }) => Some(f(entity, mapping, &item).map_err(|e| {
                    LayerError::mapping(format!(
                        "transform for property {:?} failed: {e}",
                        mapping.target_property()
                    ))
                })?),
                _ => match Slot::of(mapping) {
                    Slot::Id => (!entity.id.is_empty())
                        .then(|| Value::Text(self.unprefixed(&entity.id).to_string())),
                    Slot::Deleted => Some(Value::Bool(entity.deleted)),
                    Slot::Recorded => entity.recorded.map(Value::Integer),
                    Slot::Reference(name) => entity.references.get(&name).map(|v| match v {
                        Value::Text(s) => Value::Text(self.unprefixed(s).to_string()),
                        other => other.clone(),
                    }),
                    Slot::Property(name) => entity.properties.get(&name).cloned(),
                },
            };
            let Some(value) = Self::resolve(mapping, value, "entity")? else {
                continue;
            };

            if item.contains(&mapping.property) {
                return Err(LayerError::mapping(format!(
                    "item field {:?} is assigned by more than one rule",
                    mapping.property
                )));
            }
            item.set(mapping.property.clone(), value);
        }

        if self.map_all {
            for (name, value) in &entity.properties {
                if !self.mapped_properties.contains(name) && !item.contains(name) {
                    item.set(name.clone(), value.clone());
                }
            }
        }

        Ok(item)
    }
}

impl ItemMapper for EntityMapper {
    fn item_to_entity(&self, item: &Item) -> LayerResult<Entity> {
        EntityMapper::item_to_entity(self, item)
    }

    fn entity_to_item(&self, entity: &Entity) -> LayerResult<Item> {
        EntityMapper::entity_to_item(self, entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn people() -> MappingConfig {
        MappingConfig::new()
            .with_base_uri("http://data.example/person/")
            .with_property(PropertyMapping::identity("id"))
            .with_property(PropertyMapping::field("full_name", "name"))
            .with_property(PropertyMapping::field("age", ""))
            .with_property(PropertyMapping::field("employer", "worksFor").reference())
    }

    fn ada() -> Item {
        Item::new()
            .with("id", "p1")
            .with("full_name", "Ada")
            .with("age", 36i64)
            .with("employer", "http://data.example/company/c9")
            .with("shoe_size", 38i64)
    }

    #[test]
    fn maps_item_to_entity() {
        let mapper = EntityMapper::from_config(&people()).unwrap();
        let entity = mapper.item_to_entity(&ada()).unwrap();

        assert_eq!(entity.id, "http://data.example/person/p1");
        assert_eq!(entity.property("name"), Some(&Value::from("Ada")));
        assert_eq!(entity.property("age"), Some(&Value::Integer(36)));
        assert_eq!(
            entity.reference("worksFor"),
            Some(&Value::from("http://data.example/company/c9"))
        );
        // Unmapped fields are dropped.
        assert!(entity.property("shoe_size").is_none());
        assert_eq!(entity.properties.len(), 2);
    }

    #[test]
    fn maps_entity_back_to_item() {
        let mapper = EntityMapper::from_config(&people()).unwrap();
        let entity = mapper.item_to_entity(&ada()).unwrap();
        let item = mapper.entity_to_item(&entity).unwrap();

        assert_eq!(item.get("id"), Some(&Value::from("p1")));
        assert_eq!(item.get("full_name"), Some(&Value::from("Ada")));
        assert_eq!(item.get("age"), Some(&Value::Integer(36)));
        assert!(item.get("shoe_size").is_none());
    }

    #[test]
    fn identity_rule_count_is_checked() {
        let none = MappingConfig::new().with_property(PropertyMapping::field("a", "b"));
        let two = MappingConfig::new()
            .with_property(PropertyMapping::identity("a"))
            .with_property(PropertyMapping::identity("b"));
        for config in [none, two] {
            assert!(matches!(
                EntityMapper::from_config(&config),
                Err(LayerError::Configuration { .. })
            ));
        }
    }

    #[test]
    fn unresolved_transform_is_a_configuration_error() {
        let config = people().with_property(PropertyMapping::field("x", "y").with_transform("nope"));
        let err = EntityMapper::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn conflicting_roles_are_rejected() {
        let config = MappingConfig::new()
            .with_property(PropertyMapping::identity("id").reference());
        assert!(EntityMapper::from_config(&config).is_err());
    }

    #[test]
    fn missing_identity_fails_the_item() {
        let mapper = EntityMapper::from_config(&people()).unwrap();
        let err = mapper
            .item_to_entity(&Item::new().with("full_name", "Nobody"))
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn identity_must_be_scalar() {
        let mapper = EntityMapper::from_config(&people()).unwrap();
        let item = Item::new().with("id", Value::Array(vec![]));
        assert!(mapper.item_to_entity(&item).is_err());
    }

    #[test]
    fn integer_identity_is_rendered_as_text() {
        let config = MappingConfig::new().with_property(PropertyMapping::identity("id"));
        let mapper = EntityMapper::from_config(&config).unwrap();
        let entity = mapper.item_to_entity(&Item::new().with("id", 42i64)).unwrap();
        assert_eq!(entity.id, "42");
    }

    #[test]
    fn target_collision_fails_the_item() {
        let config = people().with_property(PropertyMapping::field("nickname", "name"));
        let mapper = EntityMapper::from_config(&config).unwrap();
        let err = mapper
            .item_to_entity(&ada().with("nickname", "A"))
            .unwrap_err();
        assert!(matches!(err, LayerError::Mapping { .. }));

        // Without the colliding source value there is nothing to collide with.
        assert!(mapper.item_to_entity(&ada()).is_ok());
    }

    #[test]
    fn required_and_default_values() {
        let config = MappingConfig::new()
            .with_property(PropertyMapping::identity("id"))
            .with_property(PropertyMapping::field("email", "").required())
            .with_property(PropertyMapping::field("country", "").with_default("NO"));
        let mapper = EntityMapper::from_config(&config).unwrap();

        let entity = mapper
            .item_to_entity(&Item::new().with("id", "1").with("email", "a@b.c"))
            .unwrap();
        assert_eq!(entity.property("country"), Some(&Value::from("NO")));

        assert!(mapper.item_to_entity(&Item::new().with("id", "1")).is_err());
        assert!(mapper
            .item_to_entity(&Item::new().with("id", "1").with("email", Value::Null))
            .is_err());
    }

    #[test]
    fn optional_null_is_kept() {
        let mapper = EntityMapper::from_config(&people()).unwrap();
        let entity = mapper
            .item_to_entity(&Item::new().with("id", "p2").with("age", Value::Null))
            .unwrap();
        assert_eq!(entity.property("age"), Some(&Value::Null));
    }

    #[test]
    fn deleted_and_recorded_roles() {
        let config = MappingConfig::new()
            .with_property(PropertyMapping::identity("id"))
            .with_property(PropertyMapping::field("removed", "").deleted_flag())
            .with_property(PropertyMapping::field("updated", "").recorded_marker());
        let mapper = EntityMapper::from_config(&config).unwrap();

        let entity = mapper
            .item_to_entity(
                &Item::new()
                    .with("id", "x")
                    .with("removed", true)
                    .with("updated", 7i64),
            )
            .unwrap();
        assert!(entity.deleted);
        assert_eq!(entity.recorded, Some(7));

        let item = mapper.entity_to_item(&entity).unwrap();
        assert_eq!(item.get("removed"), Some(&Value::Bool(true)));
        assert_eq!(item.get("updated"), Some(&Value::Integer(7)));

        let bad = Item::new().with("id", "x").with("removed", "yes");
        assert!(mapper.item_to_entity(&bad).is_err());
    }

    #[test]
    fn custom_transform_sees_entity_context() {
        let mut transforms = TransformRegistry::new();
        transforms.register(
            "label",
            Transform::to_entity(|item, _, entity| {
                let name = entity
                    .property("name")
                    .and_then(Value::as_text)
                    .ok_or("name not mapped yet")?;
                let age = item.get("age").and_then(Value::as_integer).unwrap_or(0);
                Ok(Value::from(format!("{name} ({age})")))
            })
            .and_to_item(|_, _, _| Ok(Value::Null)),
        );
        let config = people().with_property(PropertyMapping::field("label", "").with_transform("label"));
        let mapper = EntityMapper::new(&config, &transforms).unwrap();

        let entity = mapper.item_to_entity(&ada()).unwrap();
        assert_eq!(entity.property("label"), Some(&Value::from("Ada (36)")));

        let err = mapper
            .item_to_entity(&Item::new().with("id", "p3"))
            .unwrap_err();
        assert!(err.to_string().contains("name not mapped yet"));
    }

    #[test]
    fn map_all_copies_unmapped_fields() {
        let mapper = EntityMapper::from_config(&people().map_all(true)).unwrap();
        let entity = mapper.item_to_entity(&ada()).unwrap();
        assert_eq!(entity.property("shoe_size"), Some(&Value::Integer(38)));
        // Mapped source fields are not copied under their source name.
        assert!(entity.property("full_name").is_none());

        let item = mapper.entity_to_item(&entity).unwrap();
        assert_eq!(item.get("shoe_size"), Some(&Value::Integer(38)));
    }

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::Text),
            Just(Value::Null),
        ]
    }

    fn identity_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            "[a-z0-9]{1,12}".prop_map(Value::Text),
            any::<i64>().prop_map(Value::Integer),
        ]
    }

    #[test]
    fn normalized_roles_come_back_in_canonical_form() {
        let config = MappingConfig::new()
            .with_base_uri("http://data.example/")
            .with_property(PropertyMapping::identity("key"))
            .with_property(PropertyMapping::field("updated", "").recorded_marker());
        let mapper = EntityMapper::from_config(&config).unwrap();

        let item = Item::new()
            .with("key", "http://data.example/p7")
            .with("updated", "1970-01-01T00:00:01Z");
        let entity = mapper.item_to_entity(&item).unwrap();
        let back = mapper.entity_to_item(&entity).unwrap();
        assert_eq!(back.get("key"), Some(&Value::from("p7")));
        assert_eq!(back.get("updated"), Some(&Value::Integer(1_000_000_000)));
        assert_eq!(mapper.item_to_entity(&back).unwrap(), entity);
    }

    proptest! {
        #[test]
        fn mapped_fields_round_trip(
            id in identity_value(),
            fields in prop::collection::btree_map("f_[a-z]{1,8}", scalar(), 0..8),
            employer in prop::option::of("[a-z0-9]{1,8}"),
            updated in prop::option::of(any::<i64>()),
            gone in any::<bool>(),
        ) {
            let mut config = MappingConfig::new()
                .with_base_uri("http://data.example/")
                .with_property(PropertyMapping::identity("key"))
                .with_property(PropertyMapping::field("employer", "worksFor").reference())
                .with_property(PropertyMapping::field("updated", "").recorded_marker())
                .with_property(PropertyMapping::field("gone", "").deleted_flag());
            for name in fields.keys() {
                config = config.with_property(PropertyMapping::field(name.clone(), format!("p_{name}")));
            }
            let mapper = EntityMapper::from_config(&config).unwrap();

            let mut item = Item::new().with("key", id.clone()).with("gone", gone);
            if let Some(employer) = &employer {
                item.set("employer", employer.as_str());
            }
            if let Some(updated) = updated {
                item.set("updated", updated);
            }
            for (name, value) in &fields {
                item.set(name.clone(), value.clone());
            }

            let entity = mapper.item_to_entity(&item).unwrap();
            let back = mapper.entity_to_item(&entity).unwrap();

            let mut expected = item.clone();
            expected.set("key", Value::Text(id.to_scalar_string().unwrap()));
            prop_assert_eq!(&back, &expected);
            prop_assert_eq!(mapper.item_to_entity(&back).unwrap(), entity);
        }
    }
}
