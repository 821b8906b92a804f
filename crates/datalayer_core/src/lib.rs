//! # DataLayer Core
//!
//! Source-agnostic machinery for exposing external data as graph entities.
//!
//! This crate provides:
//! - [`EntityMapper`]: configuration-driven item <-> entity conversion
//! - [`ItemIterator`] / [`EntityIterator`]: lazy, forward-only pull streams
//! - [`MultiSourceEntityIterator`]: one stream over many source units with
//!   exact, resumable [`ContinuationToken`]s
//! - the [`Dataset`] contract adapters implement, and a [`DatasetRegistry`]
//!
//! ## Reading changes
//!
//! A read is planned from the source's units and the caller's `since`, then
//! streamed unit by unit. After every entity the iterator's token names the
//! exact position reached; feeding it back as `since` resumes right after it.
//!
//! ```
//! use datalayer_core::{
//!     collect_entities, ChangeDetection, EntityIterator, EntityMapper, Item, ItemIterator,
//!     LayerResult, MappingConfig, PropertyMapping, ReadRequest, SourceUnit, UnitErrorPolicy,
//!     UnitOpener, VecItemIterator,
//! };
//! use std::sync::Arc;
//!
//! struct Inline;
//!
//! impl UnitOpener for Inline {
//!     fn open(&self, unit: &SourceUnit) -> LayerResult<Box<dyn ItemIterator>> {
//!         let items = (0..2).map(|i| Item::new().with("id", format!("{}-{i}", unit.name)));
//!         Ok(Box::new(VecItemIterator::new(items.collect())))
//!     }
//! }
//!
//! let mapping = MappingConfig::new().with_property(PropertyMapping::identity("id"));
//! let mapper = Arc::new(EntityMapper::from_config(&mapping).unwrap());
//! let units = vec![SourceUnit::new("b", 2), SourceUnit::new("a", 1)];
//!
//! let request =
//!     ReadRequest::changes("", 0, false, ChangeDetection::UnitMarker, UnitErrorPolicy::FailFast)
//!         .unwrap();
//! let mut iter = request.open(units.clone(), Arc::new(Inline), mapper.clone()).unwrap();
//! assert_eq!(iter.next_entity().unwrap().unwrap().id, "a-0");
//! let token = iter.token().unwrap().encode();
//!
//! let request =
//!     ReadRequest::changes(&token, 0, false, ChangeDetection::UnitMarker, UnitErrorPolicy::FailFast)
//!         .unwrap();
//! let mut rest = request.open(units, Arc::new(Inline), mapper).unwrap();
//! let (entities, _) = collect_entities(&mut rest).unwrap();
//! let ids: Vec<_> = entities.iter().map(|e| e.id.as_str()).collect();
//! assert_eq!(ids, ["a-1", "b-0", "b-1"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod dataset;
mod entity;
mod error;
mod item;
mod iterator;
mod mapper;
mod mapping;
mod multi;
mod registry;
mod source;

pub use config::{DatasetDefinition, SourceConfig};
pub use cursor::{
    marker_from_time, marker_from_value, parse_timestamp, ContinuationToken, Position, Since,
};
pub use dataset::{wrap, Dataset, DatasetDescription, ReadRequest};
pub use entity::Entity;
pub use error::{ErrorKind, LayerError, LayerResult};
pub use item::Item;
pub use iterator::{
    collect_entities, EntityIter, EntityIterator, ItemIterator, LatestOnlyEntityIterator,
    LimitedEntityIterator, MappingIterator, ReaderItemIterator, VecItemIterator,
};
pub use mapper::{EntityMapper, ItemMapper};
pub use mapping::{
    MappingConfig, PropertyMapping, ToEntityFn, ToItemFn, Transform, TransformRegistry,
};
pub use multi::{ChainedItemIterator, MultiSourceEntityIterator};
pub use registry::DatasetRegistry;
pub use source::{
    plan_units, ChangeDetection, IterationPlan, PlannedUnit, SourceUnit, UnitErrorPolicy,
    UnitOpener,
};

pub use datalayer_codec::{Format, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
